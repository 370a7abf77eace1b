use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Resolved page request. `page >= 1`, `1 <= size <= MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    pub page: i64,
    pub size: i64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationParams {
    /// `page` is clamped to 1; `size` wins over its alias `limit`; a size
    /// outside `1..=MAX_PAGE_SIZE` is rejected.
    pub fn resolve(page: Option<i64>, size: Option<i64>, limit: Option<i64>) -> ApiResult<Self> {
        let page = page.unwrap_or(1).max(1);
        let (field, size) = match (size, limit) {
            (Some(s), _) => ("size", s),
            (None, Some(l)) => ("limit", l),
            (None, None) => ("size", DEFAULT_PAGE_SIZE),
        };
        if !(1..=MAX_PAGE_SIZE).contains(&size) {
            return Err(ApiError::invalid(
                field,
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> i64 {
        self.size
    }
}

/// Raw `page`/`size`/`limit` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn resolve(&self) -> ApiResult<PaginationParams> {
        PaginationParams::resolve(self.page, self.size, self.limit)
    }
}

/// Paged envelope returned by list endpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
    pub pages: i64,
}

pub fn page_count(total: i64, size: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + size - 1) / size
    }
}

impl<T> Paginated<T> {
    /// Wraps one page already fetched with `params.offset()`/`params.limit()`.
    pub fn new(items: Vec<T>, total: i64, params: PaginationParams) -> Self {
        let items = if total == 0 { Vec::new() } else { items };
        Self {
            items,
            total,
            page: params.page,
            size: params.size,
            pages: page_count(total, params.size),
        }
    }

    /// Slices an in-memory sequence to the requested page.
    #[cfg(test)]
    pub fn from_vec(all: Vec<T>, params: PaginationParams) -> Self {
        let total = all.len() as i64;
        let start = usize::try_from(params.offset()).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(start)
            .take(params.size as usize)
            .collect();
        Self::new(items, total, params)
    }
}
