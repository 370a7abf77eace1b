use std::borrow::Cow;

use serde::{Deserialize, Deserializer};
use validator::{Validate, ValidationError};

use super::repo_types::{NewNews, NewsChanges, NewsFilter, NewsSort};
use crate::{
    error::{field_errors, ApiError, ApiResult, FieldError},
    pagination::{PaginationParams, PageQuery},
};

pub const MAX_KEYWORD_LEN: usize = 100;
pub const MAX_IMAGE_URL_LEN: usize = 500;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNewsRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 2000, message = "Description must be 1 to 2000 characters"))]
    pub description: String,
    #[validate(custom(function = "validate_image_url"))]
    pub image_url: Option<String>,
}

impl CreateNewsRequest {
    /// Trims and validates into repository input.
    pub fn into_new(mut self) -> ApiResult<NewNews> {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.validate()?;
        Ok(NewNews {
            title: self.title,
            description: self.description,
            image_url: self.image_url,
        })
    }
}

/// Partial update; absent fields are left unchanged, `"image_url": null` clears it.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateNewsRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1 to 200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 2000, message = "Description must be 1 to 2000 characters"))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub image_url: Option<Option<String>>,
}

impl UpdateNewsRequest {
    pub fn into_changes(mut self) -> ApiResult<NewsChanges> {
        self.title = self.title.map(|t| t.trim().to_string());
        self.description = self.description.map(|d| d.trim().to_string());

        let mut errors = match self.validate() {
            Ok(()) => Vec::new(),
            Err(e) => field_errors(&e),
        };
        if let Some(Some(url)) = &self.image_url {
            if let Err(e) = validate_image_url(url) {
                errors.push(FieldError::new(
                    "image_url",
                    e.message.unwrap_or(Cow::Borrowed("invalid image url")),
                ));
            }
        }
        if !errors.is_empty() {
            errors.sort_by(|a, b| a.field.cmp(&b.field));
            return Err(ApiError::UnprocessableEntity(errors));
        }

        Ok(NewsChanges {
            title: self.title,
            description: self.description,
            image_url: self.image_url,
        })
    }
}

/// Query string of `GET /news`.
#[derive(Debug, Default, Deserialize)]
pub struct NewsListQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub limit: Option<i64>,
    pub keyword: Option<String>,
    pub creator_id: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl NewsListQuery {
    pub fn pagination(&self) -> ApiResult<PaginationParams> {
        PageQuery {
            page: self.page,
            size: self.size,
            limit: self.limit,
        }
        .resolve()
    }

    pub fn filter(&self) -> ApiResult<NewsFilter> {
        let keyword = self
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        if let Some(k) = keyword {
            if k.chars().count() > MAX_KEYWORD_LEN {
                return Err(ApiError::invalid(
                    "keyword",
                    format!("Keyword must be at most {MAX_KEYWORD_LEN} characters"),
                ));
            }
        }
        Ok(NewsFilter {
            keyword: keyword.map(str::to_string),
            creator_id: self.creator_id,
        })
    }

    pub fn sort(&self) -> ApiResult<NewsSort> {
        let mut sort = NewsSort::default();
        if let Some(field) = self.sort_by.as_deref() {
            sort.field = field.parse().map_err(|_| {
                ApiError::invalid("sort_by", "sort_by must be one of created_at, updated_at, title")
            })?;
        }
        if let Some(order) = self.sort_order.as_deref() {
            sort.order = order
                .parse()
                .map_err(|_| ApiError::invalid("sort_order", "sort_order must be asc or desc"))?;
        }
        Ok(sort)
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    let mut err = ValidationError::new("image_url");
    if url.chars().count() > MAX_IMAGE_URL_LEN {
        err.message = Some(Cow::Borrowed("Image URL must be at most 500 characters"));
        return Err(err);
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        err.message = Some(Cow::Borrowed("Image URL must start with http:// or https://"));
        return Err(err);
    }
    Ok(())
}
