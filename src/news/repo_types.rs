use std::str::FromStr;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// News joined with its creator, as read from the database.
#[derive(Debug, FromRow)]
pub struct NewsRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub creator_id: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub creator_username: String,
    pub creator_email: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Creator {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct News {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub creator_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub creator: Creator,
}

impl From<NewsRow> for News {
    fn from(r: NewsRow) -> Self {
        Self {
            id: r.id,
            title: r.title,
            description: r.description,
            image_url: r.image_url,
            creator_id: r.creator_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            creator: Creator {
                id: r.creator_id,
                username: r.creator_username,
                email: r.creator_email,
            },
        }
    }
}

/// Validated fields for a new item.
#[derive(Debug, Clone)]
pub struct NewNews {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
}

/// Partial update. `image_url: Some(None)` clears the image.
#[derive(Debug, Clone, Default)]
pub struct NewsChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<Option<String>>,
}

/// Conjunction of optional predicates.
#[derive(Debug, Clone, Default)]
pub struct NewsFilter {
    /// Case-insensitive substring over title and description.
    pub keyword: Option<String>,
    pub creator_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "n.created_at",
            SortField::UpdatedAt => "n.updated_at",
            SortField::Title => "n.title",
        }
    }
}

impl FromStr for SortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            "title" => Ok(SortField::Title),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(()),
        }
    }
}

/// Defaults to newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewsSort {
    pub field: SortField,
    pub order: SortOrder,
}
