//! In-memory implementation of both repositories, for handler tests.

use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    auth::{extractors::authorize_owner, password::hash_password},
    db::{RepoError, RepoResult},
    news::{
        repo::NewsRepository,
        repo_types::{Creator, NewNews, News, NewsChanges, NewsFilter, NewsSort, SortField, SortOrder},
    },
    pagination::PaginationParams,
    state::AppState,
    users::{
        repo::{UserRepository, EMAIL_TAKEN, USERNAME_TAKEN},
        repo_types::{NewUser, User},
    },
};

#[derive(Debug, Clone)]
struct StoredNews {
    id: i64,
    title: String,
    description: String,
    image_url: Option<String>,
    creator_id: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    news: Vec<StoredNews>,
    next_user_id: i64,
    next_news_id: i64,
}

impl Inner {
    fn joined(&self, n: &StoredNews) -> Option<News> {
        let creator = self.users.iter().find(|u| u.id == n.creator_id)?;
        Some(News {
            id: n.id,
            title: n.title.clone(),
            description: n.description.clone(),
            image_url: n.image_url.clone(),
            creator_id: n.creator_id,
            created_at: n.created_at,
            updated_at: n.updated_at,
            creator: Creator {
                id: creator.id,
                username: creator.username.clone(),
                email: creator.email.clone(),
            },
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: NewUser) -> RepoResult<User> {
        let mut inner = self.lock();
        if inner.users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict(USERNAME_TAKEN.into()));
        }
        if inner.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(RepoError::Conflict(EMAIL_TAKEN.into()));
        }
        inner.next_user_id += 1;
        let created = User {
            id: inner.next_user_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.push(created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_login(&self, username_or_email: &str) -> RepoResult<Option<User>> {
        let inner = self.lock();
        let by_name = inner.users.iter().find(|u| u.username == username_or_email);
        let found = by_name.or_else(|| {
            inner
                .users
                .iter()
                .find(|u| u.email.eq_ignore_ascii_case(username_or_email))
        });
        Ok(found.cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> RepoResult<Vec<User>> {
        let inner = self.lock();
        Ok(inner
            .users
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NewsRepository for MemoryStore {
    async fn create(&self, creator_id: i64, news: NewNews) -> RepoResult<News> {
        let mut inner = self.lock();
        if !inner.users.iter().any(|u| u.id == creator_id) {
            return Err(RepoError::NotFound);
        }
        inner.next_news_id += 1;
        let now = OffsetDateTime::now_utc();
        let stored = StoredNews {
            id: inner.next_news_id,
            title: news.title,
            description: news.description,
            image_url: news.image_url,
            creator_id,
            created_at: now,
            updated_at: now,
        };
        let created = inner.joined(&stored).ok_or(RepoError::NotFound)?;
        inner.news.push(stored);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<News>> {
        let inner = self.lock();
        Ok(inner.news.iter().find(|n| n.id == id).and_then(|n| inner.joined(n)))
    }

    async fn list(
        &self,
        filter: &NewsFilter,
        sort: NewsSort,
        page: PaginationParams,
    ) -> RepoResult<(Vec<News>, i64)> {
        let inner = self.lock();
        let keyword = filter.keyword.as_ref().map(|k| k.to_lowercase());
        let mut matched: Vec<&StoredNews> = inner
            .news
            .iter()
            .filter(|n| filter.creator_id.map_or(true, |c| n.creator_id == c))
            .filter(|n| {
                keyword.as_ref().map_or(true, |k| {
                    n.title.to_lowercase().contains(k) || n.description.to_lowercase().contains(k)
                })
            })
            .collect();

        matched.sort_by(|a, b| {
            let primary = match sort.field {
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::Title => a.title.cmp(&b.title),
            };
            let ord = primary.then(a.id.cmp(&b.id));
            match sort.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = matched.len() as i64;
        let items = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .filter_map(|n| inner.joined(n))
            .collect();
        Ok((items, total))
    }

    async fn update(&self, id: i64, changes: NewsChanges, requester_id: i64) -> RepoResult<News> {
        let mut inner = self.lock();
        let stored = inner
            .news
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(RepoError::NotFound)?;
        authorize_owner(requester_id, stored.creator_id)?;

        if let Some(title) = changes.title {
            stored.title = title;
        }
        if let Some(description) = changes.description {
            stored.description = description;
        }
        if let Some(image_url) = changes.image_url {
            stored.image_url = image_url;
        }
        stored.updated_at = OffsetDateTime::now_utc();

        let snapshot = stored.clone();
        inner.joined(&snapshot).ok_or(RepoError::NotFound)
    }

    async fn delete(&self, id: i64, requester_id: i64) -> RepoResult<()> {
        let mut inner = self.lock();
        let pos = inner
            .news
            .iter()
            .position(|n| n.id == id)
            .ok_or(RepoError::NotFound)?;
        authorize_owner(requester_id, inner.news[pos].creator_id)?;
        inner.news.remove(pos);
        Ok(())
    }
}

/// Registers `username` with email `<username>@x.com` and password `pass123`.
pub async fn seed_user(state: &AppState, username: &str) -> User {
    let password_hash = hash_password("pass123").expect("hash");
    state
        .users
        .create(NewUser {
            username: username.to_string(),
            email: format!("{username}@x.com"),
            password_hash,
        })
        .await
        .expect("seed user")
}

pub async fn seed_news(state: &AppState, creator_id: i64, title: &str, description: &str) -> News {
    state
        .news
        .create(
            creator_id,
            NewNews {
                title: title.to_string(),
                description: description.to_string(),
                image_url: None,
            },
        )
        .await
        .expect("seed news")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts_without_writing() {
        let store = MemoryStore::default();
        let new_user = |name: &str, email: &str| NewUser {
            username: name.into(),
            email: email.into(),
            password_hash: "h".into(),
        };
        UserRepository::create(&store, new_user("alice", "alice@x.com")).await.unwrap();

        let err = UserRepository::create(&store, new_user("alice", "other@x.com")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(m) if m == USERNAME_TAKEN));
        let err = UserRepository::create(&store, new_user("bob", "ALICE@x.com")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(m) if m == EMAIL_TAKEN));

        assert_eq!(UserRepository::list(&store, 0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn news_for_missing_creator_is_not_found() {
        let store = MemoryStore::default();
        let new = NewNews {
            title: "Hi".into(),
            description: "World".into(),
            image_url: None,
        };
        let err = NewsRepository::create(&store, 42, new).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
        let (items, total) = NewsRepository::list(
            &store,
            &NewsFilter::default(),
            NewsSort::default(),
            PaginationParams::default(),
        )
        .await
        .unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }
}
