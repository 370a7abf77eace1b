use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::repo_types::{NewNews, News, NewsChanges, NewsFilter, NewsRow, NewsSort};
use crate::{
    auth::extractors::authorize_owner,
    db::{foreign_key_violation, like_pattern, RepoError, RepoResult},
    pagination::PaginationParams,
};

#[async_trait]
pub trait NewsRepository: Send + Sync {
    async fn create(&self, creator_id: i64, news: NewNews) -> RepoResult<News>;
    async fn get_by_id(&self, id: i64) -> RepoResult<Option<News>>;
    /// One page of matching items plus the total match count.
    async fn list(
        &self,
        filter: &NewsFilter,
        sort: NewsSort,
        page: PaginationParams,
    ) -> RepoResult<(Vec<News>, i64)>;
    /// `NotFound` if absent, `Forbidden` unless `requester_id` created it.
    async fn update(&self, id: i64, changes: NewsChanges, requester_id: i64) -> RepoResult<News>;
    async fn delete(&self, id: i64, requester_id: i64) -> RepoResult<()>;
}

const SELECT_NEWS: &str = r#"
    SELECT n.id, n.title, n.description, n.image_url, n.creator_id,
           n.created_at, n.updated_at,
           u.username AS creator_username, u.email AS creator_email
      FROM news n
      JOIN users u ON u.id = n.creator_id
"#;

#[derive(Clone)]
pub struct PgNewsRepository {
    db: PgPool,
}

impl PgNewsRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn fetch_news<'e, E: PgExecutor<'e>>(exec: E, id: i64) -> Result<Option<News>, sqlx::Error> {
    let row = sqlx::query_as::<_, NewsRow>(&format!("{SELECT_NEWS} WHERE n.id = $1"))
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(row.map(News::from))
}

/// Locks the row for the rest of the transaction and returns its creator.
async fn lock_creator<'e, E: PgExecutor<'e>>(exec: E, id: i64) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT creator_id FROM news WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(exec)
        .await
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &NewsFilter) {
    qb.push(" WHERE TRUE");
    if let Some(keyword) = &filter.keyword {
        let pattern = like_pattern(keyword);
        qb.push(" AND (n.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR n.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(creator_id) = filter.creator_id {
        qb.push(" AND n.creator_id = ").push_bind(creator_id);
    }
}

#[async_trait]
impl NewsRepository for PgNewsRepository {
    async fn create(&self, creator_id: i64, news: NewNews) -> RepoResult<News> {
        let mut tx = self.db.begin().await?;
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO news (title, description, image_url, creator_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&news.title)
        .bind(&news.description)
        .bind(&news.image_url)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if foreign_key_violation(&e) {
                RepoError::NotFound
            } else {
                RepoError::Database(e)
            }
        })?;

        let created = fetch_news(&mut *tx, id).await?.ok_or(RepoError::NotFound)?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<News>> {
        Ok(fetch_news(&self.db, id).await?)
    }

    async fn list(
        &self,
        filter: &NewsFilter,
        sort: NewsSort,
        page: PaginationParams,
    ) -> RepoResult<(Vec<News>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM news n");
        push_filter(&mut count, filter);
        let (total,) = count
            .build_query_as::<(i64,)>()
            .fetch_one(&self.db)
            .await?;

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let mut select = QueryBuilder::<Postgres>::new(SELECT_NEWS);
        push_filter(&mut select, filter);
        select.push(format!(
            " ORDER BY {col} {dir}, n.id {dir}",
            col = sort.field.column(),
            dir = sort.order.keyword()
        ));
        select
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = select
            .build_query_as::<NewsRow>()
            .fetch_all(&self.db)
            .await?;
        debug!(total, returned = rows.len(), "news list query");
        Ok((rows.into_iter().map(News::from).collect(), total))
    }

    async fn update(&self, id: i64, changes: NewsChanges, requester_id: i64) -> RepoResult<News> {
        let mut tx = self.db.begin().await?;
        let creator_id = lock_creator(&mut *tx, id).await?.ok_or(RepoError::NotFound)?;
        authorize_owner(requester_id, creator_id)?;

        let (set_image, image_url) = match changes.image_url {
            Some(url) => (true, url),
            None => (false, None),
        };
        sqlx::query(
            r#"
            UPDATE news
               SET title = COALESCE($2, title),
                   description = COALESCE($3, description),
                   image_url = CASE WHEN $4 THEN $5 ELSE image_url END,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(set_image)
        .bind(&image_url)
        .execute(&mut *tx)
        .await?;

        let updated = fetch_news(&mut *tx, id).await?.ok_or(RepoError::NotFound)?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, id: i64, requester_id: i64) -> RepoResult<()> {
        let mut tx = self.db.begin().await?;
        let creator_id = lock_creator(&mut *tx, id).await?.ok_or(RepoError::NotFound)?;
        authorize_owner(requester_id, creator_id)?;

        let result = sqlx::query("DELETE FROM news WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }
}


/// Runs against a throwaway database created by `#[sqlx::test]`:
/// `DATABASE_URL=postgres://... cargo test -- --ignored`.
#[cfg(test)]
mod pg_tests {
    use super::*;
    use crate::news::repo_types::{SortField, SortOrder};
    use crate::users::{
        repo::{PgUserRepository, UserRepository},
        repo_types::NewUser,
    };

    async fn user(db: &PgPool, name: &str) -> i64 {
        PgUserRepository::new(db.clone())
            .create(NewUser {
                username: name.into(),
                email: format!("{name}@x.com"),
                password_hash: "h".into(),
            })
            .await
            .unwrap()
            .id
    }

    fn item(title: &str, image_url: Option<&str>) -> NewNews {
        NewNews {
            title: title.into(),
            description: "World".into(),
            image_url: image_url.map(str::to_string),
        }
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn create_for_missing_creator_is_not_found(db: PgPool) {
        let repo = PgNewsRepository::new(db);
        let err = repo.create(999, item("Hi", None)).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn update_is_owner_only_and_clears_image(db: PgPool) {
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let repo = PgNewsRepository::new(db);
        let created = repo
            .create(alice, item("Hi", Some("https://img.test/a.png")))
            .await
            .unwrap();
        assert_eq!(created.creator.username, "alice");
        assert_eq!(created.created_at, created.updated_at);

        let hijack = NewsChanges {
            title: Some("Hacked".into()),
            ..Default::default()
        };
        let err = repo.update(created.id, hijack, bob).await.unwrap_err();
        assert!(matches!(err, RepoError::Forbidden));
        let unchanged = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(unchanged.title, "Hi");

        let keep_image = NewsChanges {
            title: Some("Hello".into()),
            ..Default::default()
        };
        let updated = repo.update(created.id, keep_image, alice).await.unwrap();
        assert_eq!(updated.title, "Hello");
        assert_eq!(updated.description, "World");
        assert_eq!(updated.image_url.as_deref(), Some("https://img.test/a.png"));
        assert!(updated.updated_at > created.updated_at);

        let clear_image = NewsChanges {
            image_url: Some(None),
            ..Default::default()
        };
        let cleared = repo.update(created.id, clear_image, alice).await.unwrap();
        assert_eq!(cleared.image_url, None);
        assert_eq!(cleared.title, "Hello");

        let err = repo.update(created.id + 1000, NewsChanges::default(), alice).await.unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn delete_is_owner_only(db: PgPool) {
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let repo = PgNewsRepository::new(db);
        let created = repo.create(alice, item("Hi", None)).await.unwrap();

        assert!(matches!(repo.delete(created.id, bob).await, Err(RepoError::Forbidden)));
        assert!(repo.get_by_id(created.id).await.unwrap().is_some());

        repo.delete(created.id, alice).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
        assert!(matches!(repo.delete(created.id, alice).await, Err(RepoError::NotFound)));
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL"]
    async fn list_filters_sorts_and_escapes_keyword(db: PgPool) {
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let repo = PgNewsRepository::new(db);
        let beta = repo.create(alice, item("beta 50% off", None)).await.unwrap();
        let gamma = repo.create(alice, item("gamma", None)).await.unwrap();
        let alpha = repo.create(bob, item("alpha", None)).await.unwrap();

        let by_title = NewsSort {
            field: SortField::Title,
            order: SortOrder::Asc,
        };
        let (items, total) = repo
            .list(&NewsFilter::default(), by_title, PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(total, 3);
        let ids: Vec<i64> = items.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![alpha.id, beta.id, gamma.id]);

        let mine = NewsFilter {
            keyword: None,
            creator_id: Some(alice),
        };
        let (_, total) = repo.list(&mine, NewsSort::default(), PaginationParams::default()).await.unwrap();
        assert_eq!(total, 2);

        let percent = NewsFilter {
            keyword: Some("50%".into()),
            creator_id: None,
        };
        let (items, total) = repo.list(&percent, NewsSort::default(), PaginationParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, beta.id);

        let page = PaginationParams { page: 2, size: 2 };
        let (items, total) = repo.list(&NewsFilter::default(), NewsSort::default(), page).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);
    }
}
