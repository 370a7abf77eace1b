use async_trait::async_trait;
use sqlx::PgPool;

use super::repo_types::{NewUser, User};
use crate::db::{unique_violation, RepoError, RepoResult};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the username or email is taken.
    async fn create(&self, user: NewUser) -> RepoResult<User>;
    async fn get_by_id(&self, id: i64) -> RepoResult<Option<User>>;
    /// Matches the username exactly or the email case-insensitively.
    async fn find_by_login(&self, username_or_email: &str) -> RepoResult<Option<User>>;
    async fn list(&self, offset: i64, limit: i64) -> RepoResult<Vec<User>>;
}

pub const USERNAME_TAKEN: &str = "Username already exists";
pub const EMAIL_TAKEN: &str = "Email already registered";

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn conflict_for(constraint: &str) -> RepoError {
    if constraint.contains("email") {
        RepoError::Conflict(EMAIL_TAKEN.into())
    } else {
        RepoError::Conflict(USERNAME_TAKEN.into())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(constraint) => conflict_for(&constraint),
            None => RepoError::Database(e),
        })
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_login(&self, username_or_email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username = $1 OR lower(email) = lower($1)
            ORDER BY (username = $1) DESC
            LIMIT 1
            "#,
        )
        .bind(username_or_email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(&self, offset: i64, limit: i64) -> RepoResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            ORDER BY id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
