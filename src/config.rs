use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

/// One year.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: String,
    pub issuer: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_version: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
}

impl JwtConfig {
    /// Resolves the configured signing algorithm; only HMAC variants are accepted.
    pub fn algorithm(&self) -> anyhow::Result<Algorithm> {
        let alg = Algorithm::from_str(self.algorithm.trim())
            .with_context(|| format!("unknown JWT_ALGORITHM {:?}", self.algorithm))?;
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(alg),
            other => anyhow::bail!("JWT_ALGORITHM {:?} is not an HMAC algorithm", other),
        }
    }

    /// Access token lifetime; must lie in `1..=MAX_TOKEN_TTL_MINUTES` minutes.
    pub fn ttl(&self) -> anyhow::Result<Duration> {
        anyhow::ensure!(
            (1..=MAX_TOKEN_TTL_MINUTES).contains(&self.ttl_minutes),
            "ACCESS_TOKEN_EXPIRE_MINUTES must be between 1 and {MAX_TOKEN_TTL_MINUTES}, got {}",
            self.ttl_minutes
        );
        Ok(Duration::from_secs(self.ttl_minutes as u64 * 60))
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            algorithm: std::env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".into()),
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "newsfeed".into()),
            ttl_minutes: parse_var("ACCESS_TOKEN_EXPIRE_MINUTES").unwrap_or(60),
        };
        jwt.algorithm()?;
        jwt.ttl()?;

        let cors_origins = std::env::var("BACKEND_CORS_ORIGINS")
            .map(|v| split_origins(&v))
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:8080".to_string(),
                ]
            });

        Ok(Self {
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Feed Music API".into()),
            app_version: std::env::var("APP_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").into()),
            database_url,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            jwt,
            cors_origins,
            max_body_bytes: parse_var("MAX_BODY_BYTES").unwrap_or(5 * 1024 * 1024),
        })
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
