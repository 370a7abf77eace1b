use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{CreateNewsRequest, NewsListQuery, UpdateNewsRequest},
    repo_types::{News, NewsFilter, NewsSort},
};
use crate::{
    auth::extractors::AuthUser,
    db::RepoError,
    error::{ApiError, ApiResult},
    pagination::{PageQuery, Paginated},
    state::AppState,
};

pub fn news_routes() -> Router<AppState> {
    Router::new()
        .route("/news", get(list_news).post(create_news))
        .route("/news/:id", get(get_news).put(update_news).delete(delete_news))
        .route("/news/user/:user_id", get(list_user_news))
}

fn news_error(action: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::NotFound("News not found".into()),
        RepoError::Forbidden => ApiError::Forbidden(format!("Not allowed to {action} this news")),
        other => other.into(),
    }
}

#[instrument(skip(state, user, body), fields(user_id = user.0.id))]
pub async fn create_news(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<CreateNewsRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, [(header::HeaderName, String); 1], Json<News>)> {
    let AuthUser(user) = user;
    let Json(payload) = body?;
    let new = payload.into_new()?;

    // creator removed after the token was checked
    let news = state.news.create(user.id, new).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("User not found".into()),
        other => other.into(),
    })?;
    info!(news_id = news.id, title = %news.title, "news created");
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/v1/news/{}", news.id))],
        Json(news),
    ))
}

#[instrument(skip(state))]
pub async fn list_news(
    State(state): State<AppState>,
    query: Result<Query<NewsListQuery>, QueryRejection>,
) -> ApiResult<Json<Paginated<News>>> {
    let Query(q) = query?;
    let params = q.pagination()?;
    let filter = q.filter()?;
    let sort = q.sort()?;

    let (items, total) = state.news.list(&filter, sort, params).await?;
    Ok(Json(Paginated::new(items, total, params)))
}

#[instrument(skip(state))]
pub async fn get_news(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<News>> {
    let Path(id) = path?;
    let news = state
        .news
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("News not found".into()))?;
    Ok(Json(news))
}

#[instrument(skip(state, user, body), fields(user_id = user.0.id))]
pub async fn update_news(
    State(state): State<AppState>,
    user: AuthUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateNewsRequest>, JsonRejection>,
) -> ApiResult<Json<News>> {
    let AuthUser(user) = user;
    let Path(id) = path?;
    let Json(payload) = body?;
    let changes = payload.into_changes()?;

    let news = state
        .news
        .update(id, changes, user.id)
        .await
        .map_err(|e| {
            if matches!(e, RepoError::Forbidden) {
                warn!(news_id = id, "update by non-owner refused");
            }
            news_error("update")(e)
        })?;
    info!(news_id = news.id, "news updated");
    Ok(Json(news))
}

#[instrument(skip(state, user), fields(user_id = user.0.id))]
pub async fn delete_news(
    State(state): State<AppState>,
    user: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let AuthUser(user) = user;
    let Path(id) = path?;

    state.news.delete(id, user.id).await.map_err(|e| {
        if matches!(e, RepoError::Forbidden) {
            warn!(news_id = id, "delete by non-owner refused");
        }
        news_error("delete")(e)
    })?;
    info!(news_id = id, "news deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Newest first; 404 when the user does not exist.
#[instrument(skip(state))]
pub async fn list_user_news(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Paginated<News>>> {
    let Path(user_id) = path?;
    let Query(q) = query?;
    let params = q.resolve()?;

    if state.users.get_by_id(user_id).await?.is_none() {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let filter = NewsFilter {
        keyword: None,
        creator_id: Some(user_id),
    };
    let (items, total) = state.news.list(&filter, NewsSort::default(), params).await?;
    Ok(Json(Paginated::new(items, total, params)))
}
