use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use flock_gateway::auth::Identity;
use flock_types::Id;
use flock_types::api::{FollowStatus, ProfileResponse, Removed, UpdateStatusRequest, UserSearchResult};
use flock_types::models::{Post, User};

use crate::auth::AppState;
use crate::error::ApiError;

const SEARCH_LIMIT: u32 = 10;
const MAX_STATUS_CHARS: usize = 280;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /users/profile
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    let row = state
        .db
        .call(move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(User::from(row)))
}

/// POST /users/status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.status.trim().is_empty() {
        return Err(ApiError::BadRequest("status is required".into()));
    }
    if req.status.chars().count() > MAX_STATUS_CHARS {
        return Err(ApiError::BadRequest(format!("status exceeds {MAX_STATUS_CHARS} characters")));
    }

    let user_id = identity.user_id;
    let status = req.status.clone();
    state.db.call(move |db| db.update_status(user_id, &status)).await?;

    Ok(Json(serde_json::json!({ "status": req.status })))
}

/// GET /users/search?q=
pub async fn search(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.q.trim().to_string();
    if q.is_empty() {
        return Err(ApiError::BadRequest("search query cannot be empty".into()));
    }

    let viewer = identity.user_id;
    let rows = state.db.call(move |db| db.search_users(viewer, &q, SEARCH_LIMIT)).await?;

    let results: Vec<UserSearchResult> = rows
        .into_iter()
        .map(|row| UserSearchResult {
            id: row.id,
            username: row.username,
            is_following: row.is_following,
        })
        .collect();

    Ok(Json(results))
}

/// GET /users/profile/{username}
pub async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .db
        .call(move |db| db.get_profile(&username))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(Json(ProfileResponse {
        id: row.user.id,
        username: row.user.username,
        email: row.user.email,
        profile_picture: row.user.profile_picture,
        status: row.user.status,
        followers_count: row.followers_count,
        following_count: row.following_count,
    }))
}

/// GET /users/profile/{username}/posts
pub async fn posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.call(move |db| db.list_user_posts(&username)).await?;
    Ok(Json(rows.into_iter().map(Post::from).collect::<Vec<_>>()))
}

/// GET /users/{user_id}/is-following
pub async fn is_following(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(target): Path<Id>,
) -> Result<impl IntoResponse, ApiError> {
    let follower = identity.user_id;
    let is_following = state.db.call(move |db| db.is_following(follower, target)).await?;
    Ok(Json(FollowStatus { is_following }))
}

/// POST /users/{user_id}/follow
pub async fn follow(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(target): Path<Id>,
) -> Result<impl IntoResponse, ApiError> {
    state.actions.follow(&identity, target).await?;

    Ok(Json(FollowStatus { is_following: true }))
}

/// DELETE /users/{user_id}/follow
pub async fn unfollow(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(target): Path<Id>,
) -> Result<impl IntoResponse, ApiError> {
    let follower = identity.user_id;
    let removed = state.db.call(move |db| db.unfollow(follower, target)).await?;
    Ok(Json(Removed { removed }))
}
