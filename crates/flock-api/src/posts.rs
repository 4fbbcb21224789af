use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use flock_gateway::auth::Identity;
use flock_types::Id;
use flock_types::api::{CreateCommentRequest, CreatePostRequest, LikeSummary, Removed};
use flock_types::models::{Comment, Post};

use crate::auth::AppState;
use crate::error::ApiError;

const FEED_LIMIT: u32 = 50;
const MAX_POST_CHARS: usize = 2000;

/// POST /posts: text, a media reference, or both.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.filter(|c| !c.trim().is_empty());
    if content.is_none() && req.media.is_none() {
        return Err(ApiError::BadRequest("post must contain either content or media".into()));
    }
    if content.as_ref().is_some_and(|c| c.chars().count() > MAX_POST_CHARS) {
        return Err(ApiError::BadRequest(format!("post exceeds {MAX_POST_CHARS} characters")));
    }
    if req.media.as_ref().is_some_and(|m| m.url.trim().is_empty()) {
        return Err(ApiError::BadRequest("media url is required".into()));
    }

    let user_id = identity.user_id;
    let media = req.media;
    let row = state
        .db
        .call(move |db| db.create_post(user_id, content.as_deref(), media.as_ref()))
        .await?;

    Ok((StatusCode::CREATED, Json(Post::from(row))))
}

/// GET /posts: most recent posts across all users.
pub async fn list_posts(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.call(|db| db.list_posts(FEED_LIMIT)).await?;
    Ok(Json(rows.into_iter().map(Post::from).collect::<Vec<_>>()))
}

/// DELETE /posts/{post_id}: owner only; comments and likes go with it.
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(post_id): Path<Id>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = identity.user_id;
    state.db.call(move |db| db.delete_post(post_id, owner)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/{post_id}/like
pub async fn like(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(post_id): Path<Id>,
) -> Result<impl IntoResponse, ApiError> {
    state.actions.like(&identity, post_id).await?;
    let summary = like_summary_for(&state, post_id, identity.user_id).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// DELETE /posts/{post_id}/like
pub async fn unlike(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(post_id): Path<Id>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    let removed = state.db.call(move |db| db.unlike_post(user_id, post_id)).await?;
    Ok(Json(Removed { removed }))
}

/// GET /posts/{post_id}/likes
pub async fn likes(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(post_id): Path<Id>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(like_summary_for(&state, post_id, identity.user_id).await?))
}

/// POST /posts/{post_id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(post_id): Path<Id>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state.actions.comment(&identity, post_id, req.content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// GET /posts/{post_id}/comments: newest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Id>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.db.call(move |db| db.list_comments(post_id)).await?;
    Ok(Json(rows.into_iter().map(Comment::from).collect::<Vec<_>>()))
}

async fn like_summary_for(state: &AppState, post_id: Id, viewer: Id) -> Result<LikeSummary, ApiError> {
    let (likes, is_liked_by_user) = state.db.call(move |db| db.like_summary(post_id, viewer)).await?;
    Ok(LikeSummary { likes, is_liked_by_user })
}
