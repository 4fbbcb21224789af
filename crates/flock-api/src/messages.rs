use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use flock_gateway::auth::Identity;
use flock_types::Id;
use flock_types::api::SendMessageRequest;
use flock_types::models::Message;

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// POST /messages/{user_id}
pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(receiver_id): Path<Id>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.actions.message(&identity, receiver_id, req.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/{user_id}: conversation history, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(peer): Path<Id>,
    Query(query): Query<ConversationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let me = identity.user_id;
    let limit = query.limit.min(200);
    let rows = state.db.call(move |db| db.list_conversation(me, peer, limit)).await?;

    Ok(Json(rows.into_iter().map(Message::from).collect::<Vec<_>>()))
}
