use axum::{Extension, Json, extract::State, response::IntoResponse};

use flock_gateway::auth::Identity;
use flock_types::models::Notification;

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /notifications: full history for the caller, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = identity.user_id;
    let rows = state.db.call(move |db| db.list_notifications(recipient)).await?;

    Ok(Json(rows.into_iter().map(Notification::from).collect::<Vec<_>>()))
}
