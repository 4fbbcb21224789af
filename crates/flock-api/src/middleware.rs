use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use flock_gateway::auth::{bearer_token, verify_token};

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the JWT from the Authorization header, binding the
/// request to an [`Identity`](flock_gateway::auth::Identity) extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = bearer_token(header)?;
    let identity = verify_token(&state.jwt_secret, token)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
