pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use flock_api::auth::{self, AppState, AppStateInner};
use flock_api::error::ApiError;
use flock_api::middleware::require_auth;
use flock_api::{messages, notifications, posts, users};
use flock_db::Database;
use flock_gateway::actions::ActionService;
use flock_gateway::auth::{bearer_token, verify_token};
use flock_gateway::connection;
use flock_gateway::dispatcher::Dispatcher;

use crate::config::Config;

pub fn app_state(db: Arc<Database>, config: &Config) -> AppState {
    let dispatcher = Dispatcher::new();
    Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: config.token_ttl,
        actions: ActionService::new(db, dispatcher),
    })
}

pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/gateway", get(ws_upgrade));

    let protected_routes = Router::new()
        .route("/users/profile", get(users::me))
        .route("/users/status", post(users::update_status))
        .route("/users/search", get(users::search))
        .route("/users/profile/{username}", get(users::profile))
        .route("/users/profile/{username}/posts", get(users::posts))
        .route("/users/{user_id}/is-following", get(users::is_following))
        .route("/users/{user_id}/follow", post(users::follow).delete(users::unfollow))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/{post_id}", delete(posts::delete_post))
        .route("/posts/{post_id}/like", post(posts::like).delete(posts::unlike))
        .route("/posts/{post_id}/likes", get(posts::likes))
        .route("/posts/{post_id}/comments", get(posts::list_comments).post(posts::create_comment))
        .route("/messages/{user_id}", get(messages::get_conversation).post(messages::send_message))
        .route("/notifications", get(notifications::list_notifications))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// arrive as `?token=`. A bad credential is answered with 401 and no
/// socket is opened.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = match query.token.as_deref() {
        Some(token) => token,
        None => bearer_token(headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()))?,
    };
    let identity = verify_token(&state.jwt_secret, token)?;
    debug!("Gateway upgrade for {} ({})", identity.username, identity.user_id);

    let actions = state.actions.clone();
    Ok(ws
        .on_upgrade(move |socket| connection::handle_connection(socket, actions, identity))
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::Duration;
    use tower::ServiceExt;

    use flock_gateway::auth::issue_token;
    use flock_types::api::ErrorBody;

    use super::*;

    fn test_config() -> Config {
        Config {
            jwt_secret: "test-secret".into(),
            db_path: "unused.db".into(),
            host: "127.0.0.1".into(),
            port: 0,
            token_ttl: Duration::hours(1),
        }
    }

    fn router() -> (Router, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (build_router(app_state(db.clone(), &test_config())), db)
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let (app, _) = router();
        let response = app
            .oneshot(Request::get("/notifications").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(!body.message.is_empty());
    }

    #[tokio::test]
    async fn valid_token_reaches_the_handler() {
        let (app, db) = router();
        let user = db.create_user("alice", "alice@flock.test", "hash").unwrap();
        let token = issue_token("test-secret", user.id, &user.username, Duration::hours(1)).unwrap();

        let response = app
            .oneshot(
                Request::get("/notifications")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"[]");
    }

    #[tokio::test]
    async fn token_from_another_secret_is_rejected() {
        let (app, _) = router();
        let token = issue_token("other-secret", 1, "mallory", Duration::hours(1)).unwrap();

        let response = app
            .oneshot(
                Request::get("/users/profile")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
