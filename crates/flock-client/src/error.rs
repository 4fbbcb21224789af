use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gateway handshake failed: {0}")]
    Handshake(String),

    #[error("gateway connection closed")]
    Closed,
}
