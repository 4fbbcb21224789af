use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use reqwest::Response;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use flock_types::Id;
use flock_types::api::{AuthResponse, ErrorBody, LoginRequest};
use flock_types::events::{GatewayCommand, GatewayEvent};
use flock_types::models::{Message, Notification, User};

use crate::error::ClientError;
use crate::store::NotificationStore;

/// An authenticated user talking to one flock server.
#[derive(Clone)]
pub struct Session {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl Session {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn login(base_url: &str, username: &str, password: &str) -> Result<(Self, User), ClientError> {
        let http = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();
        let response = http
            .post(format!("{base_url}/login"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let auth: AuthResponse = check(response).await?.json().await?;

        let session = Self { http, base_url, token: auth.token };
        Ok((session, auth.user))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// GET /notifications, newest first.
    pub async fn fetch_notifications(&self) -> Result<Vec<Notification>, ClientError> {
        let response = self
            .http
            .get(format!("{}/notifications", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// GET /messages/{peer}, oldest first.
    pub async fn fetch_conversation(&self, peer: Id) -> Result<Vec<Message>, ClientError> {
        let response = self
            .http
            .get(format!("{}/messages/{}", self.base_url, peer))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Open the gateway and wait for `ready`. The returned feed is
    /// subscribed but unseeded.
    pub async fn connect(&self) -> Result<LiveFeed, ClientError> {
        let url = format!("{}/gateway?token={}", ws_base(&self.base_url), self.token);
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, mut stream) = socket.split();

        let (user_id, username) = loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<GatewayEvent>(text.as_str())? {
                    GatewayEvent::Ready { user_id, username } => break (user_id, username),
                    other => return Err(ClientError::Handshake(format!("expected ready, got {other:?}"))),
                },
                Some(Ok(WsMessage::Close(_))) | None => return Err(ClientError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        };
        debug!("Gateway ready for {} ({})", username, user_id);

        let store = Arc::new(Mutex::new(NotificationStore::new()));
        let (version_tx, version_rx) = watch::channel(0u64);
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (commands_tx, mut commands_rx) = mpsc::unbounded_channel::<GatewayCommand>();

        let reader_store = store.clone();
        let reader_version = version_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Gateway read failed: {}", e);
                        break;
                    }
                };

                match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                    Ok(GatewayEvent::Notification(n)) => {
                        if lock(&reader_store).push(n) {
                            reader_version.send_modify(|v| *v += 1);
                        }
                    }
                    Ok(GatewayEvent::NewMessage(m)) => {
                        let _ = messages_tx.send(m);
                    }
                    Ok(GatewayEvent::Ready { .. }) => {}
                    Err(e) => warn!("Unreadable gateway event: {}", e),
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(cmd) = commands_rx.recv().await {
                let text = match serde_json::to_string(&cmd) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Unserializable command {:?}: {}", cmd, e);
                        continue;
                    }
                };
                if sink.send(WsMessage::text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        Ok(LiveFeed {
            user_id,
            username,
            store,
            version_tx,
            version_rx,
            commands: commands_tx,
            messages: messages_rx,
            reader,
            writer,
        })
    }

    /// Subscribe first, then fetch history and merge it in. Anything created
    /// between the two steps arrives live, in history, or both, and is kept once.
    pub async fn mount(&self) -> Result<LiveFeed, ClientError> {
        let feed = self.connect().await?;
        let history = self.fetch_notifications().await?;
        feed.seed(history);
        Ok(feed)
    }
}

/// A live gateway subscription feeding a [`NotificationStore`].
pub struct LiveFeed {
    user_id: Id,
    username: String,
    store: Arc<Mutex<NotificationStore>>,
    version_tx: watch::Sender<u64>,
    version_rx: watch::Receiver<u64>,
    commands: mpsc::UnboundedSender<GatewayCommand>,
    messages: mpsc::UnboundedReceiver<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl LiveFeed {
    pub fn user_id(&self) -> Id {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn seed(&self, history: Vec<Notification>) {
        lock(&self.store).seed(history);
        self.version_tx.send_modify(|v| *v += 1);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.store).notifications().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.store).unread_count()
    }

    /// Flip the flag locally and ask the server to do the same. The request
    /// is fire-and-forget: a lost request leaves the local flag set.
    pub fn mark_read(&self, id: Id) {
        if lock(&self.store).mark_read(id) {
            self.version_tx.send_modify(|v| *v += 1);
        }
        self.send(GatewayCommand::MarkNotificationAsRead { notification_id: id });
    }

    pub fn join_conversation(&self, peer: Id) {
        self.send(GatewayCommand::JoinConversation { user_id: peer });
    }

    pub fn leave_conversation(&self, peer: Id) {
        self.send(GatewayCommand::LeaveConversation { user_id: peer });
    }

    pub fn send_message(&self, receiver_id: Id, content: impl Into<String>) {
        self.send(GatewayCommand::SendMessage {
            receiver_id,
            content: content.into(),
        });
    }

    /// Next `newMessage` from a joined conversation.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.messages.recv().await
    }

    /// Wait until the store satisfies `predicate`.
    pub async fn wait_until<F>(&mut self, predicate: F) -> Result<(), ClientError>
    where
        F: Fn(&NotificationStore) -> bool,
    {
        loop {
            if predicate(&lock(&self.store)) {
                return Ok(());
            }
            self.version_rx.changed().await.map_err(|_| ClientError::Closed)?;
        }
    }

    fn send(&self, cmd: GatewayCommand) {
        if self.commands.send(cmd).is_err() {
            debug!("Gateway writer gone; command dropped");
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

fn lock(store: &Mutex<NotificationStore>) -> MutexGuard<'_, NotificationStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn ws_base(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.message)
        .unwrap_or_default();
    Err(ClientError::Status { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_url_follows_http_scheme() {
        assert_eq!(ws_base("http://localhost:5000"), "ws://localhost:5000");
        assert_eq!(ws_base("https://flock.example"), "wss://flock.example");
    }
}
