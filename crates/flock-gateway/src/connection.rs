use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use flock_db::DbError;
use flock_types::events::{GatewayCommand, GatewayEvent};

use crate::actions::{Action, ActionService};
use crate::auth::Identity;
use crate::registry::ConnectionId;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive a WebSocket whose credential was already verified at the HTTP
/// upgrade. The connection joins `identity`'s room before `ready` is sent,
/// so a client that fetches history after `ready` cannot miss an event.
pub async fn handle_connection(socket: WebSocket, actions: ActionService, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();
    let dispatcher = actions.dispatcher().clone();

    let (conn_id, mut events_rx) = dispatcher.connect(identity.user_id).await;
    info!("{} ({}) connected to gateway", identity.username, identity.user_id);

    let ready = GatewayEvent::Ready {
        user_id: identity.user_id,
        username: identity.username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        dispatcher.disconnect(conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => handle_command(&actions, conn_id, &recv_identity, cmd).await,
                    Err(e) => {
                        let raw = text.as_str();
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_identity.username,
                            recv_identity.user_id,
                            e,
                            raw.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(conn_id).await;
    info!("{} ({}) disconnected from gateway", identity.username, identity.user_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}

async fn handle_command(actions: &ActionService, conn_id: ConnectionId, identity: &Identity, cmd: GatewayCommand) {
    let user_id = identity.user_id;

    match cmd {
        GatewayCommand::MarkNotificationAsRead { notification_id } => {
            let result = actions
                .db()
                .call(move |db| db.mark_notification_read(notification_id, user_id))
                .await;
            match result {
                Ok(()) => debug!("{} ({}) read notification {}", identity.username, user_id, notification_id),
                Err(DbError::NotFound(_)) => warn!(
                    "{} ({}) cannot mark notification {}: not theirs or missing",
                    identity.username, user_id, notification_id
                ),
                Err(e) => error!("Failed to mark notification {} as read: {}", notification_id, e),
            }
        }

        GatewayCommand::JoinConversation { user_id: peer } => {
            if peer == user_id {
                warn!("{} ({}) tried to join a conversation with themselves", identity.username, user_id);
                return;
            }
            if actions.dispatcher().join_conversation(conn_id, peer).await.is_some() {
                info!("{} ({}) joined conversation with {}", identity.username, user_id, peer);
            }
        }

        GatewayCommand::LeaveConversation { user_id: peer } => {
            if actions.dispatcher().leave_conversation(conn_id, peer).await {
                info!("{} ({}) left conversation with {}", identity.username, user_id, peer);
            }
        }

        GatewayCommand::SendMessage { receiver_id, content } => {
            if let Err(e) = actions
                .perform(identity, Action::Message { receiver_id, content })
                .await
            {
                warn!("{} ({}) message to {} failed: {}", identity.username, user_id, receiver_id, e);
            }
        }
    }
}
