use serde::{Deserialize, Serialize};

use crate::Id;
use crate::models::{Message, Notification};

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms the connection joined its identity room
    Ready { user_id: Id, username: String },

    /// A notification addressed to this identity was persisted
    Notification(Notification),

    /// A direct message arrived in a joined conversation
    NewMessage(Message),
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayCommand {
    /// Flip the read flag on one of the caller's notifications
    MarkNotificationAsRead { notification_id: Id },

    /// Start receiving `newMessage` events from the conversation with `user_id`
    JoinConversation { user_id: Id },

    /// Stop receiving `newMessage` events from the conversation with `user_id`
    LeaveConversation { user_id: Id },

    /// Persist a direct message and relay it to the receiver
    SendMessage { receiver_id: Id, content: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_names_are_camel_case() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"markNotificationAsRead","data":{"notification_id":9}}"#,
        )
        .unwrap();
        assert_eq!(cmd, GatewayCommand::MarkNotificationAsRead { notification_id: 9 });

        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"joinConversation","data":{"user_id":2}}"#).unwrap();
        assert_eq!(cmd, GatewayCommand::JoinConversation { user_id: 2 });
    }

    #[test]
    fn new_message_event_is_tagged() {
        let event = GatewayEvent::NewMessage(Message {
            id: 1,
            sender_id: 1,
            receiver_id: 2,
            content: "hi".into(),
            created_at: chrono::DateTime::default(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "newMessage");
        assert_eq!(json["data"]["content"], "hi");
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<GatewayCommand>(r#"{"type":"voiceJoin","data":{}}"#).is_err());
    }
}
