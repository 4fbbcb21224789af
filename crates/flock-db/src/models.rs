//! Database row types. These map directly to SQLite rows; the `From` impls
//! turn them into the `flock-types` models served over REST and the gateway.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use flock_types::Id;
use flock_types::models::{Comment, Media, MediaKind, Message, Notification, NotificationKind, Post, User};

pub struct UserRow {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password: String,
    pub profile_picture: Option<String>,
    pub status: Option<String>,
    pub created_at: String,
}

pub struct ProfileRow {
    pub user: UserRow,
    pub followers_count: i64,
    pub following_count: i64,
}

pub struct UserSearchRow {
    pub id: Id,
    pub username: String,
    pub is_following: bool,
}

pub struct PostRow {
    pub id: Id,
    pub user_id: Id,
    pub username: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_kind: Option<String>,
    pub created_at: String,
}

pub struct CommentRow {
    pub id: Id,
    pub post_id: Id,
    pub user_id: Id,
    pub username: String,
    pub content: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: Id,
    pub sender_id: Id,
    pub receiver_id: Id,
    pub content: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: Id,
    pub user_id: Id,
    pub kind: NotificationKind,
    pub actor_id: Id,
    pub actor_username: String,
    pub target_id: Option<Id>,
    pub is_read: bool,
    pub created_at: String,
}

/// SQLite stores `datetime('now')` as "YYYY-MM-DD HH:MM:SS" without a zone.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            profile_picture: row.profile_picture,
            status: row.status,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        let media = match (row.media_url, row.media_kind.as_deref().and_then(MediaKind::parse)) {
            (Some(url), Some(kind)) => Some(Media { url, kind }),
            (Some(url), None) => {
                warn!("Post {} has media '{}' with unknown kind", row.id, url);
                None
            }
            _ => None,
        };

        Post {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            content: row.content,
            media,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            username: row.username,
            content: row.content,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            actor_id: row.actor_id,
            actor_username: row.actor_username,
            target_id: row.target_id,
            is_read: row.is_read,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
