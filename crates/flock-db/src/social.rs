//! Social actions and the notifications they produce.
//!
//! Every action runs in one transaction: the edge/row write and its
//! notification row commit together or not at all. Callers publish only
//! after these functions return `Ok`.

use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

use flock_types::Id;
use flock_types::models::NotificationKind;

use crate::error::classify;
use crate::models::{CommentRow, MessageRow, NotificationRow};
use crate::queries::{map_comment, map_message, post_owner, user_exists};
use crate::{Database, DbError, Result};

const NOTIFICATION_SELECT: &str =
    "SELECT n.id, n.user_id, n.type, n.actor_id, u.username, n.target_id, n.is_read, n.created_at
     FROM notifications n
     JOIN users u ON n.actor_id = u.id";

impl Database {
    // -- Follows --

    /// Store the edge and notify the followed user.
    pub fn record_follow(&self, follower_id: Id, followed_id: Id) -> Result<NotificationRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !user_exists(&tx, followed_id)? {
                return Err(DbError::NotFound("user"));
            }

            tx.execute(
                "INSERT INTO followers (follower_id, followed_id) VALUES (?1, ?2)",
                params![follower_id, followed_id],
            )
            .map_err(|e| classify(e, "follow"))?;

            let notification =
                insert_notification(&tx, followed_id, NotificationKind::Follow, follower_id, None)?;

            tx.commit()?;
            Ok(notification)
        })
    }

    /// Returns whether an edge was removed.
    pub fn unfollow(&self, follower_id: Id, followed_id: Id) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM followers WHERE follower_id = ?1 AND followed_id = ?2",
                params![follower_id, followed_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Likes --

    /// Store the like. The owner is resolved inside the same transaction so a
    /// concurrently deleted post yields `NotFound` rather than an orphan like.
    /// No notification when the actor owns the post.
    pub fn record_like(&self, user_id: Id, post_id: Id) -> Result<Option<NotificationRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let owner = post_owner(&tx, post_id)?.ok_or(DbError::NotFound("post"))?;

            tx.execute(
                "INSERT INTO likes (user_id, post_id) VALUES (?1, ?2)",
                params![user_id, post_id],
            )
            .map_err(|e| classify(e, "like"))?;

            let notification = if owner != user_id {
                Some(insert_notification(&tx, owner, NotificationKind::Like, user_id, Some(post_id))?)
            } else {
                None
            };

            tx.commit()?;
            Ok(notification)
        })
    }

    // -- Comments --

    pub fn record_comment(
        &self,
        user_id: Id,
        post_id: Id,
        content: &str,
    ) -> Result<(CommentRow, Option<NotificationRow>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let owner = post_owner(&tx, post_id)?.ok_or(DbError::NotFound("post"))?;

            tx.execute(
                "INSERT INTO comments (post_id, user_id, content) VALUES (?1, ?2, ?3)",
                params![post_id, user_id, content],
            )?;
            let comment_id = tx.last_insert_rowid();

            let comment = tx.query_row(
                "SELECT c.id, c.post_id, c.user_id, u.username, c.content, c.created_at
                 FROM comments c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.id = ?1",
                [comment_id],
                map_comment,
            )?;

            let notification = if owner != user_id {
                Some(insert_notification(&tx, owner, NotificationKind::Comment, user_id, Some(post_id))?)
            } else {
                None
            };

            tx.commit()?;
            Ok((comment, notification))
        })
    }

    // -- Messages --

    pub fn record_message(&self, sender_id: Id, receiver_id: Id, content: &str) -> Result<MessageRow> {
        self.with_conn(|conn| {
            if !user_exists(conn, receiver_id)? {
                return Err(DbError::NotFound("user"));
            }

            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content) VALUES (?1, ?2, ?3)",
                params![sender_id, receiver_id, content],
            )?;

            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                "SELECT id, sender_id, receiver_id, content, created_at FROM messages WHERE id = ?1",
                [id],
                map_message,
            )?)
        })
    }

    // -- Notifications --

    /// All notifications for `recipient_id`, newest first.
    pub fn list_notifications(&self, recipient_id: Id) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!("{NOTIFICATION_SELECT} WHERE n.user_id = ?1 ORDER BY n.created_at DESC, n.id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([recipient_id], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip `is_read` on a notification owned by `recipient_id`. Repeating the
    /// call is a no-op; someone else's notification reads as `NotFound`.
    pub fn mark_notification_read(&self, notification_id: Id, recipient_id: Id) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![notification_id, recipient_id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound("notification"));
            }
            Ok(())
        })
    }
}

fn insert_notification(
    conn: &Connection,
    recipient_id: Id,
    kind: NotificationKind,
    actor_id: Id,
    target_id: Option<Id>,
) -> Result<NotificationRow> {
    conn.execute(
        "INSERT INTO notifications (user_id, type, actor_id, target_id, is_read) VALUES (?1, ?2, ?3, ?4, 0)",
        params![recipient_id, kind.as_str(), actor_id, target_id],
    )
    .map_err(|e| classify(e, "notification"))?;

    let id = conn.last_insert_rowid();
    let sql = format!("{NOTIFICATION_SELECT} WHERE n.id = ?1");
    Ok(conn.query_row(&sql, [id], map_notification)?)
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    let raw: String = row.get(2)?;
    let kind = NotificationKind::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, format!("unknown notification type '{raw}'").into())
    })?;

    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        actor_id: row.get(3)?,
        actor_username: row.get(4)?,
        target_id: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, Id, Id) {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("alice", "alice@example.com", "x").unwrap().id;
        let b = db.create_user("bob", "bob@example.com", "x").unwrap().id;
        (db, a, b)
    }

    fn notification_count(db: &Database) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn like_notifies_owner_once() {
        let (db, a, b) = setup();
        let post = db.create_post(b, Some("mine"), None).unwrap();

        let n = db.record_like(a, post.id).unwrap().unwrap();
        assert_eq!(n.user_id, b);
        assert_eq!(n.actor_id, a);
        assert_eq!(n.actor_username, "alice");
        assert_eq!(n.kind, NotificationKind::Like);
        assert_eq!(n.target_id, Some(post.id));
        assert!(!n.is_read);

        assert!(matches!(db.record_like(a, post.id), Err(DbError::Conflict("like"))));
        assert_eq!(notification_count(&db), 1);
    }

    #[test]
    fn own_like_and_comment_are_stored_silently() {
        let (db, a, _) = setup();
        let post = db.create_post(a, Some("mine"), None).unwrap();

        assert!(db.record_like(a, post.id).unwrap().is_none());
        let (comment, n) = db.record_comment(a, post.id, "me again").unwrap();
        assert!(n.is_none());
        assert_eq!(comment.content, "me again");
        assert_eq!(notification_count(&db), 0);
    }

    #[test]
    fn like_on_missing_post_leaves_nothing_behind() {
        let (db, a, _) = setup();
        assert!(matches!(db.record_like(a, 999), Err(DbError::NotFound("post"))));
        let likes: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM likes", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(likes, 0);
    }

    #[test]
    fn follow_conflicts_and_self_follow_is_invalid() {
        let (db, a, b) = setup();
        db.record_follow(a, b).unwrap();
        assert!(matches!(db.record_follow(a, b), Err(DbError::Conflict("follow"))));
        assert!(matches!(db.record_follow(a, a), Err(DbError::Invalid("follow"))));
        assert!(matches!(db.record_follow(a, 404), Err(DbError::NotFound("user"))));
        assert_eq!(notification_count(&db), 1);

        assert!(db.unfollow(a, b).unwrap());
        assert!(!db.unfollow(a, b).unwrap());
    }

    #[test]
    fn notifications_are_newest_first() {
        let (db, a, b) = setup();
        let post = db.create_post(b, Some("p"), None).unwrap();
        db.record_follow(a, b).unwrap();
        db.record_like(a, post.id).unwrap();
        db.record_comment(a, post.id, "hey").unwrap();

        let kinds: Vec<_> = db.list_notifications(b).unwrap().into_iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NotificationKind::Comment, NotificationKind::Like, NotificationKind::Follow]
        );
        assert!(db.list_notifications(a).unwrap().is_empty());
    }

    #[test]
    fn mark_read_is_idempotent_and_recipient_only() {
        let (db, a, b) = setup();
        let n = db.record_follow(a, b).unwrap();

        assert!(matches!(db.mark_notification_read(n.id, a), Err(DbError::NotFound(_))));
        assert!(!db.list_notifications(b).unwrap()[0].is_read);

        db.mark_notification_read(n.id, b).unwrap();
        db.mark_notification_read(n.id, b).unwrap();
        assert!(db.list_notifications(b).unwrap()[0].is_read);
    }

    #[test]
    fn message_to_unknown_user_is_not_found() {
        let (db, a, _) = setup();
        assert!(matches!(db.record_message(a, 77, "hi"), Err(DbError::NotFound("user"))));
    }
}
