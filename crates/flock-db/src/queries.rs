use rusqlite::{Connection, OptionalExtension, Row, params};

use flock_types::Id;
use flock_types::models::Media;

use crate::error::classify;
use crate::models::{CommentRow, MessageRow, PostRow, ProfileRow, UserRow, UserSearchRow};
use crate::{Database, DbError, Result};

const USER_COLUMNS: &str = "id, username, email, password, profile_picture, status, created_at";

const POST_SELECT: &str = "SELECT p.id, p.user_id, u.username, p.content, p.media_url, p.media_kind, p.created_at
     FROM posts p
     JOIN users u ON p.user_id = u.id";

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password) VALUES (?1, ?2, ?3)",
                params![username, email, password_hash],
            )
            .map_err(|e| classify(e, "username or email"))?;

            let id = conn.last_insert_rowid();
            query_user_by_id(conn, id)?.ok_or(DbError::NotFound("user"))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
            Ok(conn.query_row(&sql, [username], map_user).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: Id) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn update_status(&self, user_id: Id, status: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET status = ?1 WHERE id = ?2",
                params![status, user_id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound("user"));
            }
            Ok(())
        })
    }

    pub fn get_profile(&self, username: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT u.id, u.username, u.email, u.password, u.profile_picture, u.status, u.created_at,
                        (SELECT COUNT(*) FROM followers WHERE followed_id = u.id),
                        (SELECT COUNT(*) FROM followers WHERE follower_id = u.id)
                     FROM users u
                     WHERE u.username = ?1",
                    [username],
                    |row| {
                        Ok(ProfileRow {
                            user: map_user(row)?,
                            followers_count: row.get(7)?,
                            following_count: row.get(8)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Username substring search on behalf of `viewer`, who is never in the result.
    pub fn search_users(&self, viewer: Id, query: &str, limit: u32) -> Result<Vec<UserSearchRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username,
                    EXISTS(SELECT 1 FROM followers WHERE follower_id = ?1 AND followed_id = u.id)
                 FROM users u
                 WHERE u.username LIKE '%' || ?2 || '%' ESCAPE '\\' AND u.id != ?1
                 ORDER BY u.username
                 LIMIT ?3",
            )?;

            let rows = stmt
                .query_map(params![viewer, escape_like(query), limit], |row| {
                    Ok(UserSearchRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        is_following: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn is_following(&self, follower_id: Id, followed_id: Id) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM followers WHERE follower_id = ?1 AND followed_id = ?2)",
                params![follower_id, followed_id],
                |row| row.get(0),
            )?)
        })
    }

    // -- Posts --

    /// At least one of `content` or `media` must be present.
    pub fn create_post(&self, user_id: Id, content: Option<&str>, media: Option<&Media>) -> Result<PostRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (user_id, content, media_url, media_kind) VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id,
                    content,
                    media.map(|m| m.url.as_str()),
                    media.map(|m| m.kind.as_str()),
                ],
            )
            .map_err(|e| classify(e, "post"))?;

            let id = conn.last_insert_rowid();
            query_post(conn, id)?.ok_or(DbError::NotFound("post"))
        })
    }

    pub fn get_post(&self, post_id: Id) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, post_id))
    }

    pub fn list_posts(&self, limit: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} ORDER BY p.created_at DESC, p.id DESC LIMIT ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_user_posts(&self, username: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE u.username = ?1 ORDER BY p.created_at DESC, p.id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([username], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Deletes a post owned by `owner_id`. Comments and likes cascade; the
    /// like and comment notifications pointing at it are removed alongside.
    pub fn delete_post(&self, post_id: Id, owner_id: Id) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let owner: Id = post_owner(&tx, post_id)?.ok_or(DbError::NotFound("post"))?;
            if owner != owner_id {
                return Err(DbError::NotOwner("post"));
            }

            // target_id is only a post id for these two kinds
            tx.execute(
                "DELETE FROM notifications WHERE target_id = ?1 AND type IN ('like', 'comment')",
                [post_id],
            )?;
            tx.execute("DELETE FROM posts WHERE id = ?1", [post_id])?;

            tx.commit()?;
            Ok(())
        })
    }

    pub fn like_summary(&self, post_id: Id, viewer: Id) -> Result<(i64, bool)> {
        self.with_conn(|conn| {
            post_owner(conn, post_id)?.ok_or(DbError::NotFound("post"))?;
            Ok(conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(user_id = ?2), 0) > 0 FROM likes WHERE post_id = ?1",
                params![post_id, viewer],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })
    }

    /// Returns whether a like was removed.
    pub fn unlike_post(&self, user_id: Id, post_id: Id) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Comments --

    pub fn list_comments(&self, post_id: Id) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            post_owner(conn, post_id)?.ok_or(DbError::NotFound("post"))?;

            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.user_id, u.username, c.content, c.created_at
                 FROM comments c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at DESC, c.id DESC",
            )?;
            let rows = stmt
                .query_map([post_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// The most recent `limit` messages between two users, oldest first.
    pub fn list_conversation(&self, a: Id, b: Id, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
            )?;
            let mut rows = stmt
                .query_map(params![a, b, limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: Id) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_user).optional()?)
}

pub(crate) fn query_post(conn: &Connection, id: Id) -> Result<Option<PostRow>> {
    let sql = format!("{POST_SELECT} WHERE p.id = ?1");
    Ok(conn.query_row(&sql, [id], map_post).optional()?)
}

pub(crate) fn post_owner(conn: &Connection, post_id: Id) -> Result<Option<Id>> {
    Ok(conn
        .query_row("SELECT user_id FROM posts WHERE id = ?1", [post_id], |row| row.get(0))
        .optional()?)
}

pub(crate) fn user_exists(conn: &Connection, id: Id) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

/// Make `%`, `_` and `\` match literally under `ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_picture: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        content: row.get(3)?,
        media_url: row.get(4)?,
        media_kind: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(crate) fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub(crate) fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
