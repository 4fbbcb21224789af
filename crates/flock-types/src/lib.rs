pub mod api;
pub mod events;
pub mod models;

/// Numeric primary key used for users, posts, comments, messages and notifications.
pub type Id = i64;
