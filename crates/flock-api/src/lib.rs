pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod users;
