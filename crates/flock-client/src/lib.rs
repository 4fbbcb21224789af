//! Client side of flock: a notification list that merges fetched history
//! with pushed events, and a session that keeps it fed.

pub mod error;
pub mod session;
pub mod store;

pub use error::ClientError;
pub use session::{LiveFeed, Session};
pub use store::NotificationStore;
