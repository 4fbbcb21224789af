//! Real-time side of flock: credential checks, identity rooms, the
//! action pipeline that feeds them, and the WebSocket connection loop.

pub mod actions;
pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod registry;
