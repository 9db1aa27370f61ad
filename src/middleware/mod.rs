//! Request extractors for authenticated HTTP routes and the WebSocket handshake.

pub mod auth;

pub use auth::{AuthUser, SessionIdentity};
