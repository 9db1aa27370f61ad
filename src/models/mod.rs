//! Data models: identities, connections, chat messages, rooms, and the wire protocol.

pub mod chat;
pub mod event;
pub mod identity;
pub mod presence;
pub mod room;

pub use chat::*;
pub use event::*;
pub use identity::*;
pub use presence::*;
pub use room::*;
