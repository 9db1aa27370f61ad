//! Client-side session helpers: local player sync, voice peer mesh, and the owned
//! connection slot. They speak the same wire protocol as the server.

pub mod mesh;
pub mod player;
pub mod session;

pub use mesh::{OutboundSignal, PeerMesh, PeerRole, PeerSession, PeerState};
pub use player::{PlayerSync, DRIFT_THRESHOLD_SECS};
pub use session::SessionSlot;
