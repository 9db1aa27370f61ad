//! The real-time hub: connection registry, presence, rooms, chat relay, playback sync, signaling.

pub mod hub;
pub mod playback;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod signaling;

pub use hub::Hub;
pub use playback::{PlaybackCommand, PlaybackState, SyncService};
pub use presence::PresenceService;
pub use registry::ConnectionRegistry;
pub use relay::MessageRelay;
pub use rooms::RoomService;
pub use signaling::SignalingService;
