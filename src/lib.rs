//! Room Relay - presence and signaling relay for peer-to-peer meetings
//!
//! Clients join named rooms, learn who else is present, and exchange opaque
//! connection-negotiation messages through the server. Media never passes
//! through here; all state is in memory and lost on restart.

pub mod config;
pub mod identity;
pub mod lifecycle;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod room;
pub mod transport;

pub use config::ServerConfig;
pub use lifecycle::LifecycleManager;
pub use protocol::SignalingMessage;
pub use registry::{ConnectionId, ConnectionRegistry};
pub use room::{Participant, Room, RoomError, RoomStore};
