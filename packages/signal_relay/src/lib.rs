// Library interface for the signaling relay
// Exposes the relay core and its HTTP router for embedding and integration tests

pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod peer;
pub mod protocol;
pub mod relay;
pub mod server;

pub use config::{FileConfig, RelayConfig, load_config};
pub use directory::{PeerDirectory, Roster};
pub use error::RelayError;
pub use metrics::RelayMetrics;
pub use protocol::{PeerId, PresenceAction, PresenceEvent, ServerMessage, SignalingMessage};
pub use relay::{PeerSession, Relay};
pub use server::{AppState, build_router};
