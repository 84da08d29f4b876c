//! Strand Net Sim
//!
//! In-memory network simulation:
//! - `ChannelTransport` — `Transport` over tokio duplex streams
//! - `BroadcastPubsub` — `PubsubLayer` over broadcast channels
//!
//! Enables multi-node replication tests without real networking.

mod broadcast_pubsub;
mod channel_transport;

pub use broadcast_pubsub::{BroadcastPubsub, PubsubNetwork};
pub use channel_transport::{ChannelBiStream, ChannelConnection, ChannelNetwork, ChannelTransport};
