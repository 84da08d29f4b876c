//! Strand Net Iroh
//!
//! Iroh-specific networking components:
//! - `IrohTransport`: QUIC transport with mDNS/DNS/static discovery
//! - `IrohPubsub`: per-thread topics over `iroh-gossip`
//! - `SyncProtocol` / `spawn_router`: inbound connection routing
//!
//! A composition root binds these to `strand_net::Net` with the same
//! Ed25519 identity the node signs requests with.

pub mod protocol;
pub mod pubsub;
pub mod transport;

pub use protocol::{spawn_router, SyncProtocol};
pub use pubsub::{topic_for_thread, IrohPubsub};
pub use transport::{IrohBiStream, IrohConnection, IrohTransport, PublicKey, STRAND_ALPN};
