//! Strand Net Types
//!
//! Trait seams between the replication core and its environment: the
//! transport (QUIC or in-memory) and the pubsub fabric. Keeping them
//! here lets the simulation harness and the iroh adapter implement the
//! same contracts without depending on each other.

pub mod pubsub;
pub mod transport;

pub use pubsub::{PubsubError, PubsubLayer};
pub use transport::{BiStream, Connection, Transport, TransportError};
