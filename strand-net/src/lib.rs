//! Strand Net
//!
//! The peer-to-peer replication core: server handlers for the five
//! sync RPCs, the de-duplicating call queue behind them, per-thread
//! semaphores, edge-based divergence handling, the thread-status
//! registry, the pubsub relay, and the outbound client the scheduled
//! work runs on. Transport and pubsub fabrics are injected through the
//! `strand-net-types` seams.

pub mod auth;
pub mod client;
pub mod convert;
pub mod error;
pub mod framing;
pub mod handlers;
pub mod net;
pub mod peers;
pub mod proto;
pub mod pubsub;
pub mod queue;
pub mod semaphore;
pub mod server;
pub mod status;

pub use error::NetError;
pub use framing::{MessageSink, MessageStream};
pub use handlers::{dispatch_stream, handle_connection};
pub use net::{Net, NetConfig, DEFAULT_MAX_PULL_LIMIT};
pub use peers::PeerRegistry;
pub use queue::{CallPriority, CallQueue, SyncOp};
pub use semaphore::{SemaphoreGuard, SemaphorePool, ThreadSemaphore};
pub use status::{DownloadGuard, PeerThreadStatus, SyncState, ThreadStatus, ThreadStatusRegistry};
