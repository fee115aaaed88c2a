//! Remote replication
//!
//! - **scheduler**: per-key debounce timers ([`SyncScheduler`])
//! - **client**: dedup, chunking, retry and the status machine ([`RemoteSyncClient`])
//! - **transport**: pluggable backend ([`RestTransport`], [`MemoryTransport`])
//!
//! Replication is best-effort and never blocks a local write.

pub mod client;
pub mod error;
pub mod scheduler;
pub mod transport;

pub use client::{FULL_PUSH_KEY, RemoteSyncClient, dedup_by_key};
pub use error::{SyncError, SyncResult};
pub use scheduler::SyncScheduler;
pub use transport::{MemoryTransport, RemoteTransport, RestTransport, UpsertRequest};
