//! Data models
//!
//! Shared between the front-desk engine and its collaborators.
//! Field names serialize in camelCase; that JSON is both the local cache
//! payload and the remote `data` blob.

pub mod profile;
pub mod reservation;
pub mod room;
pub mod room_stay;

// Re-exports
pub use profile::*;
pub use reservation::*;
pub use room::*;
pub use room_stay::*;
