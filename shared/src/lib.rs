//! Shared types for the front-desk engine
//!
//! Reservation aggregate, room registry types, profiles, and the row shapes
//! replicated to the remote backend.

pub mod cloud;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use models::{Reservation, RoomStay, StayStatus};
