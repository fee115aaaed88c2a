//! Reservation inventory
//!
//! - **interval**: half-open stay intervals and the per-room overlap check
//! - **store**: [`ReservationStore`], the single writer enforcing room non-overlap
//! - **portal**: guest portal code allocation and validity windows
//! - **view**: flattened (reservation × room stay) projection
//! - **billing**: charge / payment totals
//! - **rooms**: read-only room registry collaborator
//!
//! # Write Path
//!
//! ```text
//! FrontDesk → ReservationStore ──sync──→ LocalCache (redb)
//!                    │
//!                    └──async──→ SyncScheduler → RemoteSyncClient
//! ```

pub mod billing;
pub mod error;
pub mod interval;
pub mod portal;
pub mod rooms;
pub mod store;
pub mod view;

pub use billing::BillingSummary;
pub use error::{ConflictError, StoreError, StoreResult};
pub use interval::{StayInterval, overlaps};
pub use portal::{PortalError, PortalGrant};
pub use rooms::{RoomRegistry, StaticRoomRegistry};
pub use store::{DEFAULT_REF_PREFIX, PortalAccess, ReservationDraft, ReservationStore};
pub use view::FlatStay;
