//! Remote row shapes and sync status
//!
//! Every remote table follows the same pattern: a stable key column plus a
//! `data` blob. Reservations additionally carry denormalized query columns
//! derived from the aggregate at write time.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Profile, Reservation};

/// Remote reservations table
pub const RESERVATIONS_TABLE: &str = "reservations";
/// Remote key/value config table
pub const CONFIG_TABLE: &str = "config";

/// Conflict (upsert) column of the reservations table
pub const RESERVATION_CONFLICT_KEY: &str = "booking_ref";
/// Conflict column of the config table
pub const CONFIG_CONFLICT_KEY: &str = "key";
/// Conflict column of every profile table
pub const PROFILE_CONFLICT_KEY: &str = "id";

/// One row per reservation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationRow {
    pub booking_ref: String,
    pub checkin: Option<NaiveDate>,
    pub checkout: Option<NaiveDate>,
    pub status: String,
    pub guest_name: String,
    /// Full serialized aggregate
    pub data: serde_json::Value,
}

impl ReservationRow {
    pub fn from_reservation(reservation: &Reservation) -> Result<Self, serde_json::Error> {
        Ok(Self {
            booking_ref: reservation.booking_ref.clone(),
            checkin: reservation.checkin(),
            checkout: reservation.checkout(),
            status: reservation.derived_status().as_str().to_string(),
            guest_name: reservation.guest_name().to_string(),
            data: serde_json::to_value(reservation)?,
        })
    }
}

/// Key/value config row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigRow {
    pub key: String,
    pub data: serde_json::Value,
}

/// Profile row (companies / guests / bookers)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileRow {
    pub id: String,
    pub data: serde_json::Value,
}

impl From<Profile> for ProfileRow {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            data: p.data,
        }
    }
}

/// Connectivity / sync status
///
/// ```text
/// idle ──► syncing ──► idle      (success, records last_synced_at)
///             └──────► error     (remote call failed)
/// any  ──────────────► offline   (connectivity probe failed)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Error,
    Offline,
}

/// Snapshot published to status subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SyncState {
    pub status: SyncStatus,
    /// Unix millis of the last successful sync
    pub last_synced_at: Option<i64>,
    pub last_error: Option<String>,
}
