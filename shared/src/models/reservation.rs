//! Reservation aggregate
//!
//! A reservation is owned by one booker and spans one or more [`RoomStay`]s.
//! Its check-in / check-out dates are never stored: they are derived from the
//! room stays on every read so they cannot drift.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use super::room_stay::RoomStay;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status shared by reservations and individual room stays
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StayStatus {
    #[default]
    Confirmed,
    /// Tentative hold, still occupies the room
    Option,
    /// Maintenance / out-of-order block
    Blocked,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
}

impl StayStatus {
    /// Statuses that never take part in the room non-overlap check
    pub const RELEASED: [StayStatus; 2] = [StayStatus::Cancelled, StayStatus::NoShow];

    /// Whether a stay in this status still occupies its room
    pub fn occupies_room(&self) -> bool {
        !Self::RELEASED.contains(self)
    }

    /// Terminal statuses are kept for history but never change again in normal flow
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CheckedOut | Self::Cancelled | Self::NoShow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Option => "option",
            Self::Blocked => "blocked",
            Self::CheckedIn => "checked-in",
            Self::CheckedOut => "checked-out",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no-show",
        }
    }
}

impl std::fmt::Display for StayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of reservation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReservationKind {
    /// Guest booking; multi-room bookings stay one aggregate
    #[default]
    Guest,
    /// Room block (maintenance); split into one reservation per room on create
    Block,
}

// ============================================================================
// Parties
// ============================================================================

/// Paying party of a reservation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Booker {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Company name when the booker books on behalf of a company
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Company legal / billing fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BillingRecipient {
    pub legal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ============================================================================
// Append-mostly entries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: u64,
    pub amount: f64,
    pub method: String,
    /// Unix millis
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Extra {
    pub id: u64,
    pub description: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub date: NaiveDate,
    /// Room the extra was consumed in, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_number: Option<String>,
}

impl Extra {
    pub fn total(&self) -> Decimal {
        Decimal::from_f64(self.unit_price).unwrap_or_default() * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub number: String,
    pub amount: f64,
    pub issued_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub timestamp: i64,
    pub actor: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: u64,
    pub due_at: i64,
    pub message: String,
    /// The only mutable field once the reminder exists
    #[serde(default)]
    pub fired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailLogEntry {
    pub sent_at: i64,
    pub template: String,
    pub recipient: String,
}

// ============================================================================
// Aggregate
// ============================================================================

/// Reservation aggregate (one booker, ≥1 room stays)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: u64,
    pub booking_ref: String,
    #[serde(default)]
    pub kind: ReservationKind,
    /// Cached, recomputed from room statuses on every mutation
    #[serde(default)]
    pub status: StayStatus,
    pub booker: Booker,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_recipient: Option<BillingRecipient>,
    pub rooms: Vec<RoomStay>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub extras: Vec<Extra>,
    #[serde(default)]
    pub invoices: Vec<Invoice>,
    #[serde(default)]
    pub activity_log: Vec<ActivityEntry>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    #[serde(default)]
    pub email_log: Vec<EmailLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Unix millis
    #[serde(default)]
    pub created_at: i64,
}

impl Reservation {
    /// Earliest check-in across all room stays
    pub fn checkin(&self) -> Option<NaiveDate> {
        self.rooms.iter().map(|r| r.checkin).min()
    }

    /// Latest check-out across all room stays
    pub fn checkout(&self) -> Option<NaiveDate> {
        self.rooms.iter().map(|r| r.checkout).max()
    }

    /// Status derived from the room stays
    ///
    /// - every room cancelled → cancelled
    /// - every room cancelled or no-show → no-show
    /// - any room in house → checked-in
    /// - every occupying room checked out → checked-out
    /// - otherwise the first occupying room's status (confirmed / option / blocked)
    pub fn derived_status(&self) -> StayStatus {
        if self.rooms.is_empty() {
            return self.status;
        }
        if self.rooms.iter().all(|r| r.status == StayStatus::Cancelled) {
            return StayStatus::Cancelled;
        }
        let active: Vec<&RoomStay> = self
            .rooms
            .iter()
            .filter(|r| r.status.occupies_room())
            .collect();
        if active.is_empty() {
            return StayStatus::NoShow;
        }
        if active.iter().any(|r| r.status == StayStatus::CheckedIn) {
            return StayStatus::CheckedIn;
        }
        if active.iter().all(|r| r.status == StayStatus::CheckedOut) {
            return StayStatus::CheckedOut;
        }
        active
            .iter()
            .find(|r| r.status != StayStatus::CheckedOut)
            .map(|r| r.status)
            .unwrap_or(StayStatus::Confirmed)
    }

    /// Recompute the cached status field
    pub fn refresh_status(&mut self) {
        self.status = self.derived_status();
    }

    /// Display name used by the denormalized `guest_name` column
    pub fn guest_name(&self) -> &str {
        self.rooms
            .iter()
            .find_map(|r| r.guest_name.as_deref())
            .unwrap_or(&self.booker.name)
    }

    /// Next id for an entry in one of the append-mostly lists
    pub fn next_entry_id(&self) -> u64 {
        let payments = self.payments.iter().map(|p| p.id);
        let extras = self.extras.iter().map(|e| e.id);
        let reminders = self.reminders.iter().map(|r| r.id);
        payments.chain(extras).chain(reminders).max().unwrap_or(0) + 1
    }
}
