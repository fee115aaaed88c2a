//! Flattened read-only projection: one row per (reservation × room stay)

use chrono::NaiveDate;
use serde::Serialize;
use shared::models::{Housekeeping, Reservation, StayStatus};

/// A room stay together with the shared fields of its reservation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatStay {
    pub reservation_id: u64,
    pub booking_ref: String,
    pub booker_name: String,
    pub guest_name: String,
    pub reservation_status: StayStatus,
    pub room_index: usize,
    pub room_number: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub status: StayStatus,
    pub housekeeping: Housekeeping,
    pub room_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_portal_code: Option<String>,
}

impl FlatStay {
    /// Whether the room is occupied on the night of `date`
    pub fn occupies(&self, date: NaiveDate) -> bool {
        self.status.occupies_room() && self.checkin <= date && date < self.checkout
    }
}

/// Flatten reservations in store order, rooms in reservation order
pub fn flatten<'a>(reservations: impl IntoIterator<Item = &'a Reservation>) -> Vec<FlatStay> {
    reservations
        .into_iter()
        .flat_map(|r| {
            r.rooms.iter().enumerate().map(move |(room_index, stay)| FlatStay {
                reservation_id: r.id,
                booking_ref: r.booking_ref.clone(),
                booker_name: r.booker.name.clone(),
                guest_name: stay
                    .guest_name
                    .clone()
                    .unwrap_or_else(|| r.booker.name.clone()),
                reservation_status: r.status,
                room_index,
                room_number: stay.room_number.clone(),
                checkin: stay.checkin,
                checkout: stay.checkout,
                status: stay.status,
                housekeeping: stay.housekeeping,
                room_locked: stay.room_locked,
                guest_portal_code: stay.guest_portal_code.clone(),
            })
        })
        .collect()
}
