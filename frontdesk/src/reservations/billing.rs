//! Billing totals using rust_decimal for precision
//!
//! Sums are computed as `Decimal` and converted to `f64` for the caller.
//! No tax or pricing rules live here: room charges come straight from each
//! stay's fixed price or night prices.

use rust_decimal::prelude::*;
use serde::Serialize;
use shared::models::Reservation;

/// Rounding for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSummary {
    pub room_charges: f64,
    pub extras: f64,
    pub total: f64,
    pub paid: f64,
    pub outstanding: f64,
}

fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Totals for one reservation; cancelled and no-show rooms are not charged
pub fn summarize(reservation: &Reservation) -> BillingSummary {
    let room_charges: Decimal = reservation
        .rooms
        .iter()
        .filter(|r| r.status.occupies_room())
        .map(|r| r.charges())
        .sum();
    let extras: Decimal = reservation.extras.iter().map(|e| e.total()).sum();
    let paid: Decimal = reservation
        .payments
        .iter()
        .filter_map(|p| Decimal::from_f64(p.amount))
        .sum();
    let total = room_charges + extras;

    BillingSummary {
        room_charges: to_f64(room_charges),
        extras: to_f64(extras),
        total: to_f64(total),
        paid: to_f64(paid),
        outstanding: to_f64(total - paid),
    }
}
