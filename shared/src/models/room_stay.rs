//! Room stay: one room's date-bounded occupancy inside a reservation

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use super::reservation::StayStatus;

/// Housekeeping state of the room during a stay
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Housekeeping {
    #[default]
    Clean,
    Dirty,
    InProgress,
    Inspected,
}

/// One room's stay within a reservation
///
/// `[checkin, checkout)` is half-open: the checkout date itself is free.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStay {
    pub room_number: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    #[serde(default)]
    pub status: StayStatus,
    /// Occupant name when it differs from the booker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_portal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_code_valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal_code_valid_until: Option<DateTime<Utc>>,
    /// Whole-stay price; takes precedence over `night_prices`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_price: Option<f64>,
    #[serde(default)]
    pub night_prices: Vec<f64>,
    #[serde(default)]
    pub housekeeping: Housekeeping,
    #[serde(default)]
    pub room_locked: bool,
}

impl RoomStay {
    pub fn new(room_number: impl Into<String>, checkin: NaiveDate, checkout: NaiveDate) -> Self {
        Self {
            room_number: room_number.into(),
            checkin,
            checkout,
            status: StayStatus::Confirmed,
            guest_name: None,
            guest_portal_code: None,
            portal_code_valid_from: None,
            portal_code_valid_until: None,
            fixed_price: None,
            night_prices: Vec::new(),
            housekeeping: Housekeeping::Clean,
            room_locked: false,
        }
    }

    pub fn with_status(mut self, status: StayStatus) -> Self {
        self.status = status;
        self
    }

    pub fn nights(&self) -> i64 {
        (self.checkout - self.checkin).num_days()
    }

    /// Room charge for the stay (fixed price, else the sum of night prices)
    pub fn charges(&self) -> Decimal {
        match self.fixed_price {
            Some(price) => Decimal::from_f64(price).unwrap_or_default(),
            None => self
                .night_prices
                .iter()
                .filter_map(|p| Decimal::from_f64(*p))
                .sum(),
        }
    }

    /// Whether the portal code window covers `at` (inclusive bounds)
    pub fn portal_code_valid_at(&self, at: DateTime<Utc>) -> bool {
        match (self.portal_code_valid_from, self.portal_code_valid_until) {
            (Some(from), Some(until)) => from <= at && at <= until,
            _ => false,
        }
    }
}
