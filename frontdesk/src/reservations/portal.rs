//! Guest portal code allocation
//!
//! Codes look like `JD-4821`: the guest's initials, a dash, four random
//! digits. A code is unique across every room stay in the store and only
//! valid from 48h before check-in until 24h after check-out.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use shared::util::day_start_utc;
use std::collections::HashSet;
use thiserror::Error;

/// Digit-suffix attempts per letter pair before giving up on it
pub const MAX_ATTEMPTS: usize = 100;

/// Access opens this long before the check-in date
const OPENS_BEFORE_CHECKIN_HOURS: i64 = 48;
/// Access closes this long after the check-out date
const CLOSES_AFTER_CHECKOUT_HOURS: i64 = 24;

const PLACEHOLDER: char = 'X';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortalError {
    #[error("No free portal code left for letter pair {letters}")]
    AllocationExhausted { letters: String },
}

/// Allocated code and its validity window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalGrant {
    pub code: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl PortalGrant {
    /// Inclusive on both ends
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at <= self.valid_until
    }
}

/// Validity window for a stay `[checkin, checkout)`, dates taken at midnight UTC
pub fn validity_window(checkin: NaiveDate, checkout: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        day_start_utc(checkin) - Duration::hours(OPENS_BEFORE_CHECKIN_HOURS),
        day_start_utc(checkout) + Duration::hours(CLOSES_AFTER_CHECKOUT_HOURS),
    )
}

/// Two uppercase letters from a guest name, `X` where unknown
///
/// "Jane van Doe" → `JD`, "Cher" → `CX`, "" → `XX`.
pub fn initials(name: &str) -> String {
    let first_letter = |word: &str| {
        word.chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .filter(char::is_ascii_uppercase)
            .unwrap_or(PLACEHOLDER)
    };
    let words: Vec<&str> = name.split_whitespace().collect();
    match words.as_slice() {
        [] => format!("{PLACEHOLDER}{PLACEHOLDER}"),
        [only] => format!("{}{PLACEHOLDER}", first_letter(only)),
        [first, .., last] => format!("{}{}", first_letter(first), first_letter(last)),
    }
}

/// Letter pairs tried in order: the initials, then progressively anonymised
fn letter_pairs(primary: &str) -> Vec<String> {
    let mut chars = primary.chars();
    let a = chars.next().unwrap_or(PLACEHOLDER);
    let b = chars.next().unwrap_or(PLACEHOLDER);

    let mut pairs: Vec<String> = Vec::with_capacity(4);
    for pair in [
        format!("{a}{b}"),
        format!("{a}{PLACEHOLDER}"),
        format!("{PLACEHOLDER}{b}"),
        format!("{PLACEHOLDER}{PLACEHOLDER}"),
    ] {
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
    pairs
}

/// Allocate a code for one letter pair, regenerating only the digits on collision
pub fn allocate_for_letters<R: Rng>(
    letters: &str,
    taken: &HashSet<String>,
    rng: &mut R,
) -> Result<String, PortalError> {
    for _ in 0..MAX_ATTEMPTS {
        let digits: u16 = rng.gen_range(0..10_000);
        let code = format!("{letters}-{digits:04}");
        if !taken.contains(&code) {
            return Ok(code);
        }
    }
    Err(PortalError::AllocationExhausted {
        letters: letters.to_string(),
    })
}

/// Allocate a unique code for a guest's stay
///
/// Falls back through alternate letter pairs before reporting exhaustion.
/// The caller attaches the grant to the room stay through the store.
pub fn allocate<R: Rng>(
    guest_name: &str,
    checkin: NaiveDate,
    checkout: NaiveDate,
    taken: &HashSet<String>,
    rng: &mut R,
) -> Result<PortalGrant, PortalError> {
    let (valid_from, valid_until) = validity_window(checkin, checkout);
    let pairs = letter_pairs(&initials(guest_name));

    let mut last_err = None;
    for letters in &pairs {
        match allocate_for_letters(letters, taken, rng) {
            Ok(code) => {
                return Ok(PortalGrant {
                    code,
                    valid_from,
                    valid_until,
                });
            }
            Err(e) => {
                tracing::warn!(letters = %letters, "Portal code space exhausted, trying next letter pair");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(PortalError::AllocationExhausted {
        letters: guest_name.to_string(),
    }))
}
