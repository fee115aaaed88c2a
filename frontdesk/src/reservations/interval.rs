//! Interval model: when do two room stays conflict
//!
//! All intervals are half-open `[checkin, checkout)`: a guest leaving on the
//! 12th and another arriving on the 12th share no night.

use chrono::NaiveDate;
use shared::models::{RoomStay, StayStatus};

/// Half-open date interval with `checkout > checkin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StayInterval {
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
}

impl StayInterval {
    /// Returns `None` for empty or inverted intervals
    pub fn new(checkin: NaiveDate, checkout: NaiveDate) -> Option<Self> {
        (checkout > checkin).then_some(Self { checkin, checkout })
    }

    pub fn of(stay: &RoomStay) -> Option<Self> {
        Self::new(stay.checkin, stay.checkout)
    }

    pub fn overlaps(&self, other: &StayInterval) -> bool {
        self.checkin < other.checkout && other.checkin < self.checkout
    }

    /// Night of `date` is inside the interval
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.checkin <= date && date < self.checkout
    }
}

/// Whether two stays' date ranges intersect (room number is not compared)
pub fn overlaps(a: &RoomStay, b: &RoomStay) -> bool {
    a.checkin < b.checkout && b.checkin < a.checkout
}

/// One entry of the per-room index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSlot {
    pub reservation_id: u64,
    pub booking_ref: String,
    pub room_index: usize,
    pub interval: StayInterval,
    pub status: StayStatus,
}

/// First slot of a room that blocks `interval`
///
/// `slots` are the stays of a single room; the scan is linear in their number.
pub fn find_conflict<'a>(
    slots: &'a [RoomSlot],
    interval: &StayInterval,
    exclude_statuses: &[StayStatus],
    ignore_reservation: Option<u64>,
) -> Option<&'a RoomSlot> {
    slots.iter().find(|slot| {
        Some(slot.reservation_id) != ignore_reservation
            && !exclude_statuses.contains(&slot.status)
            && slot.interval.overlaps(interval)
    })
}

/// Whether a room with the given stays is free over `[from, to)`
pub fn is_room_available(
    slots: &[RoomSlot],
    from: NaiveDate,
    to: NaiveDate,
    exclude_statuses: &[StayStatus],
) -> bool {
    match StayInterval::new(from, to) {
        Some(interval) => find_conflict(slots, &interval, exclude_statuses, None).is_none(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn slot(id: u64, from: &str, to: &str, status: StayStatus) -> RoomSlot {
        RoomSlot {
            reservation_id: id,
            booking_ref: format!("RES-{id:05}"),
            room_index: 0,
            interval: StayInterval::new(d(from), d(to)).unwrap(),
            status,
        }
    }

    #[test]
    fn test_back_to_back_stays_do_not_overlap() {
        let a = RoomStay::new("101", d("2024-01-10"), d("2024-01-12"));
        let b = RoomStay::new("101", d("2024-01-12"), d("2024-01-14"));
        assert!(!overlaps(&a, &b));
        assert!(!overlaps(&b, &a));
    }

    #[test]
    fn test_shared_night_overlaps() {
        let a = RoomStay::new("101", d("2024-01-10"), d("2024-01-13"));
        let b = RoomStay::new("101", d("2024-01-12"), d("2024-01-14"));
        assert!(overlaps(&a, &b));
        assert!(overlaps(&b, &a));
    }

    #[test]
    fn test_containment_overlaps() {
        let outer = StayInterval::new(d("2024-01-01"), d("2024-01-31")).unwrap();
        let inner = StayInterval::new(d("2024-01-10"), d("2024-01-11")).unwrap();
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn test_empty_interval_rejected() {
        assert!(StayInterval::new(d("2024-01-10"), d("2024-01-10")).is_none());
        assert!(StayInterval::new(d("2024-01-11"), d("2024-01-10")).is_none());
    }

    #[test]
    fn test_availability_ignores_released_stays() {
        let slots = vec![
            slot(1, "2024-03-01", "2024-03-05", StayStatus::Cancelled),
            slot(2, "2024-03-01", "2024-03-05", StayStatus::NoShow),
        ];
        assert!(is_room_available(
            &slots,
            d("2024-03-02"),
            d("2024-03-03"),
            &StayStatus::RELEASED
        ));
        assert!(!is_room_available(&slots, d("2024-03-02"), d("2024-03-03"), &[]));
    }

    #[test]
    fn test_blocked_room_is_unavailable() {
        let slots = vec![slot(3, "2024-03-01", "2024-03-05", StayStatus::Blocked)];
        assert!(!is_room_available(
            &slots,
            d("2024-03-04"),
            d("2024-03-06"),
            &StayStatus::RELEASED
        ));
        assert!(is_room_available(
            &slots,
            d("2024-03-05"),
            d("2024-03-06"),
            &StayStatus::RELEASED
        ));
    }

    #[test]
    fn test_conflict_skips_own_reservation() {
        let slots = vec![slot(4, "2024-03-01", "2024-03-05", StayStatus::Confirmed)];
        let interval = StayInterval::new(d("2024-03-02"), d("2024-03-03")).unwrap();
        assert!(find_conflict(&slots, &interval, &StayStatus::RELEASED, Some(4)).is_none());
        let hit = find_conflict(&slots, &interval, &StayStatus::RELEASED, None).unwrap();
        assert_eq!(hit.booking_ref, "RES-00004");
    }
}
