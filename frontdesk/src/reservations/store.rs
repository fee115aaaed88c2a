//! ReservationStore: single authoritative in-memory reservation collection
//!
//! Every create / update passes through here so the room non-overlap
//! invariant is checked exactly once per mutation, in one place.
//!
//! # Mutation Flow
//!
//! ```text
//! create(draft) / update(id, mutator)
//!     ├─ 1. Validate shape (non-empty rooms, checkout > checkin)
//!     ├─ 2. Take the write lock
//!     ├─ 3. Check every occupying stay against the per-room index
//!     ├─ 4. Assign id / booking ref (create only)
//!     ├─ 5. Commit to memory, rebuild the per-room index
//!     └─ 6. Persist the snapshot to the local cache (failures are logged)
//! ```
//!
//! A rejected mutation leaves the store untouched.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use shared::models::{
    BillingRecipient, Booker, Reservation, ReservationKind, Room, RoomStay, StayStatus,
};
use std::collections::{HashMap, HashSet};

use super::billing::{self, BillingSummary};
use super::error::{ConflictError, StoreError, StoreResult};
use super::interval::{self, RoomSlot, StayInterval};
use super::portal;
use super::rooms::RoomRegistry;
use super::view::{self, FlatStay};
use crate::cache::{CACHE_SCHEMA_VERSION, CacheLoad, LocalCache};

/// Default booking reference prefix (`RES-00042`)
pub const DEFAULT_REF_PREFIX: &str = "RES-";

/// Input for [`ReservationStore::create`]
#[derive(Debug, Clone, Default)]
pub struct ReservationDraft {
    pub kind: ReservationKind,
    pub booker: Booker,
    pub billing_recipient: Option<BillingRecipient>,
    pub rooms: Vec<RoomStay>,
    pub notes: Option<String>,
}

/// Result of a portal code lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalAccess {
    pub reservation_id: u64,
    pub booking_ref: String,
    pub room_index: usize,
    pub room_number: String,
}

#[derive(Default)]
struct Inventory {
    reservations: Vec<Reservation>,
    /// room number → stays of that room
    by_room: HashMap<String, Vec<RoomSlot>>,
    last_id: u64,
    last_ref: u64,
}

impl Inventory {
    fn reindex(&mut self) {
        self.by_room.clear();
        for reservation in &self.reservations {
            index_stays(&mut self.by_room, reservation);
        }
    }

    /// Rebuild from cached reservations, dropping entries that break the store's rules
    ///
    /// Duplicate ids or booking references, malformed stays, and stays that
    /// overlap an earlier reservation are logged and skipped. The first
    /// occurrence wins.
    fn hydrate(reservations: Vec<Reservation>) -> Self {
        let mut inv = Self::default();
        let mut ids = HashSet::new();
        let mut refs = HashSet::new();

        for mut reservation in reservations {
            let problem = if ids.contains(&reservation.id) {
                Some("duplicate id".to_string())
            } else if refs.contains(&reservation.booking_ref) {
                Some("duplicate booking reference".to_string())
            } else if let Err(e) = validate_rooms(&reservation.rooms) {
                Some(e.to_string())
            } else if let Err(conflict) = inv.check_rooms(&reservation.rooms, None) {
                Some(conflict.to_string())
            } else {
                None
            };
            if let Some(problem) = problem {
                tracing::error!(
                    id = reservation.id,
                    booking_ref = %reservation.booking_ref,
                    "Dropping cached reservation: {problem}"
                );
                continue;
            }

            refresh_portal_windows(&mut reservation);
            ids.insert(reservation.id);
            refs.insert(reservation.booking_ref.clone());
            index_stays(&mut inv.by_room, &reservation);
            inv.reservations.push(reservation);
        }
        inv
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.reservations.iter().position(|r| r.id == id)
    }

    /// Check the occupying stays of `rooms` against everything else in the store
    fn check_rooms(&self, rooms: &[RoomStay], ignore: Option<u64>) -> Result<(), ConflictError> {
        for stay in rooms.iter().filter(|s| s.status.occupies_room()) {
            let Some(interval) = StayInterval::of(stay) else {
                continue;
            };
            let slots = self
                .by_room
                .get(&stay.room_number)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if let Some(hit) =
                interval::find_conflict(slots, &interval, &StayStatus::RELEASED, ignore)
            {
                return Err(ConflictError {
                    room: stay.room_number.clone(),
                    conflicting_booking_ref: hit.booking_ref.clone(),
                });
            }
        }
        Ok(())
    }

    fn portal_codes_except(&self, id: Option<u64>) -> HashSet<String> {
        self.reservations
            .iter()
            .filter(|r| Some(r.id) != id)
            .flat_map(|r| r.rooms.iter())
            .filter_map(|s| s.guest_portal_code.clone())
            .collect()
    }
}

fn index_stays(by_room: &mut HashMap<String, Vec<RoomSlot>>, reservation: &Reservation) {
    for (room_index, stay) in reservation.rooms.iter().enumerate() {
        let Some(interval) = StayInterval::of(stay) else {
            continue;
        };
        by_room
            .entry(stay.room_number.clone())
            .or_default()
            .push(RoomSlot {
                reservation_id: reservation.id,
                booking_ref: reservation.booking_ref.clone(),
                room_index,
                interval,
                status: stay.status,
            });
    }
}

/// Portal windows follow the stay dates
fn refresh_portal_windows(reservation: &mut Reservation) {
    for stay in &mut reservation.rooms {
        if stay.guest_portal_code.is_none() {
            continue;
        }
        let (valid_from, valid_until) = portal::validity_window(stay.checkin, stay.checkout);
        stay.portal_code_valid_from = Some(valid_from);
        stay.portal_code_valid_until = Some(valid_until);
    }
}

/// Shape checks that do not need the rest of the store
fn validate_rooms(rooms: &[RoomStay]) -> StoreResult<()> {
    if rooms.is_empty() {
        return Err(StoreError::validation("a reservation needs at least one room"));
    }
    for stay in rooms {
        if stay.room_number.trim().is_empty() {
            return Err(StoreError::validation("room number is required"));
        }
        if StayInterval::of(stay).is_none() {
            return Err(StoreError::validation(format!(
                "room {}: checkout {} must be after checkin {}",
                stay.room_number, stay.checkout, stay.checkin
            )));
        }
    }
    // Two stays of the same aggregate may not double-book a room either
    let active: Vec<&RoomStay> = rooms.iter().filter(|s| s.status.occupies_room()).collect();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            if a.room_number == b.room_number && interval::overlaps(a, b) {
                return Err(StoreError::validation(format!(
                    "room {} is booked twice over overlapping dates",
                    a.room_number
                )));
            }
        }
    }
    Ok(())
}

/// Room placement relevant to the non-overlap invariant
fn placement(reservation: &Reservation) -> Vec<(&str, NaiveDate, NaiveDate, bool)> {
    reservation
        .rooms
        .iter()
        .map(|s| {
            (
                s.room_number.as_str(),
                s.checkin,
                s.checkout,
                s.status.occupies_room(),
            )
        })
        .collect()
}

/// Reservation store
pub struct ReservationStore {
    inner: RwLock<Inventory>,
    cache: LocalCache,
    ref_prefix: String,
    schema_version: u32,
}

impl std::fmt::Debug for ReservationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationStore")
            .field("reservations", &self.inner.read().reservations.len())
            .field("ref_prefix", &self.ref_prefix)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

impl ReservationStore {
    /// Hydrate from the local cache at the current schema version
    pub fn open(cache: LocalCache, ref_prefix: impl Into<String>) -> Self {
        Self::open_with_version(cache, ref_prefix, CACHE_SCHEMA_VERSION)
    }

    /// Hydrate from the local cache, regenerating it on a version mismatch
    pub fn open_with_version(
        cache: LocalCache,
        ref_prefix: impl Into<String>,
        schema_version: u32,
    ) -> Self {
        let ref_prefix = ref_prefix.into();

        let reservations = match cache.load_reservations(schema_version) {
            Ok(CacheLoad::Loaded {
                reservations,
                dropped,
            }) => {
                tracing::info!(
                    count = reservations.len(),
                    dropped,
                    "Reservations loaded from local cache"
                );
                reservations
            }
            Ok(CacheLoad::Empty) => {
                tracing::info!("Local cache empty, starting with no reservations");
                Vec::new()
            }
            Ok(CacheLoad::VersionMismatch { stored, expected }) => {
                tracing::info!(stored, expected, "Cache schema changed, regenerating");
                if let Err(e) = cache
                    .clear_reservations()
                    .and_then(|_| cache.save_reservations(&[], expected))
                {
                    tracing::error!("Failed to regenerate local cache: {e}");
                }
                Vec::new()
            }
            Err(e) => {
                tracing::error!("Failed to load local cache, starting empty: {e}");
                Vec::new()
            }
        };

        let stored_counter = cache.booking_counter().unwrap_or_else(|e| {
            tracing::error!("Failed to read booking counter: {e}");
            0
        });
        let highest_ref = reservations
            .iter()
            .filter_map(|r| r.booking_ref.strip_prefix(ref_prefix.as_str()))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        // Dropped entries still count, so their id and reference are never reused
        let highest_id = reservations.iter().map(|r| r.id).max().unwrap_or(0);

        let mut inventory = Inventory::hydrate(reservations);
        inventory.last_id = highest_id;
        inventory.last_ref = stored_counter.max(highest_ref);

        Self {
            inner: RwLock::new(inventory),
            cache,
            ref_prefix,
            schema_version,
        }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    fn format_ref(&self, n: u64) -> String {
        format!("{}{:05}", self.ref_prefix, n)
    }

    /// Write the snapshot and counter; the in-memory store stays authoritative on failure
    fn persist(&self, inventory: &Inventory) {
        if let Err(e) = self.cache.store_booking_counter(inventory.last_ref) {
            tracing::error!("Failed to persist booking counter: {e}");
        }
        if let Err(e) = self
            .cache
            .save_reservations(&inventory.reservations, self.schema_version)
        {
            tracing::error!("Failed to persist reservations to local cache: {e}");
        }
    }

    // ========== Mutations ==========

    /// Create a reservation (or one per room for block drafts)
    ///
    /// Rejects the whole draft with [`ConflictError`] if any stay would
    /// overlap an occupying stay of the same room.
    pub fn create(&self, draft: ReservationDraft) -> StoreResult<Vec<Reservation>> {
        validate_rooms(&draft.rooms)?;

        let mut rooms = draft.rooms;
        if draft.kind == ReservationKind::Block {
            for stay in &mut rooms {
                if stay.status.occupies_room() {
                    stay.status = StayStatus::Blocked;
                }
            }
        }

        let mut inv = self.inner.write();
        if let Err(conflict) = inv.check_rooms(&rooms, None) {
            tracing::warn!(
                room = %conflict.room,
                conflicting = %conflict.conflicting_booking_ref,
                "Rejected overlapping reservation"
            );
            return Err(conflict.into());
        }

        let groups: Vec<Vec<RoomStay>> = match draft.kind {
            ReservationKind::Block => rooms.into_iter().map(|s| vec![s]).collect(),
            ReservationKind::Guest => vec![rooms],
        };

        let created_at = shared::util::now_millis();
        let mut created = Vec::with_capacity(groups.len());
        for rooms in groups {
            inv.last_id += 1;
            inv.last_ref += 1;
            let mut reservation = Reservation {
                id: inv.last_id,
                booking_ref: self.format_ref(inv.last_ref),
                kind: draft.kind,
                status: StayStatus::Confirmed,
                booker: draft.booker.clone(),
                billing_recipient: draft.billing_recipient.clone(),
                rooms,
                payments: Vec::new(),
                extras: Vec::new(),
                invoices: Vec::new(),
                activity_log: Vec::new(),
                reminders: Vec::new(),
                email_log: Vec::new(),
                notes: draft.notes.clone(),
                created_at,
            };
            reservation.refresh_status();
            tracing::info!(
                booking_ref = %reservation.booking_ref,
                rooms = reservation.rooms.len(),
                "Reservation created"
            );
            inv.reservations.push(reservation.clone());
            created.push(reservation);
        }

        inv.reindex();
        self.persist(&inv);
        Ok(created)
    }

    /// Apply `mutator` to a copy of the reservation and commit it if valid
    ///
    /// The overlap check only runs when rooms, dates, or the occupying
    /// status of a stay changed. `id` and `booking_ref` are immutable.
    pub fn update<F>(&self, id: u64, mutator: F) -> StoreResult<Reservation>
    where
        F: FnOnce(&mut Reservation) -> StoreResult<()>,
    {
        let mut inv = self.inner.write();
        let pos = inv.position(id).ok_or(StoreError::NotFound(id))?;

        let original = &inv.reservations[pos];
        let mut updated = original.clone();
        mutator(&mut updated)?;

        if updated.id != original.id || updated.booking_ref != original.booking_ref {
            return Err(StoreError::validation("id and booking reference are immutable"));
        }
        validate_rooms(&updated.rooms)?;

        if placement(original) != placement(&updated) {
            inv.check_rooms(&updated.rooms, Some(id))?;
        }

        let before: HashSet<&str> = original
            .rooms
            .iter()
            .filter_map(|s| s.guest_portal_code.as_deref())
            .collect();
        let new_codes: Vec<&str> = updated
            .rooms
            .iter()
            .filter_map(|s| s.guest_portal_code.as_deref())
            .filter(|c| !before.contains(c))
            .collect();
        if !new_codes.is_empty() {
            let mut taken = inv.portal_codes_except(Some(id));
            taken.extend(before.iter().map(|c| c.to_string()));
            for code in new_codes {
                if !taken.insert(code.to_string()) {
                    return Err(StoreError::DuplicatePortalCode(code.to_string()));
                }
            }
        }

        refresh_portal_windows(&mut updated);
        updated.refresh_status();
        inv.reservations[pos] = updated.clone();
        inv.reindex();
        self.persist(&inv);
        tracing::debug!(booking_ref = %updated.booking_ref, "Reservation updated");
        Ok(updated)
    }

    // ========== Queries ==========

    pub fn len(&self) -> usize {
        self.inner.read().reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().reservations.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<Reservation> {
        self.inner.read().reservations.iter().find(|r| r.id == id).cloned()
    }

    pub fn get_by_ref(&self, booking_ref: &str) -> Option<Reservation> {
        self.inner
            .read()
            .reservations
            .iter()
            .find(|r| r.booking_ref == booking_ref)
            .cloned()
    }

    /// Snapshot of every reservation, in creation order
    pub fn all(&self) -> Vec<Reservation> {
        self.inner.read().reservations.clone()
    }

    /// One row per (reservation × room stay)
    pub fn flatten(&self) -> Vec<FlatStay> {
        view::flatten(&self.inner.read().reservations)
    }

    /// Whether `room` is free over `[from, to)`, ignoring stays in `exclude_statuses`
    pub fn is_room_available(
        &self,
        room: &str,
        from: NaiveDate,
        to: NaiveDate,
        exclude_statuses: &[StayStatus],
    ) -> bool {
        let inv = self.inner.read();
        let slots = inv.by_room.get(room).map(Vec::as_slice).unwrap_or_default();
        interval::is_room_available(slots, from, to, exclude_statuses)
    }

    /// Rooms from the registry that are free over `[from, to)`
    pub fn available_rooms(
        &self,
        registry: &dyn RoomRegistry,
        from: NaiveDate,
        to: NaiveDate,
        room_type: Option<&str>,
    ) -> Vec<Room> {
        registry
            .all_rooms()
            .into_iter()
            .filter(|room| room_type.is_none_or(|t| room.room_type == t))
            .filter(|room| self.is_room_available(&room.number, from, to, &StayStatus::RELEASED))
            .collect()
    }

    /// Stays occupying a room on the night of `date`
    pub fn stays_on(&self, date: NaiveDate) -> Vec<FlatStay> {
        self.flatten()
            .into_iter()
            .filter(|s| s.occupies(date))
            .collect()
    }

    pub fn arrivals_on(&self, date: NaiveDate) -> Vec<FlatStay> {
        self.flatten()
            .into_iter()
            .filter(|s| s.status.occupies_room() && s.checkin == date)
            .collect()
    }

    pub fn departures_on(&self, date: NaiveDate) -> Vec<FlatStay> {
        self.flatten()
            .into_iter()
            .filter(|s| s.status.occupies_room() && s.checkout == date)
            .collect()
    }

    pub fn billing_summary(&self, id: u64) -> Option<BillingSummary> {
        self.inner
            .read()
            .reservations
            .iter()
            .find(|r| r.id == id)
            .map(billing::summarize)
    }

    /// Every portal code currently held by a room stay
    pub fn portal_codes(&self) -> HashSet<String> {
        self.inner.read().portal_codes_except(None)
    }

    /// Resolve a portal code
    ///
    /// Codes outside their validity window, or held by a cancelled or
    /// no-show stay, do not resolve.
    pub fn find_by_portal_code(&self, code: &str, at: DateTime<Utc>) -> Option<PortalAccess> {
        let inv = self.inner.read();
        inv.reservations.iter().find_map(|r| {
            r.rooms.iter().enumerate().find_map(|(room_index, stay)| {
                (stay.guest_portal_code.as_deref() == Some(code)
                    && stay.status.occupies_room()
                    && stay.portal_code_valid_at(at))
                    .then(|| PortalAccess {
                        reservation_id: r.id,
                        booking_ref: r.booking_ref.clone(),
                        room_index,
                        room_number: stay.room_number.clone(),
                    })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservations::rooms::StaticRoomRegistry;
    use shared::models::Payment;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn create_test_store() -> ReservationStore {
        ReservationStore::open(LocalCache::open_in_memory().unwrap(), DEFAULT_REF_PREFIX)
    }

    fn guest_draft(rooms: Vec<RoomStay>) -> ReservationDraft {
        ReservationDraft {
            kind: ReservationKind::Guest,
            booker: Booker {
                name: "Test Booker".to_string(),
                ..Default::default()
            },
            rooms,
            ..Default::default()
        }
    }

    fn stay(room: &str, from: &str, to: &str) -> RoomStay {
        RoomStay::new(room, d(from), d(to))
    }

    /// Every pair of occupying stays of the same room is disjoint
    fn assert_no_overlap(store: &ReservationStore) {
        let rows: Vec<FlatStay> = store
            .flatten()
            .into_iter()
            .filter(|r| r.status.occupies_room())
            .collect();
        for (i, a) in rows.iter().enumerate() {
            for b in &rows[i + 1..] {
                if a.room_number == b.room_number {
                    assert!(
                        !(a.checkin < b.checkout && b.checkin < a.checkout),
                        "{} and {} overlap in room {}",
                        a.booking_ref,
                        b.booking_ref,
                        a.room_number
                    );
                }
            }
        }
    }

    #[test]
    fn test_ids_and_refs_are_sequential() {
        let store = create_test_store();
        let a = store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
            .unwrap();
        let b = store
            .create(guest_draft(vec![stay("102", "2024-03-01", "2024-03-03")]))
            .unwrap();
        assert_eq!(a[0].id, 1);
        assert_eq!(a[0].booking_ref, "RES-00001");
        assert_eq!(b[0].id, 2);
        assert_eq!(b[0].booking_ref, "RES-00002");
    }

    #[test]
    fn test_conflict_leaves_store_unchanged() {
        let store = create_test_store();
        store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
            .unwrap();
        let before = store.all();

        let err = store
            .create(guest_draft(vec![
                stay("102", "2024-03-01", "2024-03-03"),
                stay("101", "2024-03-02", "2024-03-04"),
            ]))
            .unwrap_err();
        match err {
            StoreError::Conflict(c) => {
                assert_eq!(c.room, "101");
                assert_eq!(c.conflicting_booking_ref, "RES-00001");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.all(), before);
        assert!(store.is_room_available("102", d("2024-03-01"), d("2024-03-03"), &StayStatus::RELEASED));

        // The rejected draft did not consume a booking reference
        let next = store
            .create(guest_draft(vec![stay("101", "2024-03-03", "2024-03-05")]))
            .unwrap();
        assert_eq!(next[0].booking_ref, "RES-00002");
    }

    #[test]
    fn test_cancelled_stay_releases_room() {
        let store = create_test_store();
        let a = store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-05")]))
            .unwrap();
        assert!(
            store
                .create(guest_draft(vec![stay("101", "2024-03-02", "2024-03-03")]))
                .is_err()
        );

        store
            .update(a[0].id, |r| {
                r.rooms[0].status = StayStatus::Cancelled;
                Ok(())
            })
            .unwrap();
        store
            .create(guest_draft(vec![stay("101", "2024-03-02", "2024-03-03")]))
            .unwrap();
        assert_no_overlap(&store);
    }

    #[test]
    fn test_reinstating_cancelled_stay_is_checked() {
        let store = create_test_store();
        let a = store
            .create(guest_draft(vec![
                stay("101", "2024-03-01", "2024-03-05").with_status(StayStatus::Cancelled),
            ]))
            .unwrap();
        store
            .create(guest_draft(vec![stay("101", "2024-03-02", "2024-03-04")]))
            .unwrap();

        let err = store
            .update(a[0].id, |r| {
                r.rooms[0].status = StayStatus::Confirmed;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.get(a[0].id).unwrap().rooms[0].status, StayStatus::Cancelled);
        assert_no_overlap(&store);
    }

    #[test]
    fn test_date_change_into_conflict_is_rejected() {
        let store = create_test_store();
        store
            .create(guest_draft(vec![stay("101", "2024-03-05", "2024-03-08")]))
            .unwrap();
        let b = store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-05")]))
            .unwrap();

        let err = store
            .update(b[0].id, |r| {
                r.rooms[0].checkout = d("2024-03-06");
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Moving to another room is fine
        let moved = store
            .update(b[0].id, |r| {
                r.rooms[0].room_number = "102".to_string();
                r.rooms[0].checkout = d("2024-03-06");
                Ok(())
            })
            .unwrap();
        assert_eq!(moved.checkout(), Some(d("2024-03-06")));
        assert_no_overlap(&store);
    }

    #[test]
    fn test_non_placement_update_skips_overlap_check() {
        let store = create_test_store();
        let a = store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
            .unwrap();
        let updated = store
            .update(a[0].id, |r| {
                r.payments.push(Payment {
                    id: r.next_entry_id(),
                    amount: 50.0,
                    method: "cash".to_string(),
                    timestamp: 0,
                    note: None,
                });
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.payments.len(), 1);
        assert_eq!(store.billing_summary(a[0].id).unwrap().paid, 50.0);
    }

    #[test]
    fn test_ids_are_immutable() {
        let store = create_test_store();
        let a = store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
            .unwrap();
        let err = store
            .update(a[0].id, |r| {
                r.booking_ref = "HIJACK".to_string();
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(matches!(store.update(999, |_| Ok(())), Err(StoreError::NotFound(999))));
    }

    #[test]
    fn test_invalid_drafts_rejected() {
        let store = create_test_store();
        assert!(matches!(
            store.create(guest_draft(vec![])),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.create(guest_draft(vec![stay("101", "2024-03-03", "2024-03-03")])),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.create(guest_draft(vec![
                stay("101", "2024-03-01", "2024-03-03"),
                stay("101", "2024-03-02", "2024-03-04"),
            ])),
            Err(StoreError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_block_draft_splits_per_room() {
        let store = create_test_store();
        let created = store
            .create(ReservationDraft {
                kind: ReservationKind::Block,
                booker: Booker {
                    name: "Maintenance".to_string(),
                    ..Default::default()
                },
                rooms: vec![
                    stay("201", "2024-04-01", "2024-04-10"),
                    stay("202", "2024-04-01", "2024-04-10"),
                ],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_ne!(created[0].booking_ref, created[1].booking_ref);
        assert!(created.iter().all(|r| r.rooms.len() == 1));
        assert!(created.iter().all(|r| r.status == StayStatus::Blocked));

        // Blocks participate in the invariant
        let err = store
            .create(guest_draft(vec![stay("202", "2024-04-09", "2024-04-11")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_guest_multi_room_stays_one_aggregate() {
        let store = create_test_store();
        let created = store
            .create(guest_draft(vec![
                stay("101", "2024-03-01", "2024-03-03"),
                stay("102", "2024-03-01", "2024-03-04"),
            ]))
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(store.flatten().len(), 2);
        assert_eq!(created[0].checkout(), Some(d("2024-03-04")));
    }

    #[test]
    fn test_day_views() {
        let store = create_test_store();
        store
            .create(guest_draft(vec![
                stay("101", "2024-03-01", "2024-03-03"),
                stay("102", "2024-03-02", "2024-03-04"),
            ]))
            .unwrap();
        store
            .create(guest_draft(vec![
                stay("103", "2024-03-02", "2024-03-03").with_status(StayStatus::Cancelled),
            ]))
            .unwrap();

        assert_eq!(store.stays_on(d("2024-03-02")).len(), 2);
        assert_eq!(store.stays_on(d("2024-03-03")).len(), 1);
        assert_eq!(store.arrivals_on(d("2024-03-02")).len(), 1);
        assert_eq!(store.departures_on(d("2024-03-03")).len(), 1);
    }

    #[test]
    fn test_available_rooms() {
        let store = create_test_store();
        let registry = StaticRoomRegistry::new([
            Room {
                number: "101".to_string(),
                room_type: "double".to_string(),
                floor: Some(1),
            },
            Room {
                number: "102".to_string(),
                room_type: "double".to_string(),
                floor: Some(1),
            },
            Room {
                number: "201".to_string(),
                room_type: "suite".to_string(),
                floor: Some(2),
            },
        ]);
        store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
            .unwrap();

        let free = store.available_rooms(&registry, d("2024-03-02"), d("2024-03-04"), None);
        let numbers: Vec<&str> = free.iter().map(|r| r.number.as_str()).collect();
        assert_eq!(numbers, vec!["102", "201"]);

        let doubles =
            store.available_rooms(&registry, d("2024-03-02"), d("2024-03-04"), Some("double"));
        assert_eq!(doubles.len(), 1);
    }

    #[test]
    fn test_duplicate_portal_code_rejected() {
        let store = create_test_store();
        let a = store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
            .unwrap();
        let b = store
            .create(guest_draft(vec![stay("102", "2024-03-01", "2024-03-03")]))
            .unwrap();

        store
            .update(a[0].id, |r| {
                r.rooms[0].guest_portal_code = Some("TB-1234".to_string());
                Ok(())
            })
            .unwrap();
        let err = store
            .update(b[0].id, |r| {
                r.rooms[0].guest_portal_code = Some("TB-1234".to_string());
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePortalCode(_)));
        assert_eq!(store.portal_codes().len(), 1);
    }

    #[test]
    fn test_hydrates_from_cache_and_continues_counter() {
        let cache = LocalCache::open_in_memory().unwrap();
        {
            let store = ReservationStore::open(cache.clone(), DEFAULT_REF_PREFIX);
            store
                .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
                .unwrap();
            store
                .create(guest_draft(vec![stay("102", "2024-03-01", "2024-03-03")]))
                .unwrap();
        }

        let store = ReservationStore::open(cache, DEFAULT_REF_PREFIX);
        assert_eq!(store.len(), 2);
        assert!(!store.is_room_available("101", d("2024-03-01"), d("2024-03-02"), &StayStatus::RELEASED));
        let c = store
            .create(guest_draft(vec![stay("103", "2024-03-01", "2024-03-03")]))
            .unwrap();
        assert_eq!(c[0].id, 3);
        assert_eq!(c[0].booking_ref, "RES-00003");
    }

    #[test]
    fn test_version_bump_regenerates_cache() {
        let cache = LocalCache::open_in_memory().unwrap();
        {
            let store = ReservationStore::open_with_version(cache.clone(), DEFAULT_REF_PREFIX, 7);
            store
                .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
                .unwrap();
        }

        let store = ReservationStore::open_with_version(cache.clone(), DEFAULT_REF_PREFIX, 8);
        assert!(store.is_empty());
        match cache.load_reservations(8).unwrap() {
            CacheLoad::Loaded { reservations, .. } => assert!(reservations.is_empty()),
            other => panic!("expected regenerated snapshot, got {other:?}"),
        }

        // References are never reused, even across a regeneration
        let c = store
            .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-03")]))
            .unwrap();
        assert_eq!(c[0].booking_ref, "RES-00002");
    }

    #[test]
    fn test_portal_window_follows_date_change() {
        let store = create_test_store();
        let a = store
            .create(guest_draft(vec![stay("101", "2024-03-10", "2024-03-12")]))
            .unwrap();
        let (from, until) = portal::validity_window(d("2024-03-10"), d("2024-03-12"));
        store
            .update(a[0].id, |r| {
                r.rooms[0].guest_portal_code = Some("TB-0042".to_string());
                r.rooms[0].portal_code_valid_from = Some(from);
                r.rooms[0].portal_code_valid_until = Some(until);
                Ok(())
            })
            .unwrap();
        assert!(store.find_by_portal_code("TB-0042", from).is_some());

        let moved = store
            .update(a[0].id, |r| {
                r.rooms[0].checkin = d("2024-06-10");
                r.rooms[0].checkout = d("2024-06-12");
                Ok(())
            })
            .unwrap();
        let (new_from, new_until) = portal::validity_window(d("2024-06-10"), d("2024-06-12"));
        assert_eq!(moved.rooms[0].portal_code_valid_from, Some(new_from));
        assert_eq!(moved.rooms[0].portal_code_valid_until, Some(new_until));

        assert!(store.find_by_portal_code("TB-0042", from).is_none());
        assert!(store.find_by_portal_code("TB-0042", new_from).is_some());
        assert!(store.find_by_portal_code("TB-0042", new_until).is_some());
    }

    #[test]
    fn test_released_stay_code_does_not_resolve() {
        let store = create_test_store();
        let a = store
            .create(guest_draft(vec![stay("101", "2024-03-10", "2024-03-12")]))
            .unwrap();
        let (from, _) = portal::validity_window(d("2024-03-10"), d("2024-03-12"));
        store
            .update(a[0].id, |r| {
                r.rooms[0].guest_portal_code = Some("TB-0042".to_string());
                Ok(())
            })
            .unwrap();
        assert!(store.find_by_portal_code("TB-0042", from).is_some());

        for status in StayStatus::RELEASED {
            store
                .update(a[0].id, |r| {
                    r.rooms[0].status = status;
                    Ok(())
                })
                .unwrap();
            assert!(store.find_by_portal_code("TB-0042", from).is_none());
        }
    }

    #[test]
    fn test_hydration_drops_overlaps_and_duplicates() {
        let cache = LocalCache::open_in_memory().unwrap();
        let seeded = {
            let store = ReservationStore::open(cache.clone(), DEFAULT_REF_PREFIX);
            store
                .create(guest_draft(vec![stay("101", "2024-03-01", "2024-03-05")]))
                .unwrap();
            store
                .create(guest_draft(vec![stay("102", "2024-03-01", "2024-03-05")]))
                .unwrap();
            store.all()
        };

        let first = seeded[0].clone();
        let mut overlapping = seeded[1].clone();
        overlapping.rooms[0].room_number = "101".to_string();
        let mut same_id = first.clone();
        same_id.booking_ref = "RES-00077".to_string();
        same_id.rooms[0].room_number = "103".to_string();
        let mut same_ref = first.clone();
        same_ref.id = 9;
        same_ref.rooms[0].room_number = "104".to_string();
        cache
            .save_reservations(
                &[first.clone(), overlapping, same_id, same_ref],
                CACHE_SCHEMA_VERSION,
            )
            .unwrap();

        let store = ReservationStore::open(cache, DEFAULT_REF_PREFIX);
        let kept: Vec<(u64, String)> = store.all().into_iter().map(|r| (r.id, r.booking_ref)).collect();
        assert_eq!(kept, vec![(first.id, first.booking_ref.clone())]);
        assert!(store.is_room_available("103", d("2024-03-01"), d("2024-03-05"), &StayStatus::RELEASED));
        assert_no_overlap(&store);

        // Ids and references of dropped entries are not handed out again
        let next = store
            .create(guest_draft(vec![stay("105", "2024-03-01", "2024-03-02")]))
            .unwrap();
        assert_eq!(next[0].id, 10);
        assert_eq!(next[0].booking_ref, "RES-00078");
    }
}
