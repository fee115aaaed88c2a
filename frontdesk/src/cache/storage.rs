//! redb-based local cache
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `local_cache` | `"reservations"` / `"schema_version"` | `&str` | Versioned reservation snapshot |
//! | `counters` | `"booking_ref"` | `u64` | Last issued booking reference number |
//! | `config` | config key | JSON `&str` | Key/value configuration |
//! | `profiles` | `(table, id)` | JSON `&str` | Company / guest / booker profiles |
//!
//! # Versioning
//!
//! The snapshot and its schema version are written in one transaction. A
//! reader expecting another version gets [`CacheLoad::VersionMismatch`] and
//! must regenerate the whole snapshot; entries are never migrated piecemeal.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde_json::{Map, Value};
use shared::models::{Profile, ProfileTable, Reservation};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Current layout of the serialized reservation snapshot
pub const CACHE_SCHEMA_VERSION: u32 = 3;

/// Snapshot table: both values are plain strings
const CACHE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_cache");

const COUNTER_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const CONFIG_TABLE: TableDefinition<&str, &str> = TableDefinition::new("config");

/// key = (profile table, profile id)
const PROFILES_TABLE: TableDefinition<(&str, &str), &str> = TableDefinition::new("profiles");

const RESERVATIONS_KEY: &str = "reservations";
const SCHEMA_VERSION_KEY: &str = "schema_version";
const BOOKING_REF_KEY: &str = "booking_ref";

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Outcome of loading the reservation snapshot
#[derive(Debug)]
pub enum CacheLoad {
    /// Nothing stored yet
    Empty,
    Loaded {
        reservations: Vec<Reservation>,
        /// Corrupt entries skipped during rehydration
        dropped: usize,
    },
    /// Stored under another schema version; regenerate everything
    VersionMismatch { stored: u32, expected: u32 },
}

/// Local cache backed by redb
#[derive(Clone)]
pub struct LocalCache {
    db: Arc<Database>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}

impl LocalCache {
    /// Open or create the cache database at the given path
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open a cache that lives only for this process
    pub fn open_in_memory() -> CacheResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> CacheResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CACHE_TABLE)?;
            let _ = write_txn.open_table(COUNTER_TABLE)?;
            let _ = write_txn.open_table(CONFIG_TABLE)?;
            let _ = write_txn.open_table(PROFILES_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    // ========== Reservation Snapshot ==========

    /// Load the reservation snapshot, checking it against `expected_version`
    pub fn load_reservations(&self, expected_version: u32) -> CacheResult<CacheLoad> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CACHE_TABLE)?;

        let payload = match table.get(RESERVATIONS_KEY)? {
            Some(guard) => guard.value().to_string(),
            None => return Ok(CacheLoad::Empty),
        };

        let stored = table
            .get(SCHEMA_VERSION_KEY)?
            .and_then(|guard| guard.value().trim().parse::<u32>().ok())
            .unwrap_or(0);
        if stored != expected_version {
            return Ok(CacheLoad::VersionMismatch {
                stored,
                expected: expected_version,
            });
        }

        let (reservations, dropped) = decode_snapshot(&payload)?;
        Ok(CacheLoad::Loaded {
            reservations,
            dropped,
        })
    }

    /// Replace the snapshot and its schema version atomically
    pub fn save_reservations(&self, reservations: &[Reservation], version: u32) -> CacheResult<()> {
        let payload = serde_json::to_string(reservations)?;
        let version = version.to_string();

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CACHE_TABLE)?;
            table.insert(RESERVATIONS_KEY, payload.as_str())?;
            table.insert(SCHEMA_VERSION_KEY, version.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Drop the snapshot (the booking reference counter survives)
    pub fn clear_reservations(&self) -> CacheResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CACHE_TABLE)?;
            table.remove(RESERVATIONS_KEY)?;
            table.remove(SCHEMA_VERSION_KEY)?;
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Booking Reference Counter ==========

    /// Last issued booking reference number (0 when none)
    pub fn booking_counter(&self) -> CacheResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COUNTER_TABLE)?;
        Ok(table
            .get(BOOKING_REF_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    /// Persist the last issued number; the stored value never moves backwards
    pub fn store_booking_counter(&self, value: u64) -> CacheResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(COUNTER_TABLE)?;
            let current = table
                .get(BOOKING_REF_KEY)?
                .map(|guard| guard.value())
                .unwrap_or(0);
            if value > current {
                table.insert(BOOKING_REF_KEY, value)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Config ==========

    pub fn put_config(&self, key: &str, value: &Value) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CONFIG_TABLE)?;
            table.insert(key, json.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> CacheResult<Option<Value>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONFIG_TABLE)?;
        match table.get(key)? {
            Some(guard) => Ok(Some(serde_json::from_str(guard.value())?)),
            None => Ok(None),
        }
    }

    /// All config entries, ordered by key
    pub fn config_entries(&self) -> CacheResult<Vec<(String, Value)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CONFIG_TABLE)?;

        let mut entries = Vec::new();
        for result in table.iter()? {
            let (key, value) = result?;
            match serde_json::from_str(value.value()) {
                Ok(json) => entries.push((key.value().to_string(), json)),
                Err(e) => {
                    tracing::warn!(key = %key.value(), "Skipping unreadable config entry: {e}");
                }
            }
        }
        Ok(entries)
    }

    // ========== Profiles ==========

    pub fn put_profile(&self, table: ProfileTable, id: &str, data: &Value) -> CacheResult<()> {
        let json = serde_json::to_string(data)?;
        let txn = self.db.begin_write()?;
        {
            let mut profiles = txn.open_table(PROFILES_TABLE)?;
            profiles.insert((table.as_str(), id), json.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All profiles of one table, ordered by id
    pub fn profiles(&self, table: ProfileTable) -> CacheResult<Vec<Profile>> {
        let read_txn = self.db.begin_read()?;
        let profiles = read_txn.open_table(PROFILES_TABLE)?;

        let name = table.as_str();
        let mut out = Vec::new();
        for result in profiles.range((name, "")..)? {
            let (key, value) = result?;
            let (owner, id) = key.value();
            if owner != name {
                break;
            }
            match serde_json::from_str(value.value()) {
                Ok(data) => out.push(Profile {
                    id: id.to_string(),
                    data,
                }),
                Err(e) => {
                    tracing::warn!(table = %name, id = %id, "Skipping unreadable profile: {e}");
                }
            }
        }
        Ok(out)
    }
}

// ========== Rehydration ==========

/// Decode a snapshot payload, dropping corrupt entries
///
/// Returns the surviving reservations and the number dropped. Only a payload
/// that is not a JSON array at all is an error.
pub fn decode_snapshot(payload: &str) -> CacheResult<(Vec<Reservation>, usize)> {
    let entries: Vec<Value> = serde_json::from_str(payload)?;
    let total = entries.len();

    let reservations: Vec<Reservation> = entries.into_iter().filter_map(rehydrate).collect();
    let dropped = total - reservations.len();
    if dropped > 0 {
        tracing::warn!(dropped, total, "Dropped corrupt reservations from local cache");
    }
    Ok((reservations, dropped))
}

/// Rebuild one reservation from its cached JSON
///
/// Entries without an `id`, a `bookingRef` or at least one room are corrupt.
/// A room without dates inherits the reservation-level `checkin` / `checkout`
/// written by older payloads.
fn rehydrate(mut entry: Value) -> Option<Reservation> {
    let obj = entry.as_object_mut()?;

    obj.get("id").and_then(Value::as_u64).filter(|id| *id > 0)?;
    obj.get("bookingRef")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())?;

    let parent_checkin = obj.get("checkin").cloned();
    let parent_checkout = obj.get("checkout").cloned();

    let rooms = obj.get_mut("rooms")?.as_array_mut()?;
    if rooms.is_empty() {
        return None;
    }
    for room in rooms.iter_mut() {
        let room = room.as_object_mut()?;
        inherit(room, "checkin", parent_checkin.as_ref());
        inherit(room, "checkout", parent_checkout.as_ref());
    }

    let mut reservation: Reservation = serde_json::from_value(entry).ok()?;
    if reservation.rooms.iter().any(|r| r.checkout <= r.checkin) {
        return None;
    }
    reservation.refresh_status();
    Some(reservation)
}

fn inherit(room: &mut Map<String, Value>, field: &str, parent: Option<&Value>) {
    let missing = room.get(field).is_none_or(Value::is_null);
    if missing && let Some(value) = parent.filter(|v| !v.is_null()) {
        room.insert(field.to_string(), value.clone());
    }
}
