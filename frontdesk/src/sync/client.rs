//! RemoteSyncClient: best-effort replication to the remote backend
//!
//! Local state is authoritative. Every remote failure is logged and
//! reflected in the published [`SyncState`]; nothing here ever rolls back or
//! clears local data.
//!
//! # Startup
//!
//! ```text
//! probe (1-row read) ──fail──→ offline (no remote work this session)
//!        │
//!        ok
//!        ├─ 1. push every reservation
//!        ├─ 2. push config key/values
//!        └─ 3. push each profile table, read back and warn if nothing is visible
//! ```

use serde::Serialize;
use serde_json::Value;
use shared::cloud::{
    CONFIG_CONFLICT_KEY, CONFIG_TABLE, ConfigRow, PROFILE_CONFLICT_KEY, ProfileRow,
    RESERVATION_CONFLICT_KEY, RESERVATIONS_TABLE, ReservationRow, SyncState, SyncStatus,
};
use shared::models::{Profile, ProfileTable, Reservation};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

use super::error::{SyncError, SyncResult};
use super::scheduler::SyncScheduler;
use super::transport::RemoteTransport;
use crate::cache::LocalCache;
use crate::core::SyncConfig;
use crate::reservations::ReservationStore;

/// Upper bound for the retry backoff
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Scheduler key of the full reservation push
pub const FULL_PUSH_KEY: &str = "all-res";

pub fn reservation_key(booking_ref: &str) -> String {
    format!("res-{booking_ref}")
}

pub fn config_key(key: &str) -> String {
    format!("cfg-{key}")
}

pub fn profile_key(table: ProfileTable) -> String {
    format!("prof-{table}")
}

/// Collapse rows sharing a conflict key
///
/// Each key keeps the position of its first occurrence and the value of its
/// last. Rows missing the key are dropped.
pub fn dedup_by_key(rows: Vec<Value>, conflict_key: &str) -> Vec<Value> {
    let mut slots: Vec<Value> = Vec::with_capacity(rows.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(rows.len());
    let mut missing = 0usize;

    for row in rows {
        let key = match row.get(conflict_key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                missing += 1;
                continue;
            }
            Some(other) => other.to_string(),
        };
        match index.get(&key) {
            Some(&pos) => slots[pos] = row,
            None => {
                index.insert(key, slots.len());
                slots.push(row);
            }
        }
    }

    if missing > 0 {
        tracing::warn!(conflict_key, missing, "Dropped rows without a conflict key");
    }
    slots
}

fn to_rows<T: Serialize>(items: impl IntoIterator<Item = T>) -> SyncResult<Vec<Value>> {
    items
        .into_iter()
        .map(|item| serde_json::to_value(item).map_err(SyncError::from))
        .collect()
}

struct ClientInner {
    /// None when the session has no remote backend
    transport: Option<Arc<dyn RemoteTransport>>,
    scheduler: SyncScheduler,
    state: watch::Sender<SyncState>,
    /// Batches currently being sent
    in_flight: AtomicUsize,
    config: SyncConfig,
}

/// Remote sync client
#[derive(Clone)]
pub struct RemoteSyncClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for RemoteSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSyncClient")
            .field("transport", &self.inner.transport)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl RemoteSyncClient {
    pub fn new(transport: Arc<dyn RemoteTransport>, config: SyncConfig) -> Self {
        Self::build(Some(transport), config)
    }

    fn build(transport: Option<Arc<dyn RemoteTransport>>, config: SyncConfig) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            inner: Arc::new(ClientInner {
                transport,
                scheduler: SyncScheduler::new(),
                state,
                in_flight: AtomicUsize::new(0),
                config,
            }),
        }
    }

    /// Client for a session without a remote backend; every push is skipped
    pub fn offline(config: SyncConfig) -> Self {
        let client = Self::build(None, config);
        client.inner.state.send_modify(|state| {
            state.status = SyncStatus::Offline;
            state.last_error = Some("no remote backend configured".to_string());
        });
        client
    }

    // ========== Status ==========

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.state.borrow().status
    }

    pub fn is_offline(&self) -> bool {
        self.status() == SyncStatus::Offline
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.inner.scheduler
    }

    fn transport(&self) -> SyncResult<&dyn RemoteTransport> {
        self.inner.transport.as_deref().ok_or(SyncError::Offline)
    }

    fn set_status(&self, status: SyncStatus, error: Option<String>) {
        self.inner.state.send_if_modified(|state| {
            // Offline is terminal for the session
            if state.status == SyncStatus::Offline {
                return false;
            }
            // Idle only once no batch is in flight
            if status == SyncStatus::Idle && self.inner.in_flight.load(Ordering::SeqCst) > 0 {
                return false;
            }
            let previous = state.status;
            state.status = status;
            match status {
                SyncStatus::Idle => {
                    state.last_synced_at = Some(shared::util::now_millis());
                    state.last_error = None;
                }
                SyncStatus::Error => state.last_error = error,
                SyncStatus::Syncing | SyncStatus::Offline => {}
            }
            if previous != status {
                tracing::info!(from = ?previous, to = ?status, "Sync status changed");
            }
            true
        });
    }

    fn mark_offline(&self, reason: &SyncError) {
        self.inner.state.send_modify(|state| {
            state.status = SyncStatus::Offline;
            state.last_error = Some(reason.to_string());
        });
        tracing::warn!("Remote backend unreachable, working offline this session: {reason}");
    }

    // ========== Upsert ==========

    /// Deduplicate, chunk and upsert rows; returns the number of rows sent
    ///
    /// Chunks go out one after another. The first chunk that still fails
    /// after its retries aborts the batch and moves the status to `error`.
    pub async fn upsert_batch(
        &self,
        table: &str,
        rows: Vec<Value>,
        conflict_key: &str,
    ) -> SyncResult<usize> {
        if self.is_offline() {
            return Err(SyncError::Offline);
        }

        let rows = dedup_by_key(rows, conflict_key);
        if rows.is_empty() {
            return Ok(0);
        }

        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        self.set_status(SyncStatus::Syncing, None);

        let result = self.send_chunks(table, &rows, conflict_key).await;

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        match &result {
            Ok(sent) => {
                tracing::debug!(table, rows = sent, "Upsert batch complete");
                self.set_status(SyncStatus::Idle, None);
            }
            Err(e) => {
                tracing::error!(table, "Upsert batch failed: {e}");
                self.set_status(SyncStatus::Error, Some(e.to_string()));
            }
        }
        result
    }

    async fn send_chunks(&self, table: &str, rows: &[Value], conflict_key: &str) -> SyncResult<usize> {
        let batch_size = self.inner.config.batch_size.max(1);
        let chunks = rows.len().div_ceil(batch_size);
        let mut sent = 0;
        for (i, chunk) in rows.chunks(batch_size).enumerate() {
            self.send_with_retry(table, chunk, conflict_key).await?;
            sent += chunk.len();
            tracing::debug!(table, chunk = i + 1, chunks, rows = chunk.len(), "Chunk upserted");
        }
        Ok(sent)
    }

    /// One chunk with exponential backoff retry
    async fn send_with_retry(&self, table: &str, chunk: &[Value], conflict_key: &str) -> SyncResult<()> {
        let max_attempts = self.inner.config.max_attempts.max(1);
        let mut delay = self.inner.config.retry_delay;

        let transport = self.transport()?;
        let mut attempt = 1;
        loop {
            match transport.upsert(table, conflict_key, chunk).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    tracing::warn!(
                        table,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Upsert attempt failed, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ========== Typed pushes ==========

    /// Push a reservation snapshot
    pub async fn push_all(&self, reservations: &[Reservation]) -> SyncResult<usize> {
        let rows = reservations
            .iter()
            .map(ReservationRow::from_reservation)
            .collect::<Result<Vec<_>, _>>()?;
        let rows = to_rows(rows)?;
        self.upsert_batch(RESERVATIONS_TABLE, rows, RESERVATION_CONFLICT_KEY)
            .await
    }

    pub async fn push_config(&self, entries: Vec<(String, Value)>) -> SyncResult<usize> {
        let rows = to_rows(
            entries
                .into_iter()
                .map(|(key, data)| ConfigRow { key, data }),
        )?;
        self.upsert_batch(CONFIG_TABLE, rows, CONFIG_CONFLICT_KEY)
            .await
    }

    pub async fn push_profiles(&self, table: ProfileTable, profiles: Vec<Profile>) -> SyncResult<usize> {
        let rows = to_rows(profiles.into_iter().map(ProfileRow::from))?;
        self.upsert_batch(table.as_str(), rows, PROFILE_CONFLICT_KEY)
            .await
    }

    /// Rows of a profile table visible to this client (reads at most `limit`)
    pub async fn verify_profiles(&self, table: ProfileTable, limit: usize) -> SyncResult<usize> {
        if self.is_offline() {
            return Err(SyncError::Offline);
        }
        let visible = self
            .transport()?
            .select(table.as_str(), PROFILE_CONFLICT_KEY, limit)
            .await?
            .len();
        if visible == 0 {
            tracing::warn!(
                table = %table,
                "Profile push accepted but no rows are visible; check read permissions on the table"
            );
        }
        Ok(visible)
    }

    // ========== Debounced pushes ==========

    /// Push one reservation after the debounce window, reading it at fire time
    pub fn schedule_reservation(&self, store: Arc<ReservationStore>, booking_ref: &str) {
        if self.is_offline() {
            return;
        }
        let client = self.clone();
        let booking_ref = booking_ref.to_string();
        self.inner.scheduler.schedule(
            reservation_key(&booking_ref),
            self.inner.config.debounce,
            move || async move {
                let Some(reservation) = store.get_by_ref(&booking_ref) else {
                    tracing::warn!(booking_ref = %booking_ref, "Scheduled reservation no longer exists");
                    return;
                };
                if let Err(e) = client.push_all(std::slice::from_ref(&reservation)).await {
                    tracing::error!(booking_ref = %booking_ref, "Reservation push failed: {e}");
                }
            },
        );
    }

    /// Push every reservation after the debounce window
    pub fn schedule_full_push(&self, store: Arc<ReservationStore>) {
        if self.is_offline() {
            return;
        }
        let client = self.clone();
        self.inner
            .scheduler
            .schedule(FULL_PUSH_KEY, self.inner.config.debounce, move || async move {
                match client.push_all(&store.all()).await {
                    Ok(rows) => tracing::info!(rows, "Full reservation push complete"),
                    Err(e) => tracing::error!("Full reservation push failed: {e}"),
                }
            });
    }

    pub fn schedule_config(&self, cache: LocalCache, key: &str) {
        if self.is_offline() {
            return;
        }
        let client = self.clone();
        let key = key.to_string();
        self.inner.scheduler.schedule(
            config_key(&key),
            self.inner.config.debounce,
            move || async move {
                let value = match cache.get_config(&key) {
                    Ok(Some(value)) => value,
                    Ok(None) => return,
                    Err(e) => {
                        tracing::error!(key = %key, "Failed to read config for sync: {e}");
                        return;
                    }
                };
                if let Err(e) = client.push_config(vec![(key.clone(), value)]).await {
                    tracing::error!(key = %key, "Config push failed: {e}");
                }
            },
        );
    }

    pub fn schedule_profiles(&self, cache: LocalCache, table: ProfileTable) {
        if self.is_offline() {
            return;
        }
        let client = self.clone();
        self.inner.scheduler.schedule(
            profile_key(table),
            self.inner.config.debounce,
            move || async move {
                let profiles = match cache.profiles(table) {
                    Ok(profiles) => profiles,
                    Err(e) => {
                        tracing::error!(table = %table, "Failed to read profiles for sync: {e}");
                        return;
                    }
                };
                if let Err(e) = client.push_profiles(table, profiles).await {
                    tracing::error!(table = %table, "Profile push failed: {e}");
                }
            },
        );
    }

    /// Run every pending debounced push now
    pub async fn flush(&self) {
        self.inner.scheduler.flush().await;
    }

    // ========== Startup ==========

    /// One-row read against the reservations table
    async fn probe(&self) -> SyncResult<()> {
        self.transport()?
            .select(RESERVATIONS_TABLE, RESERVATION_CONFLICT_KEY, 1)
            .await?;
        Ok(())
    }

    /// Probe the backend, then push local data in order
    ///
    /// Returns the final status. Failures are logged, never propagated.
    pub async fn startup(&self, store: &ReservationStore, cache: &LocalCache) -> SyncStatus {
        if self.is_offline() {
            tracing::info!("No remote backend, skipping initial sync");
            return SyncStatus::Offline;
        }
        if let Err(e) = self.probe().await {
            self.mark_offline(&e);
            return SyncStatus::Offline;
        }
        tracing::info!("Remote backend reachable, starting initial sync");

        // 1. Reservations
        match self.push_all(&store.all()).await {
            Ok(rows) => tracing::info!(rows, "Reservations pushed"),
            Err(e) => tracing::error!("Initial reservation push failed: {e}"),
        }

        // 2. Config
        match cache.config_entries() {
            Ok(entries) if entries.is_empty() => {}
            Ok(entries) => match self.push_config(entries).await {
                Ok(rows) => tracing::info!(rows, "Config pushed"),
                Err(e) => tracing::error!("Initial config push failed: {e}"),
            },
            Err(e) => tracing::error!("Failed to read config from cache: {e}"),
        }

        // 3. Profiles
        for table in ProfileTable::ALL {
            let profiles = match cache.profiles(table) {
                Ok(profiles) => profiles,
                Err(e) => {
                    tracing::error!(table = %table, "Failed to read profiles from cache: {e}");
                    continue;
                }
            };
            if profiles.is_empty() {
                continue;
            }
            let local = profiles.len();
            match self.push_profiles(table, profiles).await {
                Ok(rows) => {
                    tracing::info!(table = %table, rows, "Profiles pushed");
                    if let Err(e) = self.verify_profiles(table, local).await {
                        tracing::warn!(table = %table, "Profile verification failed: {e}");
                    }
                }
                Err(e) => tracing::error!(table = %table, "Initial profile push failed: {e}"),
            }
        }

        self.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::transport::MemoryTransport;
    use serde_json::json;

    fn test_config() -> SyncConfig {
        SyncConfig {
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn client_with(transport: &MemoryTransport) -> RemoteSyncClient {
        RemoteSyncClient::new(Arc::new(transport.clone()), test_config())
    }

    #[test]
    fn test_dedup_keeps_last_value() {
        let rows = vec![
            json!({"k": "A", "v": 1}),
            json!({"k": "A", "v": 2}),
            json!({"k": "B", "v": 3}),
        ];
        assert_eq!(
            dedup_by_key(rows, "k"),
            vec![json!({"k": "A", "v": 2}), json!({"k": "B", "v": 3})]
        );
    }

    #[test]
    fn test_dedup_drops_rows_without_key() {
        let rows = vec![json!({"k": null}), json!({"v": 1}), json!({"k": 7})];
        assert_eq!(dedup_by_key(rows, "k"), vec![json!({"k": 7})]);
    }

    #[tokio::test]
    async fn test_chunking_130_rows() {
        let transport = MemoryTransport::new();
        let client = client_with(&transport);
        let rows: Vec<Value> = (0..130).map(|i| json!({"id": format!("g{i}")})).collect();

        let sent = client.upsert_batch("guests", rows, "id").await.unwrap();
        assert_eq!(sent, 130);
        let sizes: Vec<usize> = transport.requests().iter().map(|r| r.rows.len()).collect();
        assert_eq!(sizes, vec![50, 50, 30]);
        assert_eq!(transport.rows("guests").len(), 130);
    }

    #[tokio::test]
    async fn test_success_moves_to_idle_with_timestamp() {
        let transport = MemoryTransport::new();
        let client = client_with(&transport);
        let mut rx = client.subscribe();

        client
            .upsert_batch("config", vec![json!({"key": "a", "data": 1})], "key")
            .await
            .unwrap();

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.status, SyncStatus::Idle);
        assert!(state.last_synced_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let transport = MemoryTransport::new();
        transport.fail_next_upserts(2);
        let client = client_with(&transport);

        client
            .upsert_batch("config", vec![json!({"key": "a", "data": 1})], "key")
            .await
            .unwrap();
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(client.status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_sets_error() {
        let transport = MemoryTransport::new();
        transport.fail_next_upserts(10);
        let client = client_with(&transport);

        let err = client
            .upsert_batch("config", vec![json!({"key": "a", "data": 1})], "key")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 503, .. }));
        assert_eq!(transport.requests().len(), 3);

        let state = client.state();
        assert_eq!(state.status, SyncStatus::Error);
        assert!(state.last_error.is_some());
    }

    #[test]
    fn test_idle_waits_for_every_batch_in_flight() {
        let client = client_with(&MemoryTransport::new());

        // Another batch started after this one finished sending
        client.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        client.set_status(SyncStatus::Syncing, None);
        client.set_status(SyncStatus::Idle, None);
        assert_eq!(client.status(), SyncStatus::Syncing);

        client.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        client.set_status(SyncStatus::Idle, None);
        assert_eq!(client.status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_unreachable_backend_goes_offline() {
        let transport = MemoryTransport::unreachable();
        let client = client_with(&transport);
        let cache = LocalCache::open_in_memory().unwrap();
        let store = ReservationStore::open(cache.clone(), "RES-");

        let status = client.startup(&store, &cache).await;
        assert_eq!(status, SyncStatus::Offline);

        // Remote work is skipped for the rest of the session
        transport.set_unreachable(false);
        let err = client
            .upsert_batch("config", vec![json!({"key": "a"})], "key")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Offline));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_offline_client_skips_everything() {
        let client = RemoteSyncClient::offline(test_config());
        let cache = LocalCache::open_in_memory().unwrap();
        let store = Arc::new(ReservationStore::open(cache.clone(), "RES-"));

        assert_eq!(client.startup(&store, &cache).await, SyncStatus::Offline);
        client.schedule_full_push(store);
        assert_eq!(client.scheduler().pending_count(), 0);
        assert!(matches!(
            client.verify_profiles(ProfileTable::Guests, 1).await,
            Err(SyncError::Offline)
        ));
    }

    #[tokio::test]
    async fn test_hidden_profiles_are_reported_not_failed() {
        let transport = MemoryTransport::new();
        transport.hide_table("guests");
        let client = client_with(&transport);

        client
            .push_profiles(
                ProfileTable::Guests,
                vec![Profile {
                    id: "g1".to_string(),
                    data: json!({"name": "Ada"}),
                }],
            )
            .await
            .unwrap();
        assert_eq!(client.verify_profiles(ProfileTable::Guests, 10).await.unwrap(), 0);
        assert_eq!(client.status(), SyncStatus::Idle);
    }
}
