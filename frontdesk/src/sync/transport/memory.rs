//! 内存传输层实现 (同进程后端)

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::RemoteTransport;
use crate::sync::error::{SyncError, SyncResult};

/// One recorded upsert call
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRequest {
    pub table: String,
    pub conflict_key: String,
    pub rows: Vec<Value>,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// table → (conflict key value → row)
    tables: HashMap<String, BTreeMap<String, Value>>,
    requests: Vec<UpsertRequest>,
    /// Tables whose rows are written but not readable back
    hidden: HashSet<String>,
}

/// In-process backend with upsert semantics
///
/// Rows are merged whole by their conflict key. Every upsert call is
/// recorded, including failed ones. Used by tests and offline demos.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    unreachable: Arc<AtomicBool>,
    /// Number of upcoming upserts to reject with a 503
    failures: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend every call to which fails at the network level
    pub fn unreachable() -> Self {
        let transport = Self::default();
        transport.set_unreachable(true);
        transport
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Reject the next `n` upserts with a server error
    pub fn fail_next_upserts(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Accept writes to `table` but return no rows when it is read
    pub fn hide_table(&self, table: &str) {
        self.state.lock().hidden.insert(table.to_string());
    }

    pub fn requests(&self) -> Vec<UpsertRequest> {
        self.state.lock().requests.clone()
    }

    pub fn requests_for(&self, table: &str) -> Vec<UpsertRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.table == table)
            .cloned()
            .collect()
    }

    /// Stored rows of a table, ordered by key
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, key: &str) -> Option<Value> {
        self.state.lock().tables.get(table)?.get(key).cloned()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RemoteTransport for MemoryTransport {
    async fn upsert(&self, table: &str, conflict_key: &str, rows: &[Value]) -> SyncResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("connection refused".to_string()));
        }

        let mut state = self.state.lock();
        state.requests.push(UpsertRequest {
            table: table.to_string(),
            conflict_key: conflict_key.to_string(),
            rows: rows.to_vec(),
        });
        drop(state);

        if self.take_failure() {
            return Err(SyncError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }

        let mut state = self.state.lock();
        let stored = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            let Some(key) = row.get(conflict_key).filter(|k| !k.is_null()) else {
                return Err(SyncError::Status {
                    status: 400,
                    body: format!("row without conflict column {conflict_key}"),
                });
            };
            stored.insert(key_string(key), row.clone());
        }
        Ok(())
    }

    async fn select(&self, table: &str, columns: &str, limit: usize) -> SyncResult<Vec<Value>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("connection refused".to_string()));
        }

        let state = self.state.lock();
        if state.hidden.contains(table) {
            return Ok(Vec::new());
        }
        let wanted: Vec<&str> = columns.split(',').map(str::trim).collect();
        let rows = state
            .tables
            .get(table)
            .map(|t| {
                t.values()
                    .take(limit)
                    .map(|row| project(row, &wanted))
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

fn project(row: &Value, columns: &[&str]) -> Value {
    if columns.contains(&"*") {
        return row.clone();
    }
    let Some(obj) = row.as_object() else {
        return row.clone();
    };
    let picked = obj
        .iter()
        .filter(|(k, _)| columns.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_merges_whole_rows_by_key() {
        let transport = MemoryTransport::new();
        transport
            .upsert("config", "key", &[json!({"key": "a", "data": 1})])
            .await
            .unwrap();
        transport
            .upsert("config", "key", &[json!({"key": "a", "data": 2}), json!({"key": "b", "data": 3})])
            .await
            .unwrap();

        assert_eq!(transport.rows("config").len(), 2);
        assert_eq!(transport.row("config", "a").unwrap()["data"], 2);
        assert_eq!(transport.requests_for("config").len(), 2);

        let selected = transport.select("config", "key", 1).await.unwrap();
        assert_eq!(selected, vec![json!({"key": "a"})]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let transport = MemoryTransport::new();
        transport.fail_next_upserts(1);
        assert!(transport.upsert("t", "id", &[json!({"id": 1})]).await.is_err());
        assert!(transport.upsert("t", "id", &[json!({"id": 1})]).await.is_ok());

        transport.set_unreachable(true);
        assert!(matches!(
            transport.select("t", "id", 1).await,
            Err(SyncError::Transport(_))
        ));
    }
}
