//! 传输层抽象
//!
//! 远端复制的可插拔接口：
//! ```text
//!         ┌──────────────────────┐
//!         │ RemoteTransport Trait│  ◄── 可插拔接口
//!         └──────────┬───────────┘
//!                    │
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//!    RestTransport      MemoryTransport
//!    (PostgREST HTTP)   (同进程内存后端)
//! ```

mod memory;
mod rest;

pub use memory::{MemoryTransport, UpsertRequest};
pub use rest::RestTransport;

use async_trait::async_trait;
use serde_json::Value;

use super::error::SyncResult;

/// 远端传输特征
///
/// 只检查 HTTP 状态，不解析 upsert 的响应体。
#[async_trait]
pub trait RemoteTransport: Send + Sync + std::fmt::Debug {
    /// Upsert `rows` into `table`, resolving conflicts on `conflict_key`
    async fn upsert(&self, table: &str, conflict_key: &str, rows: &[Value]) -> SyncResult<()>;

    /// Read up to `limit` rows, selecting `columns` (comma separated)
    async fn select(&self, table: &str, columns: &str, limit: usize) -> SyncResult<Vec<Value>>;
}
