//! 统一错误处理
//!
//! 会话层错误类型 [`AppError`]，汇总各层错误：
//!
//! | 来源 | 变体 | 说明 |
//! |------|------|------|
//! | 预订存储 | `Conflict` / `NotFound` / `Validation` / `DuplicatePortalCode` | 需反馈给操作员 |
//! | 门户码 | `Portal` | 所有字母组合均已耗尽 |
//! | 本地缓存 | `Cache` | redb / 序列化错误 |
//! | 远端同步 | `Sync` | 非致命，仅记录 |
//!
//! # 使用示例
//!
//! ```ignore
//! let created = desk.create_reservation(draft)?;
//! ```

use crate::cache::CacheError;
use crate::reservations::{ConflictError, PortalError, StoreError};
use crate::sync::SyncError;

/// 应用错误枚举
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== 业务错误 ==========
    #[error(transparent)]
    /// 房间日期冲突
    Conflict(#[from] ConflictError),

    #[error("Resource not found: {0}")]
    /// 资源不存在
    NotFound(String),

    #[error("Validation failed: {0}")]
    /// 验证失败
    Validation(String),

    #[error("Portal code already in use: {0}")]
    DuplicatePortalCode(String),

    #[error(transparent)]
    Portal(#[from] PortalError),

    // ========== 系统错误 ==========
    #[error("Cache error: {0}")]
    /// 本地缓存错误
    Cache(#[from] CacheError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Internal error: {0}")]
    /// 内部错误
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(c) => AppError::Conflict(c),
            StoreError::NotFound(id) => AppError::NotFound(format!("reservation {id}")),
            StoreError::Validation(msg) => AppError::Validation(msg),
            StoreError::DuplicatePortalCode(code) => AppError::DuplicatePortalCode(code),
        }
    }
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否需要操作员处理 (而非系统故障)
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AppError::Conflict(_)
                | AppError::NotFound(_)
                | AppError::Validation(_)
                | AppError::DuplicatePortalCode(_)
                | AppError::Portal(_)
        )
    }
}
