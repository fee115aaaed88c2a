//! Unified Result Types

use super::AppError;

/// Application-level Result type
///
/// Returned by every `FrontDesk` operation
pub type AppResult<T> = Result<T, AppError>;
