//! 工具模块 - 错误类型和日志

pub mod error;
pub mod logger;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
