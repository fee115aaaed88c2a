//! 核心模块 - 配置、会话状态和后台任务
//!
//! - [`Config`] - 会话配置
//! - [`FrontDesk`] - 前台会话
//! - [`BackgroundTasks`] - 后台任务管理

pub mod config;
pub mod state;
pub mod tasks;

pub use config::{Config, SyncConfig};
pub use state::FrontDesk;
pub use tasks::{BackgroundTasks, TaskKind};
