//! Front Desk - 酒店前台预订库存与同步引擎
//!
//! # 架构概述
//!
//! - **预订** (`reservations`): 预订存储、房间不重叠约束、门户码
//! - **缓存** (`cache`): 嵌入式 redb 本地缓存 (带版本)
//! - **同步** (`sync`): 防抖调度 + 远端 upsert
//! - **会话** (`core`): 配置、[`FrontDesk`] 会话、后台任务
//!
//! # 模块结构
//!
//! ```text
//! frontdesk/src/
//! ├── core/          # 配置、会话、后台任务
//! ├── reservations/  # 区间模型、存储、门户码、视图
//! ├── cache/         # 本地缓存
//! ├── sync/          # 调度器、同步客户端、传输层
//! └── utils/         # 错误、日志
//! ```

pub mod cache;
pub mod core;
pub mod reservations;
pub mod sync;
pub mod utils;

// Re-export 公共类型
pub use cache::LocalCache;
pub use crate::core::{BackgroundTasks, Config, FrontDesk, SyncConfig, TaskKind};
pub use reservations::{
    ConflictError, ReservationDraft, ReservationStore, RoomRegistry, StaticRoomRegistry,
};
pub use sync::{MemoryTransport, RemoteSyncClient, RemoteTransport, SyncError};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境：加载 .env、创建工作目录、初始化日志
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.work_dir)?;
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
    }
    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());
    Ok(config)
}

pub fn print_banner() {
    println!(
        r#"
    ______                 __  ____            __
   / ____/________  ____  / /_/ __ \___  _____/ /__
  / /_  / ___/ __ \/ __ \/ __/ / / / _ \/ ___/ //_/
 / __/ / /  / /_/ / / / / /_/ /_/ /  __(__  ) ,<
/_/   /_/   \____/_/ /_/\__/_____/\___/____/_/|_|
    "#
    );
}
