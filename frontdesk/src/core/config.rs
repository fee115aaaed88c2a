use std::path::PathBuf;
use std::time::Duration;

use crate::reservations::DEFAULT_REF_PREFIX;

/// 同步配置 - 远端复制相关参数
///
/// 测试中可直接构造，无需环境变量。
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 远端 REST 服务地址，未设置时整个会话离线运行
    pub base_url: Option<String>,
    /// 同时作为 `apikey` 头和 Bearer 令牌发送
    pub api_key: Option<String>,
    /// 防抖窗口
    pub debounce: Duration,
    /// 每个 upsert 请求的最大行数
    pub batch_size: usize,
    /// 每个分块的最大尝试次数
    pub max_attempts: u32,
    /// 首次重试延迟 (指数退避)
    pub retry_delay: Duration,
    /// HTTP 请求超时
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            debounce: Duration::from_millis(800),
            batch_size: 50,
            max_attempts: 3,
            retry_delay: Duration::from_millis(2000),
            request_timeout: Duration::from_millis(30_000),
        }
    }
}

impl SyncConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_opt("SYNC_BASE_URL"),
            api_key: env_opt("SYNC_API_KEY"),
            debounce: env_parse("SYNC_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            batch_size: env_parse("SYNC_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
            max_attempts: env_parse("SYNC_MAX_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            retry_delay: env_parse("SYNC_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            request_timeout: env_parse("SYNC_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

/// 前台配置 - 会话的所有配置项
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./frontdesk-data | 工作目录 (缓存数据库、房间文件) |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | - | 日志目录 (按天滚动) |
/// | ENVIRONMENT | development | 运行环境 |
/// | SYNC_BASE_URL | - | 远端 REST 地址，未设置则离线 |
/// | SYNC_API_KEY | - | 远端 API key |
/// | SYNC_DEBOUNCE_MS | 800 | 防抖窗口(毫秒) |
/// | SYNC_BATCH_SIZE | 50 | 每请求最大行数 |
/// | SYNC_MAX_ATTEMPTS | 3 | 每分块最大尝试次数 |
/// | SYNC_RETRY_DELAY_MS | 2000 | 首次重试延迟(毫秒) |
/// | SYNC_TIMEOUT_MS | 30000 | 请求超时(毫秒) |
/// | BOOKING_REF_PREFIX | RES- | 预订号前缀 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/hotel SYNC_BASE_URL=https://db.example.com cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// 运行环境: development | production
    pub environment: String,
    /// 预订号前缀
    pub booking_ref_prefix: String,
    pub sync: SyncConfig,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./frontdesk-data".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: env_opt("LOG_DIR"),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            booking_ref_prefix: std::env::var("BOOKING_REF_PREFIX")
                .unwrap_or_else(|_| DEFAULT_REF_PREFIX.into()),
            sync: SyncConfig::from_env(),
        }
    }

    /// 使用指定工作目录，其余取默认值 (离线)
    ///
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            log_level: "info".into(),
            log_dir: None,
            environment: "development".into(),
            booking_ref_prefix: DEFAULT_REF_PREFIX.into(),
            sync: SyncConfig::default(),
        }
    }

    /// 缓存数据库路径
    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("frontdesk.redb")
    }

    /// 房间注册表文件路径 (JSON 数组)
    pub fn rooms_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("rooms.json")
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
