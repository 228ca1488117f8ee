use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::security::config::{SecuritySettings, UploadSettings, ValidationSettings};

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 请求超时（秒）
    pub request_timeout: u64,
    /// 最大请求体大小（字节，上传路由除外）
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            request_timeout: 30,
            max_request_size: 10 * 1024 * 1024,
        }
    }
}

/// 安全事件存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventBackend {
    /// 进程内存（开发/测试）
    Memory,
    /// SQLite 文件
    #[default]
    Sqlite,
}

/// 安全事件日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// 存储后端
    pub backend: EventBackend,
    /// SQLite 数据库路径
    pub database_path: PathBuf,
    /// 保留天数（None 表示不清理）
    pub retention_days: Option<u32>,
    /// 清理任务间隔（秒）
    pub prune_interval_seconds: u64,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            backend: EventBackend::Sqlite,
            database_path: PathBuf::from("boqmate.db"),
            retention_days: Some(30),
            prune_interval_seconds: 3600,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式（JSON）
    pub structured: bool,
    /// 日志文件目录（按天滚动）
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 安全配置
    pub security: SecuritySettings,
    /// 上传策略配置
    pub upload: UploadSettings,
    /// 输入校验配置
    pub validation: ValidationSettings,
    /// 安全事件日志配置
    pub events: EventLogConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig::default(),
            security: SecuritySettings::default(),
            upload: UploadSettings::default(),
            validation: ValidationSettings::default(),
            events: EventLogConfig {
                backend: EventBackend::Memory,
                ..EventLogConfig::default()
            },
            logging: LoggingConfig {
                level: "debug".into(),
                ..LoggingConfig::default()
            },
            app_name: "boqmate-shield".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.events.backend = EventBackend::Sqlite;
        config
    }
}
