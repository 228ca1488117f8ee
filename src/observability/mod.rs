//! 可观测性模块
//!
//! 提供管道指标（Prometheus 文本格式）、结构化日志和健康检查。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;
use crate::error::{AppError, Result};
use crate::security::pipeline::RejectionKind;

const LOG_FILE_PREFIX: &str = "boqmate-shield.log";

// ===== Pipeline Metrics =====

/// 安全管道计数器
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub requests_total: AtomicU64,
    pub admitted_total: AtomicU64,
    pub blocked_total: AtomicU64,
    pub rate_limited_total: AtomicU64,
    pub invalid_input_total: AtomicU64,
    pub upload_rejected_total: AtomicU64,
    pub unauthenticated_total: AtomicU64,
    pub internal_failure_total: AtomicU64,
}

impl PipelineMetrics {
    /// 记录进入管道的请求
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录放行
    pub fn record_admitted(&self) {
        self.admitted_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录拒绝
    pub fn record_rejection(&self, kind: &RejectionKind) {
        self.counter(kind).fetch_add(1, Ordering::SeqCst);
    }

    fn counter(&self, kind: &RejectionKind) -> &AtomicU64 {
        match kind {
            RejectionKind::Blocked => &self.blocked_total,
            RejectionKind::RateLimited { .. } => &self.rate_limited_total,
            RejectionKind::InvalidInput => &self.invalid_input_total,
            RejectionKind::UploadRejected { .. } => &self.upload_rejected_total,
            RejectionKind::Unauthenticated => &self.unauthenticated_total,
            RejectionKind::InternalFailure => &self.internal_failure_total,
        }
    }

    /// 拒绝总数
    pub fn rejected_total(&self) -> u64 {
        [
            &self.blocked_total,
            &self.rate_limited_total,
            &self.invalid_input_total,
            &self.upload_rejected_total,
            &self.unauthenticated_total,
            &self.internal_failure_total,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        format!(
            r#"# HELP boqmate_requests_total Requests entering the security pipeline
# TYPE boqmate_requests_total counter
boqmate_requests_total {}
# HELP boqmate_requests_admitted_total Requests handed to a handler
# TYPE boqmate_requests_admitted_total counter
boqmate_requests_admitted_total {}
# HELP boqmate_rejections_total Requests rejected by the security pipeline
# TYPE boqmate_rejections_total counter
boqmate_rejections_total{{category="blocked"}} {}
boqmate_rejections_total{{category="rate_limited"}} {}
boqmate_rejections_total{{category="invalid_input"}} {}
boqmate_rejections_total{{category="upload_rejected"}} {}
boqmate_rejections_total{{category="unauthenticated"}} {}
boqmate_rejections_total{{category="internal_failure"}} {}
"#,
            self.requests_total.load(Ordering::SeqCst),
            self.admitted_total.load(Ordering::SeqCst),
            self.blocked_total.load(Ordering::SeqCst),
            self.rate_limited_total.load(Ordering::SeqCst),
            self.invalid_input_total.load(Ordering::SeqCst),
            self.upload_rejected_total.load(Ordering::SeqCst),
            self.unauthenticated_total.load(Ordering::SeqCst),
            self.internal_failure_total.load(Ordering::SeqCst),
        )
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub blocked_identities: usize,
}

// ===== Structured Logging =====

/// 初始化日志
///
/// `RUST_LOG` 优先于配置的级别。配置了 `log_dir` 时按天滚动写入文件，
/// 返回的 guard 必须在进程生命周期内持有。
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    let Some(dir) = &config.log_dir else {
        let result = if config.structured {
            registry.with(fmt::layer().json().with_target(true)).try_init()
        } else {
            registry
                .with(fmt::layer().with_target(true).with_line_number(true))
                .try_init()
        };
        result.map_err(|e| AppError::Config(format!("failed to init tracing: {}", e)))?;
        return Ok(None);
    };

    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let result = if config.structured {
        registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init()
    };
    result.map_err(|e| AppError::Config(format!("failed to init tracing: {}", e)))?;

    Ok(Some(guard))
}
