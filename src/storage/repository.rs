//! 安全事件仓储 trait
//!
//! 事件日志只追加；读取按时间窗口，清理按保留期。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::security::events::SecurityEvent;

/// 安全事件仓储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityEventRepository: Send + Sync {
    /// 追加一条事件
    async fn append(&self, event: &SecurityEvent) -> Result<()>;

    /// 查询 `since <= timestamp <= until` 的事件，按时间倒序
    async fn events_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SecurityEvent>>;

    /// 删除 `timestamp < cutoff` 的事件，返回删除数量
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// 事件总数
    async fn count(&self) -> Result<u64>;
}
