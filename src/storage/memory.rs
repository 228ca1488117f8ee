//! 内存事件存储
//!
//! 用于开发和测试，进程退出后数据丢失。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::security::events::SecurityEvent;
use crate::storage::repository::SecurityEventRepository;

/// 内存事件存储
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<SecurityEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部事件（按写入顺序）
    pub async fn snapshot(&self) -> Vec<SecurityEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl SecurityEventRepository for MemoryEventStore {
    async fn append(&self, event: &SecurityEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn events_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SecurityEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<SecurityEvent> = events
            .iter()
            .filter(|e| e.timestamp >= since && e.timestamp <= until)
            .cloned()
            .collect();
        // 稳定排序，同一时刻的事件后写入的在前
        matched.reverse();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok((before - events.len()) as u64)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.events.read().await.len() as u64)
    }
}
