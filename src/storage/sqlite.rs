//! SQLite 事件存储
//!
//! 表结构 `security_logs(id, timestamp, event_type, ip_address, user_id,
//! details, severity)`。rusqlite 是同步接口，所有调用都放在
//! `spawn_blocking` 中执行。

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::security::events::SecurityEvent;
use crate::security::identity::ClientIdentity;
use crate::storage::repository::SecurityEventRepository;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS security_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT    NOT NULL,
    event_type  TEXT    NOT NULL,
    ip_address  TEXT    NOT NULL,
    user_id     TEXT,
    details     TEXT    NOT NULL,
    severity    TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_security_logs_timestamp ON security_logs(timestamp);
CREATE INDEX IF NOT EXISTS idx_security_logs_ip_address ON security_logs(ip_address);
"#;

/// 固定宽度的 RFC3339 文本，字典序与时间序一致
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Serialization(format!("bad timestamp '{}': {}", raw, e)))
}

/// SQLite 事件存储
#[derive(Clone)]
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEventStore").finish_non_exhaustive()
    }
}

impl SqliteEventStore {
    /// 打开（或创建）数据库文件
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// 内存数据库，用于测试
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await?
    }
}

struct RawEvent {
    timestamp: String,
    event_type: String,
    ip_address: String,
    user_id: Option<String>,
    details: String,
    severity: String,
}

impl RawEvent {
    fn into_event(self) -> Result<SecurityEvent> {
        Ok(SecurityEvent {
            timestamp: decode_timestamp(&self.timestamp)?,
            event_type: self.event_type.parse()?,
            ip_address: ClientIdentity::new(self.ip_address),
            user_id: self.user_id,
            details: serde_json::from_str(&self.details)?,
            severity: self.severity.parse()?,
        })
    }
}

#[async_trait]
impl SecurityEventRepository for SqliteEventStore {
    async fn append(&self, event: &SecurityEvent) -> Result<()> {
        let timestamp = encode_timestamp(&event.timestamp);
        let event_type = event.event_type.as_str();
        let ip_address = event.ip_address.to_string();
        let user_id = event.user_id.clone();
        let details = serde_json::to_string(&event.details)?;
        let severity = event.severity.as_str();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO security_logs (timestamp, event_type, ip_address, user_id, details, severity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![timestamp, event_type, ip_address, user_id, details, severity],
            )?;
            Ok(())
        })
        .await
    }

    async fn events_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<SecurityEvent>> {
        let since = encode_timestamp(&since);
        let until = encode_timestamp(&until);

        let rows = self
            .blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, event_type, ip_address, user_id, details, severity
                     FROM security_logs
                     WHERE timestamp >= ?1 AND timestamp <= ?2
                     ORDER BY timestamp DESC, id DESC",
                )?;
                let rows = stmt
                    .query_map(params![since, until], |row| {
                        Ok(RawEvent {
                            timestamp: row.get(0)?,
                            event_type: row.get(1)?,
                            ip_address: row.get(2)?,
                            user_id: row.get(3)?,
                            details: row.get(4)?,
                            severity: row.get(5)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(RawEvent::into_event).collect()
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff = encode_timestamp(&cutoff);
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM security_logs WHERE timestamp < ?1",
                params![cutoff],
            )?;
            Ok(removed as u64)
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        self.blocking(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM security_logs", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}
