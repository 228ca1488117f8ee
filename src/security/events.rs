//! Security Event Log
//!
//! Append-only record of every security-relevant decision. The pipeline only
//! appends; the monitoring collaborator reads by trailing time window and a
//! retention job prunes by age.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::security::clock::Clock;
use crate::security::identity::ClientIdentity;
use crate::storage::repository::SecurityEventRepository;

/// Kind of security decision recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    BlockedIpAccess,
    RateLimitExceeded,
    MaliciousInput,
    MaliciousQueryParam,
    MaliciousCategories,
    RequestTooLarge,
    SuspiciousFilename,
    InvalidFileType,
    FileTooLarge,
    MaliciousFileContent,
    MalformedUpload,
    MissingAuth,
    InvalidToken,
    ExpiredToken,
    InternalError,
}

impl EventType {
    pub const ALL: [EventType; 15] = [
        EventType::BlockedIpAccess,
        EventType::RateLimitExceeded,
        EventType::MaliciousInput,
        EventType::MaliciousQueryParam,
        EventType::MaliciousCategories,
        EventType::RequestTooLarge,
        EventType::SuspiciousFilename,
        EventType::InvalidFileType,
        EventType::FileTooLarge,
        EventType::MaliciousFileContent,
        EventType::MalformedUpload,
        EventType::MissingAuth,
        EventType::InvalidToken,
        EventType::ExpiredToken,
        EventType::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BlockedIpAccess => "BLOCKED_IP_ACCESS",
            EventType::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            EventType::MaliciousInput => "MALICIOUS_INPUT",
            EventType::MaliciousQueryParam => "MALICIOUS_QUERY_PARAM",
            EventType::MaliciousCategories => "MALICIOUS_CATEGORIES",
            EventType::RequestTooLarge => "REQUEST_TOO_LARGE",
            EventType::SuspiciousFilename => "SUSPICIOUS_FILENAME",
            EventType::InvalidFileType => "INVALID_FILE_TYPE",
            EventType::FileTooLarge => "FILE_TOO_LARGE",
            EventType::MaliciousFileContent => "MALICIOUS_FILE_CONTENT",
            EventType::MalformedUpload => "MALFORMED_UPLOAD",
            EventType::MissingAuth => "MISSING_AUTH",
            EventType::InvalidToken => "INVALID_TOKEN",
            EventType::ExpiredToken => "EXPIRED_TOKEN",
            EventType::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Severity recorded when the caller does not override it
    pub fn default_severity(&self) -> Severity {
        match self {
            EventType::MissingAuth | EventType::ExpiredToken => Severity::Info,
            EventType::BlockedIpAccess
            | EventType::RateLimitExceeded
            | EventType::RequestTooLarge
            | EventType::SuspiciousFilename
            | EventType::InvalidFileType
            | EventType::FileTooLarge
            | EventType::MalformedUpload
            | EventType::InvalidToken => Severity::Warning,
            EventType::MaliciousInput
            | EventType::MaliciousQueryParam
            | EventType::MaliciousCategories
            | EventType::MaliciousFileContent => Severity::Error,
            EventType::InternalError => Severity::Critical,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::Serialization(format!("unknown event type: {}", s)))
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(AppError::Serialization(format!("unknown severity: {}", other))),
        }
    }
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub ip_address: ClientIdentity,
    pub user_id: Option<String>,
    pub details: Value,
    pub severity: Severity,
}

/// Counts over a time window, grouped for the monitoring job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub total: usize,
    pub by_event_type: BTreeMap<String, usize>,
    pub by_ip_address: BTreeMap<String, usize>,
    pub high_severity: usize,
}

impl EventSummary {
    pub fn from_events(events: &[SecurityEvent]) -> Self {
        let mut summary = EventSummary {
            total: events.len(),
            ..Default::default()
        };
        for event in events {
            *summary
                .by_event_type
                .entry(event.event_type.to_string())
                .or_default() += 1;
            *summary
                .by_ip_address
                .entry(event.ip_address.to_string())
                .or_default() += 1;
            if event.severity >= Severity::Warning {
                summary.high_severity += 1;
            }
        }
        summary
    }
}

/// Front for the event repository. Writes are best-effort: a failed append is
/// logged and swallowed so the request outcome never depends on the log store.
#[derive(Clone)]
pub struct SecurityEventLog {
    repository: Arc<dyn SecurityEventRepository>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SecurityEventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityEventLog")
            .field("repository", &"Arc<dyn SecurityEventRepository>")
            .field("clock", &self.clock)
            .finish()
    }
}

impl SecurityEventLog {
    pub fn new(repository: Arc<dyn SecurityEventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Append one event stamped with the current time
    pub async fn record(
        &self,
        event_type: EventType,
        identity: &ClientIdentity,
        user_id: Option<&str>,
        details: Value,
        severity: Severity,
    ) {
        let event = SecurityEvent {
            timestamp: self.clock.now(),
            event_type,
            ip_address: identity.clone(),
            user_id: user_id.map(str::to_string),
            details,
            severity,
        };

        match severity {
            Severity::Error | Severity::Critical => tracing::error!(
                target: "security",
                event_type = %event.event_type,
                ip = %event.ip_address,
                user_id = ?event.user_id,
                details = %event.details,
                severity = %event.severity,
                "SECURITY EVENT"
            ),
            _ => tracing::warn!(
                target: "security",
                event_type = %event.event_type,
                ip = %event.ip_address,
                user_id = ?event.user_id,
                details = %event.details,
                severity = %event.severity,
                "SECURITY EVENT"
            ),
        }

        if let Err(e) = self.repository.append(&event).await {
            tracing::error!(error = %e, event_type = %event.event_type, "failed to persist security event");
        }
    }

    /// Append one event at its type's default severity
    pub async fn record_default(
        &self,
        event_type: EventType,
        identity: &ClientIdentity,
        user_id: Option<&str>,
        details: Value,
    ) {
        self.record(
            event_type,
            identity,
            user_id,
            details,
            event_type.default_severity(),
        )
        .await
    }

    /// Events inside the trailing window, newest first
    pub async fn recent(&self, window: Duration) -> Result<Vec<SecurityEvent>> {
        let now = self.clock.now();
        self.repository.events_between(now - window, now).await
    }

    /// Grouped counts over the trailing window
    pub async fn summarize(&self, window: Duration) -> Result<EventSummary> {
        let events = self.recent(window).await?;
        Ok(EventSummary::from_events(&events))
    }

    /// Delete events with `timestamp < now - retention_days`
    pub async fn prune_older_than(&self, retention_days: u32) -> Result<u64> {
        let cutoff = self.clock.now() - Duration::days(retention_days as i64);
        let removed = self.repository.prune_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, %cutoff, "pruned security events");
        }
        Ok(removed)
    }
}
