//! Security Module
//!
//! Request-defense pipeline for the BOQMate API:
//! - Client identity resolution
//! - Block list and sliding-window rate limiting
//! - Malicious-content signature validation
//! - Upload policy
//! - Bearer token authentication
//! - Security event log

pub mod auth;
pub mod clock;
pub mod config;
pub mod events;
pub mod identity;
pub mod middleware;
pub mod pipeline;
pub mod rate_limit;
pub mod signatures;
pub mod upload;
pub mod validation;


pub use auth::{AuthenticatedSubject, Claims, TokenAuthenticator, TokenError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ContentScanMode, SecuritySettings, UploadSettings, ValidationSettings};
pub use events::{EventSummary, EventType, SecurityEvent, SecurityEventLog, Severity};
pub use identity::{ClientIdentity, IdentityResolver};
pub use pipeline::{Rejection, RejectionKind, ScreenedUpload, SecurityPipeline, Stage};
pub use rate_limit::{BlockList, RateLimitConfig, RateLimitResult, RateLimiter};
pub use upload::{UploadPolicy, UploadViolation};
pub use validation::{PatternValidator, Violation};
