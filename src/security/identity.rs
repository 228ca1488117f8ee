//! Client identity resolution.
//!
//! The identity keys rate limiting and blocking. When forwarding-header trust
//! is on, the first `X-Forwarded-For` entry wins with no further checks, so a
//! client that reaches the service directly can pick its own identity.

use axum::http::{HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::security::config::SecuritySettings;

/// Identity used when neither the header nor the transport peer is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Opaque client address string.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Derives the effective client address from proxy headers or the peer.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    forwarded_header: Option<HeaderName>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::trusting(HeaderName::from_static("x-forwarded-for"))
    }
}

impl IdentityResolver {
    /// Resolver that honours the given forwarding header
    pub fn trusting(header: HeaderName) -> Self {
        Self {
            forwarded_header: Some(header),
        }
    }

    /// Resolver that only uses the transport peer
    pub fn peer_only() -> Self {
        Self {
            forwarded_header: None,
        }
    }

    /// Create from security settings. An unparsable header name falls back to
    /// `x-forwarded-for`.
    pub fn from_settings(settings: &SecuritySettings) -> Self {
        if !settings.trust_forwarded_header {
            return Self::peer_only();
        }
        match HeaderName::try_from(settings.forwarded_header.as_str()) {
            Ok(header) => Self::trusting(header),
            Err(_) => {
                tracing::warn!(
                    header = %settings.forwarded_header,
                    "invalid forwarded header name, using x-forwarded-for"
                );
                Self::default()
            }
        }
    }

    /// Resolve the identity for a request.
    ///
    /// First comma-separated entry of the forwarding header, trimmed; an empty
    /// entry falls through to the peer IP.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientIdentity {
        if let Some(header) = &self.forwarded_header {
            if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
                let first = value.split(',').next().unwrap_or(value).trim();
                if !first.is_empty() {
                    return ClientIdentity::new(first);
                }
            }
        }

        match peer {
            Some(addr) => ClientIdentity::new(addr.ip().to_string()),
            None => ClientIdentity::new(UNKNOWN_CLIENT),
        }
    }
}
