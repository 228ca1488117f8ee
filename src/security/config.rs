//! Security Configuration
//!
//! Security-related configuration settings, read once at startup.

use serde::{Deserialize, Serialize};

use crate::security::signatures::SignatureCategory;

/// Signing secret shipped in the defaults. Startup warns while it is in use.
pub const DEFAULT_JWT_SECRET: &str = "change-this-boqmate-signing-secret-min-32-chars";

/// Extended security configuration for the security layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// JWT secret key for signing and verifying session tokens
    pub jwt_secret: String,
    /// JWT issuer
    pub jwt_issuer: String,
    /// JWT audience
    pub jwt_audience: String,
    /// JWT expiry time in seconds
    pub jwt_expiry_seconds: u64,
    /// Requests allowed per identity inside one window
    pub rate_limit_requests: u32,
    /// Sliding window length in seconds
    pub rate_limit_window_seconds: u64,
    /// Enable rate limiting
    pub rate_limit_enabled: bool,
    /// Take the client identity from the forwarding header when present.
    /// The header is client-controlled unless a trusted proxy overwrites it.
    pub trust_forwarded_header: bool,
    /// Forwarding header consulted for the client identity
    pub forwarded_header: String,
    /// CORS allowed origins
    pub cors_allowed_origins: Vec<String>,
    /// Paths that skip bearer authentication (exact match)
    pub public_routes: Vec<String>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_issuer: "BOQMate".to_string(),
            jwt_audience: "BOQMate-Users".to_string(),
            jwt_expiry_seconds: 3600,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 3600,
            rate_limit_enabled: true,
            trust_forwarded_header: true,
            forwarded_header: "x-forwarded-for".to_string(),
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            public_routes: vec![
                "/".to_string(),
                "/health".to_string(),
                "/api/categories".to_string(),
            ],
        }
    }
}

impl SecuritySettings {
    /// Check if the shipped default secret has been replaced
    pub fn has_custom_secret(&self) -> bool {
        !self.jwt_secret.is_empty() && self.jwt_secret != DEFAULT_JWT_SECRET
    }
}

/// How uploaded file content is screened after decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentScanMode {
    /// Full string validation: signatures, control characters and length cap
    #[default]
    Full,
    /// Signature table only. Binary formats (pdf, dwg) carry control bytes
    /// and routinely exceed the per-string cap.
    SignaturesOnly,
}

/// Upload policy settings for the single upload endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Path of the upload endpoint
    pub route: String,
    /// Maximum file size in bytes
    pub max_file_size: usize,
    /// Allowed lower-case file extensions
    pub allowed_extensions: Vec<String>,
    /// Content screening mode
    pub content_scan: ContentScanMode,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            route: "/api/generate-boq".to_string(),
            max_file_size: 50 * 1024 * 1024,
            allowed_extensions: ["pdf", "txt", "docx", "dwg", "dxf", "rvt", "rfa", "dgn", "skp"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            content_scan: ContentScanMode::Full,
        }
    }
}

/// Pattern validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Maximum characters in a single string value
    pub max_string_length: usize,
    /// Maximum nesting of mappings/sequences before a value is rejected
    pub max_depth: usize,
    /// Signature categories switched off (e.g. `sql_injection` for prose-heavy input)
    pub disabled_categories: Vec<SignatureCategory>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_string_length: 10_000,
            max_depth: 64,
            disabled_categories: Vec::new(),
        }
    }
}
