//! Upload Policy Module
//!
//! Screens the single upload endpoint: filename sanitization, extension
//! allow-list, size ceiling and content scan, in that order.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::security::config::{ContentScanMode, UploadSettings};
use crate::security::validation::{PatternValidator, Violation, decode_lossy};

/// Longest filename kept after sanitization, in characters
pub const MAX_FILENAME_CHARS: usize = 255;

const TRAVERSAL_SEQUENCES: [&str; 2] = ["../", "..\\"];
const ILLEGAL_FILENAME_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

/// Why an upload was refused
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadViolation {
    #[error("invalid file type: {extension:?}")]
    InvalidFileType { extension: Option<String> },

    #[error("file too large ({size} bytes, max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("content validation failed: {0}")]
    MaliciousContent(Violation),
}

/// Filename after sanitization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedFilename {
    pub name: String,
    /// True when sanitization altered the submitted name
    pub changed: bool,
}

/// Upload that passed every check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedUpload {
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub renamed: bool,
}

/// Strip traversal sequences and illegal characters, then truncate.
///
/// Traversal removal repeats until nothing changes, so inputs such as
/// `....//` cannot reassemble a `../` after one pass.
pub fn sanitize_filename(filename: &str) -> SanitizedFilename {
    let mut name = filename.to_string();
    loop {
        let stripped = TRAVERSAL_SEQUENCES
            .iter()
            .fold(name.clone(), |acc, seq| acc.replace(*seq, ""));
        if stripped == name {
            break;
        }
        name = stripped;
    }

    let name: String = name
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c) && !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();

    SanitizedFilename {
        changed: name != filename,
        name,
    }
}

/// Lower-cased suffix after the final dot. A name without a dot has none.
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Size, type and content rules for the upload endpoint
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: u64,
    allowed_extensions: HashSet<String>,
    content_scan: ContentScanMode,
    validator: Arc<PatternValidator>,
}

impl UploadPolicy {
    pub fn new(
        max_file_size: u64,
        allowed_extensions: impl IntoIterator<Item = impl Into<String>>,
        content_scan: ContentScanMode,
        validator: Arc<PatternValidator>,
    ) -> Self {
        Self {
            max_file_size,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.into().to_ascii_lowercase())
                .collect(),
            content_scan,
            validator,
        }
    }

    pub fn from_settings(settings: &UploadSettings, validator: Arc<PatternValidator>) -> Self {
        Self::new(
            settings.max_file_size as u64,
            settings.allowed_extensions.iter().cloned(),
            settings.content_scan,
            validator,
        )
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.allowed_extensions.contains(extension)
    }

    /// Sanitize, then run the remaining checks on the sanitized name
    pub fn check(
        &self,
        filename: &str,
        size: u64,
        content: &[u8],
    ) -> Result<CheckedUpload, UploadViolation> {
        let sanitized = sanitize_filename(filename);
        let mut checked = self.check_sanitized(&sanitized.name, size, content)?;
        checked.renamed = sanitized.changed;
        Ok(checked)
    }

    /// Extension, size and content checks against an already sanitized name
    pub fn check_sanitized(
        &self,
        filename: &str,
        size: u64,
        content: &[u8],
    ) -> Result<CheckedUpload, UploadViolation> {
        let extension = match file_extension(filename) {
            Some(ext) if self.is_allowed_extension(&ext) => ext,
            other => return Err(UploadViolation::InvalidFileType { extension: other }),
        };

        self.check_size(size)?;

        let text = decode_lossy(content);
        self.validator
            .check_text(&text, self.content_scan)
            .map_err(UploadViolation::MaliciousContent)?;

        Ok(CheckedUpload {
            filename: filename.to_string(),
            extension,
            size,
            renamed: false,
        })
    }

    pub fn check_size(&self, size: u64) -> Result<(), UploadViolation> {
        if size > self.max_file_size {
            return Err(UploadViolation::TooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }
}
