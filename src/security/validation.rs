//! Request Validation Module
//!
//! Screens strings and nested JSON structures against the malicious-content
//! signature table.
//!
//! No normalization happens before matching: no URL-decoding of bodies and no
//! Unicode canonicalization. Query parameters arrive decoded once by the
//! pipeline's query parser; percent-encoded payloads inside bodies are matched
//! as written.

use regex::RegexSetBuilder;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::Result;
use crate::security::config::{ContentScanMode, ValidationSettings};
use crate::security::signatures::{DEFAULT_SIGNATURES, Signature, SignatureCategory};

/// Why a value was judged unsafe
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    #[error("matched signature '{name}' ({category})")]
    Signature {
        name: &'static str,
        category: SignatureCategory,
    },

    #[error("contains NUL or control characters")]
    ControlCharacter,

    #[error("string too long (max: {max}, got: {got})")]
    TooLong { max: usize, got: usize },

    #[error("nesting deeper than {max}")]
    TooDeep { max: usize },
}

/// Validation result type
pub type ValidationResult<T> = std::result::Result<T, Violation>;

/// Compiled signature matcher plus the per-string limits.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    signatures: Vec<Signature>,
    matcher: regex::RegexSet,
    max_string_length: usize,
    max_depth: usize,
}

impl PatternValidator {
    /// Build from settings over the built-in signature table
    pub fn new(settings: &ValidationSettings) -> Result<Self> {
        let enabled: Vec<Signature> = DEFAULT_SIGNATURES
            .iter()
            .filter(|sig| !settings.disabled_categories.contains(&sig.category))
            .copied()
            .collect();
        Self::with_signatures(enabled, settings.max_string_length, settings.max_depth)
    }

    /// Build over an explicit signature list
    pub fn with_signatures(
        signatures: Vec<Signature>,
        max_string_length: usize,
        max_depth: usize,
    ) -> Result<Self> {
        let matcher = RegexSetBuilder::new(signatures.iter().map(|sig| sig.pattern))
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            signatures,
            matcher,
            max_string_length,
            max_depth,
        })
    }

    /// Number of active signatures
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// First signature (table order) that matches anywhere in the text
    pub fn matching_signature(&self, text: &str) -> Option<&Signature> {
        self.matcher
            .matches(text)
            .into_iter()
            .next()
            .map(|index| &self.signatures[index])
    }

    /// Validate a single string.
    ///
    /// The length cap is checked before any pattern matching so the matching
    /// cost stays bounded.
    pub fn check_str(&self, text: &str) -> ValidationResult<()> {
        self.check_length(text)?;

        if let Some(signature) = self.matching_signature(text) {
            return Err(Violation::Signature {
                name: signature.name,
                category: signature.category,
            });
        }

        if text.chars().any(is_forbidden_control) {
            return Err(Violation::ControlCharacter);
        }

        Ok(())
    }

    /// Length cap alone, counted in characters
    pub fn check_length(&self, text: &str) -> ValidationResult<()> {
        if text.len() > self.max_string_length {
            let got = text.chars().count();
            if got > self.max_string_length {
                return Err(Violation::TooLong {
                    max: self.max_string_length,
                    got,
                });
            }
        }
        Ok(())
    }

    /// Validate decoded file content in the given scan mode
    pub fn check_text(&self, text: &str, mode: ContentScanMode) -> ValidationResult<()> {
        match mode {
            ContentScanMode::Full => self.check_str(text),
            ContentScanMode::SignaturesOnly => match self.matching_signature(text) {
                Some(signature) => Err(Violation::Signature {
                    name: signature.name,
                    category: signature.category,
                }),
                None => Ok(()),
            },
        }
    }

    /// Validate a JSON value. Mappings are safe iff every key and every
    /// value is safe; sequences iff every item is. Numbers, booleans and null
    /// are always safe.
    pub fn check_value(&self, value: &Value) -> ValidationResult<()> {
        self.check_value_at(value, 0)
    }

    fn check_value_at(&self, value: &Value, depth: usize) -> ValidationResult<()> {
        match value {
            Value::String(text) => self.check_str(text),
            Value::Array(items) => {
                self.enter(depth)?;
                items
                    .iter()
                    .try_for_each(|item| self.check_value_at(item, depth + 1))
            }
            Value::Object(map) => {
                self.enter(depth)?;
                map.iter().try_for_each(|(key, item)| {
                    self.check_str(key)?;
                    self.check_value_at(item, depth + 1)
                })
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }

    fn enter(&self, depth: usize) -> ValidationResult<()> {
        if depth >= self.max_depth {
            Err(Violation::TooDeep {
                max: self.max_depth,
            })
        } else {
            Ok(())
        }
    }

    pub fn is_safe_str(&self, text: &str) -> bool {
        self.check_str(text).is_ok()
    }

    pub fn is_safe(&self, value: &Value) -> bool {
        self.check_value(value).is_ok()
    }
}

/// NUL and C0 controls other than tab, newline and carriage return
fn is_forbidden_control(c: char) -> bool {
    (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r')
}

/// Truncate to at most `max` characters for log previews
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Best-effort text decoding; invalid byte sequences are dropped.
pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\u{FFFD}', "")
}
