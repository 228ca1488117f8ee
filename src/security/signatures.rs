//! Malicious-content signature table.
//!
//! Each entry is matched case-insensitively as a regular expression search
//! (substring semantics), never as a full-string match. A forbidden token
//! anywhere in a long benign string trips the filter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Signature family, used for reporting and for switching families off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureCategory {
    /// Script tags, event handlers, DOM storage access
    ScriptInjection,
    /// SQL keywords in dangerous combinations, quote-comment tails
    SqlInjection,
    /// `../` and `..\` sequences
    PathTraversal,
    /// Sensitive OS paths
    SensitivePath,
    /// `eval(` / `exec(` calls
    CodeExecution,
}

impl fmt::Display for SignatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureCategory::ScriptInjection => "script_injection",
            SignatureCategory::SqlInjection => "sql_injection",
            SignatureCategory::PathTraversal => "path_traversal",
            SignatureCategory::SensitivePath => "sensitive_path",
            SignatureCategory::CodeExecution => "code_execution",
        };
        f.write_str(name)
    }
}

/// One `(name, pattern, category)` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub pattern: &'static str,
    pub category: SignatureCategory,
}

const fn sig(name: &'static str, pattern: &'static str, category: SignatureCategory) -> Signature {
    Signature {
        name,
        pattern,
        category,
    }
}

use SignatureCategory::*;

/// Built-in signature set.
pub const DEFAULT_SIGNATURES: &[Signature] = &[
    // script injection
    sig("script_tag", r"<script.*?>.*?</script>", ScriptInjection),
    sig("javascript_uri", r"javascript:", ScriptInjection),
    sig("event_handler_attribute", r"on\w+\s*=", ScriptInjection),
    sig("document_cookie", r"document\.cookie", ScriptInjection),
    sig("local_storage", r"localStorage", ScriptInjection),
    sig("session_storage", r"sessionStorage", ScriptInjection),
    // code execution
    sig("exec_call", r"exec\s*\(", CodeExecution),
    sig("eval_call", r"eval\s*\(", CodeExecution),
    // sql injection
    sig("union_select", r"union.*select", SqlInjection),
    sig("drop_table", r"drop\s+table", SqlInjection),
    sig("delete_from", r"delete\s+from", SqlInjection),
    sig("insert_into", r"insert\s+into", SqlInjection),
    sig("update_set", r"update\s+set", SqlInjection),
    sig("or_one_equals_one", r"or\s+1\s*=\s*1", SqlInjection),
    sig("or_true", r"or\s+true", SqlInjection),
    sig("and_one_equals_one", r"and\s+1\s*=\s*1", SqlInjection),
    sig("and_true", r"and\s+true", SqlInjection),
    sig("quote_dash_comment", r"';.*--", SqlInjection),
    sig("quote_hash_comment", r"';.*#", SqlInjection),
    sig("quote_block_comment_open", r"';.*/\*", SqlInjection),
    sig("quote_block_comment_close", r"';.*\*/", SqlInjection),
    sig("quote_line_comment", r"';.*//", SqlInjection),
    // quote followed by whitespace, control or Latin-1 range characters
    sig("quote_trailing_byte", r"';.*[\x00-\x20\x7f-\xff]", SqlInjection),
    // path traversal
    sig("dot_dot_slash", r"\.\./", PathTraversal),
    sig("dot_dot_backslash", r"\.\.\\", PathTraversal),
    // sensitive paths
    sig("etc_passwd", r"/etc/passwd", SensitivePath),
    sig("proc_fs", r"/proc/", SensitivePath),
    sig("sys_fs", r"/sys/", SensitivePath),
    sig("dev_fs", r"/dev/", SensitivePath),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_signature_names_are_unique() {
        let names: HashSet<_> = DEFAULT_SIGNATURES.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), DEFAULT_SIGNATURES.len());
    }

    #[test]
    fn test_every_pattern_compiles() {
        for signature in DEFAULT_SIGNATURES {
            assert!(
                regex::Regex::new(signature.pattern).is_ok(),
                "{} does not compile",
                signature.name
            );
        }
    }

    #[test]
    fn test_every_category_is_represented() {
        let categories: HashSet<_> = DEFAULT_SIGNATURES.iter().map(|s| s.category).collect();
        for category in [
            ScriptInjection,
            SqlInjection,
            PathTraversal,
            SensitivePath,
            CodeExecution,
        ] {
            assert!(categories.contains(&category), "{category} missing");
        }
    }
}
