#![forbid(unsafe_code)]

//! Helpers for quoting attacker-controlled text in errors and logs.
//!
//! Values taken from a document (IDs, URIs, algorithm names) end up in
//! error messages and audit logs. They are escaped so a log viewer never
//! sees live markup, and truncated so a hostile document cannot flood
//! the log.

use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Maximum number of characters of a quoted value.
pub const MAX_QUOTED_CHARS: usize = 64;

/// Escape and truncate a document-derived value for inclusion in a message.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len().min(MAX_QUOTED_CHARS) + 2);
    out.push('"');
    let mut count = 0usize;
    for ch in value.chars() {
        if count == MAX_QUOTED_CHARS {
            out.push_str("...");
            break;
        }
        match ch {
            '<' => out.push_str("\\x3c"),
            '>' => out.push_str("\\x3e"),
            '&' => out.push_str("\\x26"),
            '"' => out.push_str("\\x22"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
        count += 1;
    }
    out.push('"');
    out
}

/// Short SHA-256 fingerprint of the raw input, for correlating audit log
/// lines with a rejected document without logging the document.
pub fn input_digest(raw: &[u8]) -> String {
    let hash = Sha256::digest(raw);
    let mut out = String::with_capacity(16);
    for byte in &hash[..8] {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_markup() {
        assert_eq!(quote("<a href=\"x\">"), "\"\\x3ca href=\\x22x\\x22\\x3e\"");
        assert_eq!(quote("a\nb"), "\"a\\u{a}b\"");
    }

    #[test]
    fn test_quote_truncates() {
        let long = "x".repeat(500);
        let quoted = quote(&long);
        assert!(quoted.ends_with("...\""));
        assert_eq!(quoted.len(), MAX_QUOTED_CHARS + 5);
    }

    #[test]
    fn test_input_digest() {
        // First 8 bytes of SHA-256("hello")
        assert_eq!(input_digest(b"hello"), "2cf24dba5fb0a30e");
    }
}
