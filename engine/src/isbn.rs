//! ISBN normalization and shape validation.
//!
//! Accepts ISBN-10 and ISBN-13 by shape only: digits with an optional
//! uppercase `X` check character, and the `978`/`979` prefix for the
//! 13-digit form. Checksum verification is deliberately not performed,
//! matching what lookup providers accept.

use crate::{Error, Result};

/// Strip spaces and hyphens.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Shape check on the normalized form.
pub fn is_valid(raw: &str) -> bool {
    let normalized = normalize(raw);
    let bytes = normalized.as_bytes();
    match bytes.len() {
        10 => bytes[..9].iter().all(u8::is_ascii_digit) && is_check_char(bytes[9]),
        13 => {
            (bytes.starts_with(b"978") || bytes.starts_with(b"979"))
                && bytes[3..12].iter().all(u8::is_ascii_digit)
                && is_check_char(bytes[12])
        }
        _ => false,
    }
}

/// Normalize and validate in one step, for callers that persist the
/// cleaned form.
pub fn checked(raw: &str) -> Result<String> {
    let normalized = normalize(raw);
    if is_valid(&normalized) {
        Ok(normalized)
    } else {
        Err(Error::InvalidIsbn(raw.to_string()))
    }
}

fn is_check_char(byte: u8) -> bool {
    byte.is_ascii_digit() || byte == b'X'
}
