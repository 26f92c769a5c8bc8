//! # Destination Name Sanitizer
//!
//! Enforces the broker's naming alphabet and length on logical names.
//! AMQP destination names may use letters, digits, `.`, `_`, `:` and `-`,
//! and are limited to 255 bytes; anything else coming out of the resolver
//! must be rewritten before it reaches the wire.
//!
//! Sanitization is idempotent: a name that is already legal passes
//! through unchanged, and sanitizing twice equals sanitizing once.

use thiserror::Error;

/// Maximum destination name length in UTF-8 bytes.
pub const MAX_NAME_BYTES: usize = 255;

/// Substituted when sanitization leaves nothing usable.
pub const DEFAULT_NAME: &str = "unnamed";

/// Errors from name sanitization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// `sanitize` was handed an empty string. Callers must resolve a
    /// name before sanitizing; an empty input is a contract violation,
    /// not a malformed name.
    #[error("destination name must not be empty")]
    Empty,
}

/// Make `raw` legal under the transport naming rules.
///
/// Policy, in order: replace disallowed characters with `-`, collapse
/// runs of `-`, trim leading/trailing `.`/`-`/`_`, substitute
/// [`DEFAULT_NAME`] if nothing remains, cap at [`MAX_NAME_BYTES`] on a
/// character boundary and re-trim, substitute the default again if the
/// cap emptied the name.
///
/// # Errors
///
/// [`NamingError::Empty`] if `raw` is empty.
pub fn sanitize(raw: &str) -> Result<String, NamingError> {
    if raw.is_empty() {
        return Err(NamingError::Empty);
    }

    let replaced: String = raw
        .chars()
        .map(|c| if is_allowed(c) { c } else { '-' })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    for c in replaced.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches(is_separator);
    if trimmed.is_empty() {
        return Ok(DEFAULT_NAME.to_string());
    }

    let capped = truncate_at_boundary(trimmed, MAX_NAME_BYTES).trim_end_matches(is_separator);
    if capped.is_empty() {
        return Ok(DEFAULT_NAME.to_string());
    }

    Ok(capped.to_string())
}

/// Check a name against the same character and length rules without
/// changing it. Empty names are invalid, not an error.
#[must_use]
pub fn is_valid(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_BYTES && name.chars().all(is_allowed)
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '_' | ':' | '-')
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '-' | '_')
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a
/// character.
fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
