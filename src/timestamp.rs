//! Capture timestamp extraction from Wayback capture URLs.
//!
//! A capture URL looks like `http://web.archive.org/web/20230615120000if_/https://example.com`.
//! The 14 characters following the first `/web/` segment are the capture
//! instant in `YYYYMMDDhhmmss` form, always UTC.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::constants::{CAPTURE_MARKER, TIMESTAMP_LEN};
use crate::error::ArchiveError;

static CAPTURE_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{}(?P<ts>[0-9]{{{TIMESTAMP_LEN}}})",
        regex::escape(CAPTURE_MARKER)
    ))
    .expect("capture timestamp pattern is valid")
});

/// How strictly a capture URL is validated before its timestamp is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlValidation {
    /// Marker present and followed by 14 ASCII digits.
    #[default]
    Standard,
    /// As `Standard`, and the whole URL must be exactly this many bytes long.
    /// Only meaningful for worklists generated from a single URL template.
    ExactLength(usize),
}

/// Return the 14-digit capture timestamp embedded in `url`.
///
/// # Errors
///
/// Returns [`ArchiveError::Extraction`] if the marker is missing, fewer than
/// 14 characters follow it, any of them is not a decimal digit, or the
/// length check of [`UrlValidation::ExactLength`] fails.
pub fn extract_timestamp(url: &str, validation: UrlValidation) -> Result<&str, ArchiveError> {
    let fail = |reason: String| ArchiveError::Extraction {
        url: url.to_string(),
        reason,
    };

    let Some(marker_pos) = url.find(CAPTURE_MARKER) else {
        return Err(fail(format!("marker '{CAPTURE_MARKER}' not found")));
    };

    // Anchor the match to the first marker so a later "/web/<digits>" inside
    // the original target URL cannot be picked up instead.
    let ts = CAPTURE_TIMESTAMP
        .captures_at(url, marker_pos)
        .and_then(|caps| caps.name("ts"))
        .filter(|m| m.start() == marker_pos + CAPTURE_MARKER.len())
        .map(|m| m.as_str())
        .ok_or_else(|| {
            fail(format!(
                "expected {TIMESTAMP_LEN} digits after '{CAPTURE_MARKER}'"
            ))
        })?;

    if let UrlValidation::ExactLength(expected) = validation {
        if url.len() != expected {
            return Err(fail(format!(
                "url length {} does not match expected {expected}",
                url.len()
            )));
        }
    }

    Ok(ts)
}

/// Parse a `YYYYMMDDhhmmss` string as a UTC instant.
///
/// # Errors
///
/// Returns [`ArchiveError::Extraction`] when the digits do not form a valid
/// calendar date and time (e.g. month 13).
pub fn parse_timestamp(url: &str, ts: &str) -> Result<DateTime<Utc>, ArchiveError> {
    NaiveDateTime::parse_from_str(ts, "%Y%m%d%H%M%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| ArchiveError::Extraction {
            url: url.to_string(),
            reason: format!("'{ts}' is not a valid capture time: {e}"),
        })
}

/// Extract and parse in one step.
///
/// # Errors
///
/// See [`extract_timestamp`] and [`parse_timestamp`].
pub fn capture_time(url: &str, validation: UrlValidation) -> Result<DateTime<Utc>, ArchiveError> {
    let ts = extract_timestamp(url, validation)?;
    parse_timestamp(url, ts)
}
