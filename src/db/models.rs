use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One archived page, written once into the capture collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Capture URL the page was archived from.
    pub url: String,
    /// Instant encoded in the capture URL.
    pub captured_at: DateTime<Utc>,
    /// Raw page bytes. Stored as a blob, never re-encoded.
    pub content: Vec<u8>,
    /// Emulated viewport/device used for the capture.
    pub device_profile: String,
    /// Set later by the ad-change detection process.
    pub advertising_modified: bool,
    pub advertising_modified_id: Option<String>,
}

impl CaptureRecord {
    /// A fresh record, with the advertising provenance fields unset.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        captured_at: DateTime<Utc>,
        content: Vec<u8>,
        device_profile: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            captured_at,
            content,
            device_profile: device_profile.into(),
            advertising_modified: false,
            advertising_modified_id: None,
        }
    }
}

/// A capture row as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredCapture {
    pub id: i64,
    pub device: String,
    pub content: Vec<u8>,
    pub timestamp: String,
    pub is_advertising_modified: bool,
    pub advertising_id_when_modified: Option<String>,
    pub source_url: Option<String>,
    pub created_at: String,
}
