//! Shared constants used across the application.

/// User agent string used for CDX discovery requests and as the fallback for
/// the external archiving tool.
pub const ARCHIVAL_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Path segment that precedes the capture timestamp in a Wayback capture URL.
pub const CAPTURE_MARKER: &str = "/web/";

/// Width of a capture timestamp (`YYYYMMDDhhmmss`).
pub const TIMESTAMP_LEN: usize = 14;

/// Directory under the archive root where the external tool writes artifacts.
pub const ARTIFACT_SUBDIR: &str = "archive";

/// Consolidated HTML file produced by the external tool for each artifact.
pub const ARTIFACT_HTML_FILE: &str = "singlefile.html";

/// Substring the external tool prints when its embedded index database is
/// held by another writer. Matched case-insensitively.
pub const STORE_LOCKED_MARKER: &str = "database is locked";

/// Embedded index database maintained by the external tool in the archive root.
pub const TOOL_INDEX_DB: &str = "index.sqlite3";

/// Device descriptor written on every capture record unless overridden.
pub const DEFAULT_DEVICE_PROFILE: &str = "--window-size=1280,720";

/// Host used to build capture URLs from CDX rows.
pub const WAYBACK_WEB_BASE: &str = "http://web.archive.org/web";
