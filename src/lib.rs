//! Wayback snapshot archiver library.
//!
//! Drives an external web-archiving tool over a worklist of Wayback Machine
//! capture URLs, stores each captured page with its capture time, and keeps a
//! ledger so interrupted runs resume where they stopped.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod archiver;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod fs_utils;
pub mod ledger;
pub mod timestamp;
pub mod user_agent;
pub mod wayback;
