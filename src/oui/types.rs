use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on stored vendor names, in characters.
pub const MAX_VENDOR_NAME_LEN: usize = 255;
/// Upper bound on stored registrant addresses, in characters.
pub const MAX_VENDOR_ADDRESS_LEN: usize = 500;

/// One registry assignment as persisted in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRecord {
    /// Canonical `XX-XX-XX` form.
    pub prefix: String,
    /// Same prefix without separators, `XXXXXX`.
    pub prefix_hex: String,
    pub vendor_name: String,
    pub vendor_address: String,
}

impl VendorRecord {
    /// Builds a record, deriving `prefix_hex` from `prefix` when not supplied
    /// and clamping the free-text fields to their storage bounds.
    pub fn new(
        prefix: &str,
        prefix_hex: Option<&str>,
        vendor_name: &str,
        vendor_address: &str,
    ) -> Self {
        let prefix = prefix.to_uppercase();
        let prefix_hex = match prefix_hex {
            Some(hex) => hex.to_uppercase(),
            None => prefix.replace('-', ""),
        };
        Self {
            prefix,
            prefix_hex,
            vendor_name: truncate_chars(vendor_name, MAX_VENDOR_NAME_LEN),
            vendor_address: truncate_chars(vendor_address, MAX_VENDOR_ADDRESS_LEN),
        }
    }

    pub fn into_info(self, mac_queried: Option<String>) -> VendorInfo {
        VendorInfo {
            oui: self.prefix,
            oui_hex: self.prefix_hex,
            vendor: self.vendor_name,
            address: self.vendor_address,
            mac_queried,
        }
    }
}

/// Vendor details returned to lookup and search callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorInfo {
    pub oui: String,
    pub oui_hex: String,
    pub vendor: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mac_queried: Option<String>,
}

/// Outcome of a single entry in a batch lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Found,
    NotFound,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub mac: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vendor: Option<VendorInfo>,
}

/// Snapshot of the cache state for operators.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_records: usize,
    /// Record count handed to the last successful refresh.
    pub last_refresh_records: Option<usize>,
    pub last_update: Option<DateTime<Utc>>,
    pub cache_age_days: Option<i64>,
    pub needs_update: bool,
    pub database_size_mb: f64,
    pub database_path: String,
}

/// Result of one pass through the refresh orchestrator.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The store now holds a new generation of `records` rows.
    Refreshed { records: usize },
    NotNeeded,
    /// Nothing was written; the previous generation is still served.
    Failed(RefreshFailure),
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::Refreshed { .. } => "refreshed",
            RefreshOutcome::NotNeeded => "not_needed",
            RefreshOutcome::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshOutcome::Refreshed { records } => write!(f, "refreshed ({} records)", records),
            RefreshOutcome::NotNeeded => write!(f, "cache is fresh"),
            RefreshOutcome::Failed(reason) => write!(f, "refresh failed: {}", reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum RefreshFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("registry contained no usable records")]
    NoRecords,
}

/// Why a single mirror was rejected.
#[derive(Debug, Clone)]
pub struct MirrorFailure {
    pub url: String,
    pub reason: String,
}

fn format_mirror_failures(failures: &[MirrorFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.url, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("declared content length {declared} is below the {minimum} byte minimum")]
    TooSmall { declared: u64, minimum: u64 },
    #[error("response body exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("response is not an OUI registry")]
    InvalidContent,
    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
    #[error("no registry mirrors configured")]
    NoMirrors,
    #[error("all {} mirrors failed: {}", .0.len(), format_mirror_failures(.0))]
    AllMirrorsFailed(Vec<MirrorFailure>),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid timestamp in cache metadata: {0}")]
    InvalidTimestamp(String),
    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid input: {0}")]
    Validation(String),
}

/// Truncates to at most `max` characters without splitting a character.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
