//! License table loading.
//!
//! Licenses are supplied wholesale as JSON, either inline (from configuration)
//! or from a local file. The table is re-read on every call so edits to the
//! source take effect on the next request. Anything that fails to parse is
//! treated as an empty table, which rejects every key.
//!
//! Table format: `{ "<key>": { "component": "...", "expiresAt": "2099-01-01", "origin": "*" } }`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

/// Origin value that authorizes every caller.
pub const WILDCARD_ORIGIN: &str = "*";
/// Shown in place of a concrete origin in the public listing.
pub const HIDDEN_ORIGIN: &str = "[HIDDEN]";
/// License file read when no inline table is configured.
pub const DEFAULT_LICENSES_FILE: &str = "licenses.local.json";

/// Mapping from license key to record.
pub type LicenseTable = HashMap<String, LicenseRecord>;

/// One issued license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    pub component: String,
    /// ISO-8601 date or RFC 3339 timestamp, kept verbatim for echoing back.
    pub expires_at: String,
    /// `*` or a single authorized origin.
    pub origin: String,
}

impl LicenseRecord {
    pub fn is_wildcard(&self) -> bool {
        self.origin == WILDCARD_ORIGIN
    }

    /// The expiry instant, or `None` if `expires_at` is not a recognised format.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        parse_expiry(&self.expires_at)
    }

    /// Listing form with the origin redacted unless it is the wildcard.
    pub fn summary(&self) -> LicenseSummary {
        LicenseSummary {
            component: self.component.clone(),
            expires_at: self.expires_at.clone(),
            origin: if self.is_wildcard() {
                WILDCARD_ORIGIN.to_owned()
            } else {
                HIDDEN_ORIGIN.to_owned()
            },
        }
    }
}

/// Redacted license entry returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSummary {
    pub component: String,
    pub expires_at: String,
    /// `*` or `[HIDDEN]`.
    pub origin: String,
}

/// Date-time layouts with an explicit offset (`+02:00` or `+0200`).
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"];
/// Offset-less date-time layouts, read as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 expiry string.
///
/// A bare `YYYY-MM-DD` date means midnight UTC, as does any date-time
/// without an offset. `Z` and numeric offsets are honoured.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(raw, f).ok())
    {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|dt| dt.and_utc())
}

/// Redact every record of a table, ordered by key.
pub fn listing(table: &LicenseTable) -> BTreeMap<String, LicenseSummary> {
    table
        .iter()
        .map(|(key, record)| (key.clone(), record.summary()))
        .collect()
}

/// Where the license table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseSource {
    /// Inline JSON table. Takes precedence over `file` when non-blank.
    pub inline: Option<String>,
    pub file: PathBuf,
}

impl Default for LicenseSource {
    fn default() -> Self {
        Self {
            inline: None,
            file: PathBuf::from(DEFAULT_LICENSES_FILE),
        }
    }
}

impl LicenseSource {
    pub fn inline(json: impl Into<String>) -> Self {
        Self {
            inline: Some(json.into()),
            ..Default::default()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            inline: None,
            file: path.into(),
        }
    }
}

/// Read-only handle over a [`LicenseSource`]. Holds no table of its own.
#[derive(Debug, Clone)]
pub struct LicenseStore {
    source: Arc<LicenseSource>,
}

impl LicenseStore {
    pub fn new(source: LicenseSource) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Load a fresh table from the configured source.
    pub fn load(&self) -> LicenseTable {
        if let Some(raw) = self.source.inline.as_deref().filter(|s| !s.trim().is_empty()) {
            return parse_table(raw, "inline");
        }
        load_file(&self.source.file)
    }

    /// Current table, for health and listing endpoints.
    pub fn snapshot(&self) -> LicenseTable {
        self.load()
    }
}

fn load_file(path: &Path) -> LicenseTable {
    if !path.exists() {
        debug!(path = %path.display(), "license file not found");
        return LicenseTable::new();
    }
    match std::fs::read_to_string(path) {
        Ok(raw) => parse_table(&raw, &path.display().to_string()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read license file; no licenses loaded");
            LicenseTable::new()
        }
    }
}

fn parse_table(raw: &str, origin: &str) -> LicenseTable {
    match serde_json::from_str::<LicenseTable>(raw) {
        Ok(table) => table,
        Err(e) => {
            warn!(source = origin, error = %e, "malformed license table; no licenses loaded");
            LicenseTable::new()
        }
    }
}
