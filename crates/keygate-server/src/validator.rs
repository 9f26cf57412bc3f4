//! License validation decision procedure.
//!
//! Checks run in a fixed order and the first failure wins:
//! missing key, unknown key, expiry, then origin. Every call loads a fresh
//! table from the store and evaluates it against the current instant, so a
//! key can turn from valid to expired between two calls with no state change.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::license::{LicenseRecord, LicenseStore, LicenseTable};
use crate::manifest::{Manifest, ManifestProvider};

/// Why a validation was refused. These are ordinary outcomes, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("license key not provided")]
    MissingKey,
    #[error("invalid license")]
    UnknownKey,
    #[error("license expired")]
    Expired,
    #[error("origin not authorized")]
    OriginMismatch,
}

impl Rejection {
    /// Short machine-readable name used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::MissingKey => "missing_key",
            Rejection::UnknownKey => "unknown_key",
            Rejection::Expired => "expired",
            Rejection::OriginMismatch => "origin_mismatch",
        }
    }
}

/// Body of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(as = LicenseValidationResponse)]
pub struct ValidLicense {
    pub valid: bool,
    pub manifest: Manifest,
    pub component: String,
    pub expires_at: String,
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(ValidLicense),
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            ValidationOutcome::Rejected(r) => Some(*r),
            ValidationOutcome::Valid(_) => None,
        }
    }
}

/// Strip one leading `http://` or `https://` and one trailing `/`.
///
/// Ports, paths and letter case are compared as-is.
pub fn normalize_origin(origin: &str) -> &str {
    let rest = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .unwrap_or(origin);
    rest.strip_suffix('/').unwrap_or(rest)
}

/// Classify `(key, origin)` against a table snapshot at instant `now`.
///
/// On success returns the matching record; the caller attaches the manifest.
pub fn evaluate<'t>(
    table: &'t LicenseTable,
    key: &str,
    origin: &str,
    now: DateTime<Utc>,
) -> Result<&'t LicenseRecord, Rejection> {
    let record = table.get(key).ok_or(Rejection::UnknownKey)?;

    match record.expiry() {
        Some(expiry) if now > expiry => return Err(Rejection::Expired),
        Some(_) => {}
        None => {
            warn!(key, expires_at = %record.expires_at, "unparsable expiry; treating license as expired");
            return Err(Rejection::Expired);
        }
    }

    if !record.is_wildcard() && normalize_origin(origin) != normalize_origin(&record.origin) {
        return Err(Rejection::OriginMismatch);
    }

    Ok(record)
}

/// Validates keys against a [`LicenseStore`].
#[derive(Debug, Clone)]
pub struct Validator {
    store: LicenseStore,
    manifest: ManifestProvider,
}

impl Validator {
    pub fn new(store: LicenseStore) -> Self {
        Self {
            store,
            manifest: ManifestProvider,
        }
    }

    /// Current license table, re-read from the source.
    pub fn store_snapshot(&self) -> LicenseTable {
        self.store.snapshot()
    }

    pub fn validate(&self, key: Option<&str>, request_origin: &str) -> ValidationOutcome {
        self.validate_at(key, request_origin, Utc::now())
    }

    /// [`Validator::validate`] with an explicit evaluation instant.
    pub fn validate_at(
        &self,
        key: Option<&str>,
        request_origin: &str,
        now: DateTime<Utc>,
    ) -> ValidationOutcome {
        let key = match key {
            None | Some("") => return ValidationOutcome::Rejected(Rejection::MissingKey),
            Some(k) => k,
        };

        let table = self.store.load();
        match evaluate(&table, key, request_origin, now) {
            Ok(record) => {
                info!(key, component = %record.component, origin = request_origin, "license accepted");
                ValidationOutcome::Valid(ValidLicense {
                    valid: true,
                    manifest: self.manifest.current(),
                    component: record.component.clone(),
                    expires_at: record.expires_at.clone(),
                    origin: record.origin.clone(),
                })
            }
            Err(reason) => {
                info!(key, origin = request_origin, reason = reason.code(), "license rejected");
                ValidationOutcome::Rejected(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::LicenseSource;
    use chrono::{Duration, TimeZone};

    fn validator(json: &str) -> Validator {
        Validator::new(LicenseStore::new(LicenseSource::inline(json)))
    }

    fn pinned() -> Validator {
        validator(
            r#"{"PIN": {"component": "Widget", "expiresAt": "2099-01-01", "origin": "https://example.com/"}}"#,
        )
    }

    #[test]
    fn missing_or_empty_key() {
        let v = pinned();
        for origin in ["https://example.com", "unknown", ""] {
            assert_eq!(
                v.validate(None, origin),
                ValidationOutcome::Rejected(Rejection::MissingKey)
            );
            assert_eq!(
                v.validate(Some(""), origin),
                ValidationOutcome::Rejected(Rejection::MissingKey)
            );
        }
    }

    #[test]
    fn unknown_key() {
        let v = pinned();
        assert_eq!(
            v.validate(Some("NOPE"), "https://example.com").rejection(),
            Some(Rejection::UnknownKey)
        );
    }

    #[test]
    fn wildcard_record_accepts_any_origin() {
        let v = validator(
            r#"{"ABC123": {"component": "Widget", "expiresAt": "2099-01-01", "origin": "*"}}"#,
        );
        match v.validate(Some("ABC123"), "anything") {
            ValidationOutcome::Valid(body) => {
                assert!(body.valid);
                assert_eq!(body.component, "Widget");
                assert_eq!(body.expires_at, "2099-01-01");
                assert_eq!(body.origin, "*");
                assert_eq!(body.manifest.name, crate::manifest::COMPONENT_NAME);
            }
            other => panic!("expected valid, got {other:?}"),
        }
        assert!(v.validate(Some("ABC123"), "unknown").is_valid());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let v = validator(
            r#"{"K": {"component": "W", "expiresAt": "2030-01-01T00:00:00Z", "origin": "*"}}"#,
        );
        let t = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert!(v.validate_at(Some("K"), "x", t).is_valid());
        assert_eq!(
            v.validate_at(Some("K"), "x", t + Duration::milliseconds(1))
                .rejection(),
            Some(Rejection::Expired)
        );
    }

    #[test]
    fn past_license_is_expired() {
        let v = validator(r#"{"OLD": {"component": "W", "expiresAt": "2000-01-01", "origin": "*"}}"#);
        assert_eq!(
            v.validate(Some("OLD"), "x").rejection(),
            Some(Rejection::Expired)
        );
    }

    #[test]
    fn iso_datetime_forms_are_not_expired() {
        let v = validator(
            r#"{
                "NAIVE": {"component": "W", "expiresAt": "2099-12-31T23:59:59", "origin": "*"},
                "BASIC": {"component": "W", "expiresAt": "2099-12-31T23:59:59.000+0000", "origin": "*"},
                "ZULU": {"component": "W", "expiresAt": "2099-12-31T23:59:59Z", "origin": "*"}
            }"#,
        );
        for key in ["NAIVE", "BASIC", "ZULU"] {
            assert!(v.validate(Some(key), "x").is_valid(), "{key}");
        }
    }

    #[test]
    fn offsetless_expiry_boundary() {
        let v = validator(
            r#"{"K": {"component": "W", "expiresAt": "2030-06-01T12:00:00", "origin": "*"}}"#,
        );
        let t = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
        assert!(v.validate_at(Some("K"), "x", t).is_valid());
        assert_eq!(
            v.validate_at(Some("K"), "x", t + Duration::seconds(1))
                .rejection(),
            Some(Rejection::Expired)
        );
    }

    #[test]
    fn unparsable_expiry_is_expired() {
        let v = validator(r#"{"BAD": {"component": "W", "expiresAt": "soon", "origin": "*"}}"#);
        assert_eq!(
            v.validate(Some("BAD"), "x").rejection(),
            Some(Rejection::Expired)
        );
    }

    #[test]
    fn expiry_checked_before_origin() {
        let v = validator(
            r#"{"OLD": {"component": "W", "expiresAt": "2000-01-01", "origin": "https://example.com"}}"#,
        );
        assert_eq!(
            v.validate(Some("OLD"), "https://evil.com").rejection(),
            Some(Rejection::Expired)
        );
    }

    #[test]
    fn origin_normalisation_equivalents() {
        let v = pinned();
        for origin in [
            "example.com",
            "http://example.com",
            "https://example.com",
            "https://example.com/",
        ] {
            assert!(v.validate(Some("PIN"), origin).is_valid(), "{origin}");
        }
    }

    #[test]
    fn origin_mismatch() {
        let v = pinned();
        for origin in [
            "https://evil.com",
            "unknown",
            "https://example.com:8443",
            "https://EXAMPLE.com",
            "https://example.com/app",
        ] {
            assert_eq!(
                v.validate(Some("PIN"), origin).rejection(),
                Some(Rejection::OriginMismatch),
                "{origin}"
            );
        }
    }

    #[test]
    fn malformed_store_rejects_every_key_as_unknown() {
        let v = validator("not json at all");
        assert_eq!(
            v.validate(Some("ABC123"), "*").rejection(),
            Some(Rejection::UnknownKey)
        );
    }

    #[test]
    fn normalize_strips_once() {
        assert_eq!(normalize_origin("https://a.com/"), "a.com");
        assert_eq!(normalize_origin("http://a.com"), "a.com");
        assert_eq!(normalize_origin("a.com//"), "a.com/");
        assert_eq!(normalize_origin("ftp://a.com"), "ftp://a.com");
        assert_eq!(normalize_origin("https://http://a.com"), "http://a.com");
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(Rejection::MissingKey.to_string(), "license key not provided");
        assert_eq!(Rejection::UnknownKey.to_string(), "invalid license");
        assert_eq!(Rejection::Expired.to_string(), "license expired");
        assert_eq!(Rejection::OriginMismatch.to_string(), "origin not authorized");
    }
}
