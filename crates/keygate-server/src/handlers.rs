use std::collections::BTreeMap;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    license::{self, LicenseSummary},
    relay::{ContactRequest, RelayError},
    validator::{Rejection, ValidLicense, ValidationOutcome},
    AppState,
};

/// Origin used when a request carries neither `Origin` nor a referrer.
pub const UNKNOWN_ORIGIN: &str = "unknown";

// ── Response bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub license_count: usize,
    pub environment: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebugResponse {
    pub message: String,
    pub environment: String,
    pub public_url: String,
    pub timestamp: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Origin extraction ────────────────────────────────────────────────────────

/// Caller origin: `Origin`, then `Referer`, then `Referrer`, then `"unknown"`.
/// Empty header values are skipped.
pub fn request_origin(headers: &HeaderMap) -> String {
    ["origin", "referer", "referrer"]
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .find(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_ORIGIN)
        .to_owned()
}

// ── Validate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
    pub key: Option<String>,
}

pub fn rejection_status(reason: Rejection) -> StatusCode {
    match reason {
        Rejection::MissingKey => StatusCode::BAD_REQUEST,
        Rejection::UnknownKey | Rejection::Expired | Rejection::OriginMismatch => {
            StatusCode::FORBIDDEN
        }
    }
}

#[utoipa::path(
    get,
    path = "/validate-license",
    params(
        ("key" = String, Query, description = "License key"),
        ("Origin" = Option<String>, Header, description = "Calling origin; falls back to Referer")
    ),
    responses(
        (status = 200, description = "License valid", body = ValidLicense),
        (status = 400, description = "Key not provided or query malformed", body = ErrorResponse),
        (status = 403, description = "License invalid, expired or origin not authorized", body = ErrorResponse)
    ),
    tag = "licenses"
)]
pub async fn validate_license(
    State(state): State<AppState>,
    params: Result<Query<ValidateParams>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let Query(params) = match params {
        Ok(p) => p,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.body_text()),
    };
    let origin = request_origin(&headers);
    match state.validator.validate(params.key.as_deref(), &origin) {
        ValidationOutcome::Valid(body) => Json(body).into_response(),
        ValidationOutcome::Rejected(reason) => error(rejection_status(reason), reason.to_string()),
    }
}

// ── Health ───────────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service status", body = HealthResponse)),
    tag = "service"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        timestamp: now_iso(),
        license_count: state.validator.store_snapshot().len(),
        environment: state.environment.clone(),
    })
}

// ── Listing ──────────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/licenses",
    responses(
        (status = 200, description = "Licenses keyed by license key, with concrete origins replaced by [HIDDEN]"),
        (status = 404, description = "Not available in production", body = ErrorResponse)
    ),
    tag = "licenses"
)]
pub async fn list_licenses(State(state): State<AppState>) -> Response {
    if state.is_production() {
        return error(StatusCode::NOT_FOUND, "endpoint not available in production");
    }
    let listing: BTreeMap<String, LicenseSummary> =
        license::listing(&state.validator.store_snapshot());
    Json(listing).into_response()
}

// ── Debug ────────────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/debug",
    responses((status = 200, description = "Runtime information", body = DebugResponse)),
    tag = "service"
)]
pub async fn debug_info(State(state): State<AppState>) -> Json<DebugResponse> {
    Json(DebugResponse {
        message: "API running".into(),
        environment: state.environment.clone(),
        public_url: state.public_url.clone().unwrap_or_else(|| "not set".into()),
        timestamp: now_iso(),
    })
}

// ── Contact ──────────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/contact",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Submission relayed"),
        (status = 400, description = "Invalid submission", body = ErrorResponse),
        (status = 502, description = "Form service failed", body = ErrorResponse),
        (status = 503, description = "Contact form not configured", body = ErrorResponse)
    ),
    tag = "contact"
)]
pub async fn contact(
    State(state): State<AppState>,
    body: Result<Json<ContactRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.body_text()),
    };
    if let Err(RelayError::Invalid(msg)) = req.check() {
        return error(StatusCode::BAD_REQUEST, msg);
    }
    let Some(relay) = state.relay.as_ref() else {
        return error(StatusCode::SERVICE_UNAVAILABLE, "contact form not configured");
    };
    match relay.submit(&req).await {
        Ok(()) => Json(serde_json::json!({"success": true})).into_response(),
        Err(RelayError::Invalid(msg)) => error(StatusCode::BAD_REQUEST, msg),
        Err(_) => error(StatusCode::BAD_GATEWAY, "could not deliver message"),
    }
}

// ── Misc ─────────────────────────────────────────────────────────────────────

pub async fn root() -> Redirect {
    Redirect::to("/api-docs")
}

pub async fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "endpoint not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn origin_header_wins() {
        let mut h = HeaderMap::new();
        h.insert("origin", HeaderValue::from_static("https://a.com"));
        h.insert("referer", HeaderValue::from_static("https://b.com/page"));
        assert_eq!(request_origin(&h), "https://a.com");
    }

    #[test]
    fn referer_then_referrer() {
        let mut h = HeaderMap::new();
        h.insert("referrer", HeaderValue::from_static("https://c.com"));
        assert_eq!(request_origin(&h), "https://c.com");
        h.insert("referer", HeaderValue::from_static("https://b.com"));
        assert_eq!(request_origin(&h), "https://b.com");
    }

    #[test]
    fn empty_headers_are_skipped() {
        let mut h = HeaderMap::new();
        h.insert("origin", HeaderValue::from_static(""));
        h.insert("referer", HeaderValue::from_static("https://b.com"));
        assert_eq!(request_origin(&h), "https://b.com");
    }

    #[test]
    fn no_headers_is_unknown() {
        assert_eq!(request_origin(&HeaderMap::new()), UNKNOWN_ORIGIN);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(rejection_status(Rejection::MissingKey), StatusCode::BAD_REQUEST);
        for r in [
            Rejection::UnknownKey,
            Rejection::Expired,
            Rejection::OriginMismatch,
        ] {
            assert_eq!(rejection_status(r), StatusCode::FORBIDDEN);
        }
    }
}
