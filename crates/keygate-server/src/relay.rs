//! Contact-form relay.
//!
//! Submissions are forwarded once, form-encoded, to a hosted form service
//! (e.g. a Google Forms `formResponse` URL). The service's own field names
//! are supplied by configuration. No retries.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

/// Contact fields accepted from callers.
pub const CONTACT_FIELDS: [&str; 3] = ["name", "email", "message"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactRequest {
    /// Reject blank name/message and emails without an `@`.
    pub fn check(&self) -> Result<(), RelayError> {
        if self.name.trim().is_empty() {
            return Err(RelayError::Invalid("name is required"));
        }
        if !self.email.contains('@') {
            return Err(RelayError::Invalid("a valid email is required"));
        }
        if self.message.trim().is_empty() {
            return Err(RelayError::Invalid("message is required"));
        }
        Ok(())
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "name" => Some(&self.name),
            "email" => Some(&self.email),
            "message" => Some(&self.message),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error("form service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("form service returned {0}")]
    Upstream(reqwest::StatusCode),
}

/// Target form and the mapping from contact fields to its field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRelayConfig {
    pub action_url: String,
    /// e.g. `{"name": "entry.1000", "email": "entry.1001", "message": "entry.1002"}`.
    pub fields: BTreeMap<String, String>,
}

impl FormRelayConfig {
    /// Parse the field map from JSON. Unknown contact fields are dropped.
    pub fn from_json(action_url: String, fields_json: &str) -> anyhow::Result<Self> {
        let mut fields: BTreeMap<String, String> = serde_json::from_str(fields_json)?;
        fields.retain(|k, _| CONTACT_FIELDS.contains(&k.as_str()));
        if fields.is_empty() {
            anyhow::bail!("form field map names none of {CONTACT_FIELDS:?}");
        }
        Ok(Self { action_url, fields })
    }
}

#[derive(Clone)]
pub struct FormRelay {
    client: reqwest::Client,
    config: FormRelayConfig,
}

impl FormRelay {
    pub fn new(config: FormRelayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }

    /// Form body: each mapped contact field under the form's own name.
    pub fn form_pairs<'a>(&'a self, req: &'a ContactRequest) -> Vec<(&'a str, &'a str)> {
        self.config
            .fields
            .iter()
            .filter_map(|(field, target)| req.field(field).map(|v| (target.as_str(), v)))
            .collect()
    }

    pub async fn submit(&self, req: &ContactRequest) -> Result<(), RelayError> {
        req.check()?;
        let resp = self
            .client
            .post(&self.config.action_url)
            .form(&self.form_pairs(req))
            .send()
            .await
            .inspect_err(|e| warn!(error = %e, "contact relay failed"))?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%status, "contact relay rejected by form service");
            return Err(RelayError::Upstream(status));
        }
        debug!("contact submission relayed");
        Ok(())
    }
}
