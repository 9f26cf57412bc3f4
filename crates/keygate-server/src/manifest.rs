use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const COMPONENT_NAME: &str = "Web Component";
pub const COMPONENT_VERSION: &str = "1.0.0";
pub const COMPONENT_DESCRIPTION: &str = "License-validated web component";

/// Component metadata attached to every successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub description: String,
    /// RFC 3339 instant at which this manifest was produced.
    pub build: String,
}

/// Produces [`Manifest`]s. `build` is stamped per call, not at compile time.
#[derive(Debug, Clone, Default)]
pub struct ManifestProvider;

impl ManifestProvider {
    pub fn current(&self) -> Manifest {
        Manifest {
            name: COMPONENT_NAME.to_owned(),
            version: COMPONENT_VERSION.to_owned(),
            description: COMPONENT_DESCRIPTION.to_owned(),
            build: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn fixed_fields() {
        let m = ManifestProvider.current();
        assert_eq!(m.name, COMPONENT_NAME);
        assert_eq!(m.version, COMPONENT_VERSION);
    }

    #[test]
    fn build_is_stamped_at_call_time() {
        let before = Utc::now();
        let m = ManifestProvider.current();
        let build = DateTime::parse_from_rfc3339(&m.build).unwrap();
        // Millisecond truncation can put `build` up to 1ms before `before`.
        assert!(build.timestamp_millis() >= before.timestamp_millis());
        assert!(m.build.ends_with('Z'));
    }
}
