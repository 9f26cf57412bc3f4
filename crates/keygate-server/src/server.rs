use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    docs,
    handlers::{contact, debug_info, health, list_licenses, not_found, root, validate_license},
    license::{LicenseSource, LicenseStore, DEFAULT_LICENSES_FILE},
    relay::{FormRelay, FormRelayConfig},
    validator::Validator,
    AppState, PRODUCTION,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub licenses: LicenseSource,
    /// Deployment environment ($KEYGATE_ENV). `production` hides `/licenses`.
    pub environment: String,
    /// Public base URL advertised in the OpenAPI document ($KEYGATE_PUBLIC_URL).
    pub public_url: Option<String>,
    /// Contact-form target ($KEYGATE_FORM_URL + $KEYGATE_FORM_FIELDS).
    pub form: Option<FormRelayConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("KEYGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("KEYGATE_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            licenses: LicenseSource {
                inline: std::env::var("KEYGATE_LICENSES_JSON").ok(),
                file: std::env::var("KEYGATE_LICENSES_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_LICENSES_FILE)),
            },
            environment: std::env::var("KEYGATE_ENV").unwrap_or_else(|_| "development".into()),
            public_url: std::env::var("KEYGATE_PUBLIC_URL")
                .ok()
                .filter(|u| !u.is_empty()),
            form: form_config_from_env(),
        }
    }
}

impl ServerConfig {
    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION
    }
}

/// Read the contact-form target. Missing or invalid settings leave it unset.
fn form_config_from_env() -> Option<FormRelayConfig> {
    let url = std::env::var("KEYGATE_FORM_URL").ok().filter(|u| !u.is_empty())?;
    let Ok(fields) = std::env::var("KEYGATE_FORM_FIELDS") else {
        warn!("KEYGATE_FORM_URL is set without KEYGATE_FORM_FIELDS; contact form disabled");
        return None;
    };
    match FormRelayConfig::from_json(url, &fields) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!(error = %e, "invalid KEYGATE_FORM_FIELDS; contact form disabled");
            None
        }
    }
}

/// Assemble shared state from configuration.
pub fn build_state(cfg: &ServerConfig) -> Result<AppState> {
    let relay = cfg
        .form
        .clone()
        .map(FormRelay::new)
        .transpose()
        .context("build contact relay client")?;

    let openapi = docs::openapi(cfg.public_url.as_deref(), cfg.port, cfg.is_production());

    Ok(AppState {
        validator: Validator::new(LicenseStore::new(cfg.licenses.clone())),
        environment: cfg.environment.clone(),
        public_url: cfg.public_url.clone(),
        relay,
        openapi: Arc::new(openapi),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/validate-license", get(validate_license))
        .route("/health", get(health))
        .route("/licenses", get(list_licenses))
        .route("/debug", get(debug_info))
        .route("/contact", post(contact))
        .route("/swagger.json", get(docs::openapi_json))
        .route("/api-docs", get(docs::swagger_ui))
        .fallback(not_found)
        .with_state(state)
        .layer(build_cors())
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let state = build_state(&cfg)?;

    let license_count = state.validator.store_snapshot().len();
    info!(
        license_count,
        environment = %cfg.environment,
        contact_form = state.relay.is_some(),
        "licenses loaded"
    );

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;
    info!(%addr, docs = %format!("http://localhost:{}/api-docs", cfg.port), "keygate listening");

    axum::serve(listener, app).await.context("server error")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
}
