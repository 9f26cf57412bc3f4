pub mod docs;
pub mod handlers;
pub mod license;
pub mod manifest;
pub mod relay;
pub mod server;
pub mod validator;

use std::sync::Arc;

/// Environment name that disables the license listing.
pub const PRODUCTION: &str = "production";

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub validator: validator::Validator,
    /// Deployment environment name, e.g. `development` or `production`.
    pub environment: String,
    pub public_url: Option<String>,
    /// Contact-form relay; `None` when no form is configured.
    pub relay: Option<relay::FormRelay>,
    /// OpenAPI document, built once at startup.
    pub openapi: Arc<utoipa::openapi::OpenApi>,
}

impl AppState {
    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION
    }
}

pub use server::{build_state, router, run, ServerConfig};
