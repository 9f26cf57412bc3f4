//! OpenAPI document and Swagger UI page.
//!
//! The document is assembled from the `#[utoipa::path]` annotations on the
//! handlers. Its server entry depends on deployment configuration, so it is
//! filled in at startup rather than in the derive.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    Json,
};
use utoipa::openapi::server::ServerBuilder;
use utoipa::OpenApi;

use crate::{
    handlers::{DebugResponse, ErrorResponse, HealthResponse},
    license::LicenseSummary,
    manifest::Manifest,
    relay::ContactRequest,
    validator::ValidLicense,
    AppState,
};

pub const API_TITLE: &str = "License Validator API";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "License Validator API",
        description = "License validation for web components"
    ),
    paths(
        crate::handlers::validate_license,
        crate::handlers::health,
        crate::handlers::list_licenses,
        crate::handlers::debug_info,
        crate::handlers::contact,
    ),
    components(schemas(
        ValidLicense,
        Manifest,
        ErrorResponse,
        HealthResponse,
        DebugResponse,
        LicenseSummary,
        ContactRequest
    )),
    tags(
        (name = "licenses", description = "License validation and listing"),
        (name = "service", description = "Health and diagnostics"),
        (name = "contact", description = "Contact-form relay"),
    )
)]
pub struct ApiDoc;

/// Build the document with a server entry for this deployment.
///
/// The entry points at `public_url` when set, otherwise at localhost on `port`.
pub fn openapi(public_url: Option<&str>, port: u16, production: bool) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    let url = public_url
        .map(|u| u.trim_end_matches('/').to_owned())
        .unwrap_or_else(|| format!("http://localhost:{port}"));
    let description = if production { "Production" } else { "Development" };
    doc.servers = Some(vec![ServerBuilder::new()
        .url(url)
        .description(Some(description))
        .build()]);
    doc
}

/// GET /swagger.json
pub async fn openapi_json(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.openapi.as_ref().clone())
}

/// GET /api-docs: Swagger UI reading `/swagger.json`.
pub async fn swagger_ui() -> Html<String> {
    Html(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{API_TITLE}</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
  <style>.swagger-ui .topbar {{ display: none }}</style>
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({{ url: "/swagger.json", dom_id: "#swagger-ui" }});
  </script>
</body>
</html>
"##
    ))
}
