use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

const CONNECTOR_ORIGINS: &[&str] = &[
    "https://chatgpt.com",
    "https://chat.openai.com",
    "https://claude.ai",
];

/// Build a CORS layer from the configured origin list.
///
/// - Origins: configured list plus the hosted MCP connector origins
/// - Methods: GET, POST, OPTIONS
/// - Headers: Authorization, Content-Type
/// - Credentials: allowed
/// - Max age: 3600s
pub fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let mut origin_values: Vec<String> = configured.to_vec();

    for connector_origin in CONNECTOR_ORIGINS {
        if !origin_values
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(connector_origin))
        {
            origin_values.push((*connector_origin).to_string());
        }
    }

    let origins: Vec<HeaderValue> = origin_values
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(event = "cors_origin_ignored", origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
