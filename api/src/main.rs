use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use docbridge_mcp_runtime::handle::FileHandleStore;
use docbridge_mcp_runtime::upstream::{OpenAiClient, UpstreamError};
use docbridge_mcp_runtime::{Runtime, RuntimeConfig};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

mod auth;
mod config;
mod error;
mod middleware;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use config::{Config, ConfigError};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "docbridge API",
        version = "0.1.0",
        description = "Document ingestion and MCP search front door for an OpenAI-style vector store. \
                       JSON-RPC traffic goes to POST /mcp (or POST /sse) and is not described here."
    ),
    paths(routes::health::health_check, routes::ingest::ingest_document,),
    components(schemas(
        HealthResponse,
        routes::ingest::IngestResponse,
        routes::ingest::IngestForm,
        docbridge_core::error::ApiError,
        docbridge_core::citations::Citation,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not build upstream client: {0}")]
    Client(#[from] UpstreamError),
    #[error("invalid listen address {0}")]
    Address(String),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();
    let config = Config::parse();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    if let Err(err) = run(config).await {
        tracing::error!(event = "startup_failed", error = %err, "docbridge exited with an error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    config.validate()?;

    let api = OpenAiClient::new(
        &config.openai_base_url,
        config.openai_api_key.clone(),
        config.request_timeout(),
    )?;
    let handle_store = Arc::new(FileHandleStore::new(config.state_path()));
    let state_path = handle_store.path().display().to_string();
    let runtime = Runtime::new(
        Arc::new(api),
        handle_store,
        RuntimeConfig {
            model: config.model.clone(),
            store_name: config.store_name.clone(),
            include_raw_text_on_empty: config.include_raw_text,
        },
    );

    let app_state = state::AppState {
        runtime,
        auth_token: config.required_token().map(Arc::from),
        sse_heartbeat: config.sse_heartbeat(),
    };
    if app_state.auth_token.is_none() {
        tracing::warn!(
            event = "auth_disabled",
            "Bearer auth is disabled; every endpoint is open"
        );
    }

    let app = routes::build(app_state, config.max_body_bytes)
        .layer(middleware::cors::build_cors_layer(&config.cors_origins()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| StartupError::Address(format!("{}:{}", config.host, config.port)))?;

    tracing::info!(
        event = "server_started",
        addr = %addr,
        upstream = %config.openai_base_url,
        model = %config.model,
        state_path = %state_path,
        "docbridge listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
