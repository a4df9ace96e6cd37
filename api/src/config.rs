use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "docbridge",
    version,
    about = "MCP and ingestion front door for an OpenAI-style vector store"
)]
pub struct Config {
    /// API key for the upstream files / vector-store / responses API
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// Upstream API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Model used for document search
    #[arg(long, env = "DOCBRIDGE_MODEL", default_value = "gpt-4.1-mini")]
    pub model: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Skip the bearer check (for use behind an auth-injecting proxy)
    #[arg(long, env = "DOCBRIDGE_NO_AUTH")]
    pub no_auth: bool,

    /// Bearer token clients must present on /ingest, /mcp and /sse
    #[arg(long, env = "DOCBRIDGE_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Verbose logging for docbridge crates and tower-http
    #[arg(long, env = "DOCBRIDGE_DEBUG")]
    pub debug: bool,

    /// Name given to the vector store when one has to be created
    #[arg(long, env = "DOCBRIDGE_STORE_NAME", default_value = "docbridge-documents")]
    pub store_name: String,

    /// Where the store handle is persisted (default: <data dir>/docbridge/vector_store.json)
    #[arg(long, env = "DOCBRIDGE_STATE_PATH")]
    pub state_path: Option<PathBuf>,

    #[arg(long, env = "DOCBRIDGE_MAX_BODY_BYTES", default_value_t = 25 * 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Timeout for each outbound upstream call
    #[arg(long, env = "DOCBRIDGE_REQUEST_TIMEOUT_SECS", default_value_t = 20)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "DOCBRIDGE_SSE_HEARTBEAT_SECS", default_value_t = 20)]
    pub sse_heartbeat_secs: u64,

    /// Comma-separated list of allowed browser origins
    #[arg(long, env = "DOCBRIDGE_CORS_ORIGINS", default_value = "http://localhost:3000")]
    pub cors_origins: String,

    /// Return the model's raw answer when no citation could be parsed
    #[arg(
        long,
        env = "DOCBRIDGE_INCLUDE_RAW_TEXT",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub include_raw_text: bool,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("auth is enabled but no token is configured; set DOCBRIDGE_AUTH_TOKEN or pass --no-auth")]
    MissingAuthToken,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("store name must not be empty")]
    EmptyStoreName,
    #[error("OPENAI_API_KEY must not be empty")]
    EmptyApiKey,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.openai_api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        if !self.no_auth && self.required_token().is_none() {
            return Err(ConfigError::MissingAuthToken);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("request timeout"));
        }
        if self.sse_heartbeat_secs == 0 {
            return Err(ConfigError::ZeroDuration("SSE heartbeat"));
        }
        if self.store_name.trim().is_empty() {
            return Err(ConfigError::EmptyStoreName);
        }
        Ok(())
    }

    /// The token the bearer gate enforces, or `None` when the gate is off.
    pub fn required_token(&self) -> Option<&str> {
        if self.no_auth {
            return None;
        }
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(docbridge_mcp_runtime::default_state_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sse_heartbeat(&self) -> Duration {
        Duration::from_secs(self.sse_heartbeat_secs)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "docbridge=debug,docbridge_mcp_runtime=debug,tower_http=debug,info"
        } else {
            "info"
        }
    }
}
