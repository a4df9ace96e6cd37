use std::sync::Arc;
use std::time::Duration;

use docbridge_mcp_runtime::Runtime;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Runtime,
    /// `None` disables the bearer gate.
    pub auth_token: Option<Arc<str>>,
    pub sse_heartbeat: Duration,
}
