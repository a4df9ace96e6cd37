use std::sync::Arc;

use docbridge_core::citations::extract_citations;
use docbridge_core::error::ValidationError;
use docbridge_core::search::{DEFAULT_TOP_K, JURISDICTIONS, MAX_TOP_K, MIN_TOP_K, SearchRequest};
use serde_json::{Map, Value, json};
use url::Url;

pub mod handle;
pub mod ingest;
pub mod search;
pub mod upstream;
mod util;

#[cfg(test)]
mod testing;

use handle::{HandleStore, ProvisioningError, StoreHandleCache};
use search::{SearchClient, SearchError};
use upstream::{UpstreamError, VectorStoreApi};
use util::to_pretty_json;

pub use util::default_state_path;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const JSONRPC_VERSION: &str = "2.0";
const MCP_SERVER_NAME: &str = "docbridge";
const SEARCH_TOOL_NAME: &str = "search_documents";
const RESOURCE_SCHEME: &str = "docbridge";
const RESOURCE_HOST: &str = "files";

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub model: String,
    pub store_name: String,
    /// Return the model's raw answer when no citation could be parsed from it.
    pub include_raw_text_on_empty: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            store_name: "docbridge-documents".to_string(),
            include_raw_text_on_empty: true,
        }
    }
}

/// Everything a request needs: upstream client, store handle cache and the
/// search client built on both. Cheap to clone; no per-request state.
#[derive(Clone)]
pub struct Runtime {
    api: Arc<dyn VectorStoreApi>,
    handles: Arc<StoreHandleCache>,
    search: Arc<SearchClient>,
    include_raw_text_on_empty: bool,
}

impl Runtime {
    pub fn new(
        api: Arc<dyn VectorStoreApi>,
        state: Arc<dyn HandleStore>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            handles: Arc::new(StoreHandleCache::new(
                state,
                api.clone(),
                config.store_name,
            )),
            search: Arc::new(SearchClient::new(api.clone(), config.model)),
            api,
            include_raw_text_on_empty: config.include_raw_text_on_empty,
        }
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        let id = obj.get("id").cloned();

        if let Some(version) = obj.get("jsonrpc") {
            if version.as_str() != Some(JSONRPC_VERSION) {
                return Some(error_response(
                    id.unwrap_or(Value::Null),
                    RpcError::invalid_request("jsonrpc must be '2.0' when present"),
                ));
            }
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            return Some(error_response(
                id.unwrap_or(Value::Null),
                RpcError::invalid_request("Request must include string field 'method'"),
            ));
        };

        let params = match obj.get("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params) => params.clone(),
        };

        if method.starts_with("notifications/") {
            self.handle_notification(method, id.is_some());
            return None;
        }
        let id = id.unwrap_or(Value::Null);

        let result = self.handle_request(method, params).await;
        Some(match result {
            Ok(payload) => success_response(id, payload),
            Err(err) => {
                tracing::debug!(
                    event = "mcp_request_failed",
                    method = method,
                    code = err.code,
                    message = %err.message,
                    "MCP request returned an error"
                );
                error_response(id, err)
            }
        })
    }

    fn handle_notification(&self, method: &str, had_id: bool) {
        tracing::debug!(
            event = "mcp_notification_received",
            method = method,
            had_id = had_id,
            "Notification acknowledged without a response"
        );
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => self.initialize_payload().await,
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => self.handle_resources_list().await,
            "resources/read" => self.handle_resources_read(params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn initialize_payload(&self) -> Result<Value, RpcError> {
        let handle = self.handles.get_or_create().await?;
        Ok(json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                },
                "resources": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": format!(
                "Use {SEARCH_TOOL_NAME} to answer questions from the ingested documents. \
                 Results carry citations (filename, section, snippet); quote them rather than \
                 paraphrasing. Narrow results with jurisdiction ({}) when the question is scoped.",
                JURISDICTIONS.join(", ")
            ),
            "vectorStoreId": handle.id
        }))
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        match name {
            SEARCH_TOOL_NAME => self.tool_search_documents(&args).await,
            other => Err(RpcError::method_not_found(&format!("tools/call:{other}"))),
        }
    }

    async fn tool_search_documents(&self, args: &Map<String, Value>) -> Result<Value, RpcError> {
        let request = SearchRequest::from_args(args)?;
        let handle = self.handles.get_or_create().await?;
        let output = self.search.search(&request, &handle.id).await?;
        let citations = extract_citations(&output.text);

        tracing::info!(
            event = "search_completed",
            vector_store_id = %handle.id,
            payload_shape = output.payload_shape.as_str(),
            attempts = output.attempts,
            citation_count = citations.len(),
            response_id = ?output.response_id,
            "Document search completed"
        );

        let mut envelope = json!({
            "query": request.query,
            "jurisdiction": request.jurisdiction,
            "top_k": request.top_k,
            "vector_store_id": handle.id,
            "payload_shape": output.payload_shape.as_str(),
            "attempts": output.attempts,
            "citation_count": citations.len(),
            "citations": citations,
        });
        if citations.is_empty() && self.include_raw_text_on_empty {
            envelope["raw_text"] = Value::String(output.text.clone());
        }

        Ok(json!({
            "content": [{ "type": "text", "text": to_pretty_json(&envelope) }],
            "structuredContent": envelope
        }))
    }

    async fn handle_resources_list(&self) -> Result<Value, RpcError> {
        let handle = self.handles.get_or_create().await?;
        let files = self
            .api
            .list_store_files(&handle.id)
            .await
            .map_err(|err| RpcError::upstream("Listing vector store files failed", &err))?;

        let resources: Vec<Value> = files
            .iter()
            .map(|file| {
                let name = file.attribute("filename").unwrap_or(&file.id);
                let mut description = format!(
                    "Document in vector store {} (status: {})",
                    handle.id,
                    file.status.as_deref().unwrap_or("unknown")
                );
                if let Some(jurisdiction) = file.attribute("jurisdiction") {
                    description.push_str(&format!(", jurisdiction: {jurisdiction}"));
                }
                json!({
                    "uri": resource_uri(&file.id),
                    "name": name,
                    "description": description,
                    "mimeType": "application/octet-stream"
                })
            })
            .collect();
        Ok(json!({ "resources": resources }))
    }

    async fn handle_resources_read(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("resources/read params must be an object"))?;
        let uri = params.get("uri").and_then(Value::as_str).ok_or_else(|| {
            RpcError::invalid_params("resources/read requires string field 'uri'")
        })?;
        let file_id = parse_resource_uri(uri).map_err(|e| RpcError::invalid_params(e.message))?;

        let file = self
            .api
            .retrieve_file(&file_id)
            .await
            .map_err(|err| RpcError::upstream("Retrieving file metadata failed", &err))?;

        let filename = file.filename.as_deref().unwrap_or(&file.id);
        let size = file
            .bytes
            .map(|bytes| format!("{bytes} bytes"))
            .unwrap_or_else(|| "unknown size".to_string());
        let text = format!(
            "Document '{filename}' (file id {}, {size}) is indexed for search. \
             Its binary content is not returned here; call {SEARCH_TOOL_NAME} to query it.",
            file.id
        );

        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "text/plain",
                "text": text
            }]
        }))
    }
}

/// Entry point for the HTTP transports. Returns one response per request
/// that carried an id; notifications produce nothing.
pub async fn handle_http_jsonrpc(runtime: &Runtime, incoming: Value) -> Vec<Value> {
    runtime.handle_incoming_message(incoming).await
}

pub fn resource_uri(file_id: &str) -> String {
    format!("{RESOURCE_SCHEME}://{RESOURCE_HOST}/{file_id}")
}

fn parse_resource_uri(raw: &str) -> Result<String, ValidationError> {
    let invalid = || {
        ValidationError::new(
            "uri",
            format!("expected {RESOURCE_SCHEME}://{RESOURCE_HOST}/<file id>, got '{raw}'"),
        )
    };
    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if url.scheme() != RESOURCE_SCHEME || url.host_str() != Some(RESOURCE_HOST) {
        return Err(invalid());
    }
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    match segments.as_slice() {
        [file_id] => Ok((*file_id).to_string()),
        _ => Err(invalid()),
    }
}

#[derive(Debug)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

fn tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: SEARCH_TOOL_NAME,
        description: "Search the ingested documents and return an answer with citations \
                      (filename, section/location, snippet).",
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Natural-language question to answer from the documents."
                },
                "top_k": {
                    "type": "integer",
                    "minimum": MIN_TOP_K,
                    "maximum": MAX_TOP_K,
                    "default": DEFAULT_TOP_K,
                    "description": "Maximum number of passages to retrieve."
                },
                "jurisdiction": {
                    "type": "string",
                    "enum": JURISDICTIONS,
                    "description": "Restrict sources to one jurisdiction level."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }]
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

#[derive(Debug)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
            data: None,
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    fn upstream(context: &str, err: &UpstreamError) -> Self {
        tracing::error!(
            event = "upstream_call_failed",
            status = ?err.status(),
            code = ?err.code(),
            error = %err,
            "{context}"
        );
        Self::internal(format!("{context}: {err}")).with_data(err.to_value())
    }
}

impl From<ValidationError> for RpcError {
    fn from(err: ValidationError) -> Self {
        RpcError::invalid_params(format!("Invalid arguments: {err}"))
            .with_data(json!({ "field": err.field }))
    }
}

impl From<ProvisioningError> for RpcError {
    fn from(err: ProvisioningError) -> Self {
        tracing::error!(event = "provisioning_failed", error = %err, "Store handle unavailable");
        let data = match err.upstream() {
            Some(upstream) => upstream.to_value(),
            None => json!({ "status": null, "code": null, "upstream_message": null }),
        };
        RpcError::internal(format!("Vector store unavailable: {err}")).with_data(data)
    }
}

impl From<SearchError> for RpcError {
    fn from(err: SearchError) -> Self {
        tracing::error!(
            event = "search_failed",
            status = ?err.source.status(),
            attempts = err.attempts,
            payload_shape = err.shape.as_str(),
            error = %err,
            "Document search failed"
        );
        RpcError::internal(err.to_string()).with_data(err.to_value())
    }
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeApi, rejection, runtime_with};
    use crate::upstream::{FileObject, VectorStoreFile};

    async fn call(runtime: &Runtime, request: Value) -> Value {
        let mut responses = handle_http_jsonrpc(runtime, request).await;
        assert_eq!(responses.len(), 1, "expected exactly one response");
        responses.remove(0)
    }

    #[tokio::test]
    async fn unknown_method_echoes_request_id() {
        let api = Arc::new(FakeApi::default());
        let runtime = runtime_with(api.clone());

        let response = call(
            &runtime,
            json!({ "jsonrpc": "2.0", "id": "req-7", "method": "foo/bar" }),
        )
        .await;

        assert_eq!(response["id"], "req-7");
        assert_eq!(response["error"]["code"], -32601);
        assert!(response.get("result").is_none());
        assert_eq!(api.outbound_calls(), 0);
    }

    #[tokio::test]
    async fn missing_method_is_an_invalid_request_not_unknown_method() {
        let runtime = runtime_with(Arc::new(FakeApi::default()));
        let response = call(&runtime, json!({ "jsonrpc": "2.0", "id": 3 })).await;
        assert_eq!(response["id"], 3);
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn wrong_protocol_version_is_rejected_but_absent_is_fine() {
        let runtime = runtime_with(Arc::new(FakeApi::default()));

        let response = call(&runtime, json!({ "jsonrpc": "1.0", "id": 1, "method": "ping" })).await;
        assert_eq!(response["error"]["code"], -32600);

        let response = call(&runtime, json!({ "id": 2, "method": "ping" })).await;
        assert_eq!(response["result"], json!({}));
        assert_eq!(response["jsonrpc"], "2.0");
    }

    #[tokio::test]
    async fn notifications_and_batches() {
        let runtime = runtime_with(Arc::new(FakeApi::default()));

        let none = handle_http_jsonrpc(
            &runtime,
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;
        assert!(none.is_empty());

        let batch = handle_http_jsonrpc(
            &runtime,
            json!([
                { "jsonrpc": "2.0", "id": 1, "method": "ping" },
                { "jsonrpc": "2.0", "method": "notifications/cancelled" },
                { "jsonrpc": "2.0", "method": "tools/list" }
            ]),
        )
        .await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0]["id"], 1);
        assert_eq!(batch[1]["id"], Value::Null);
        assert!(batch[1]["result"]["tools"].is_array());

        let empty = handle_http_jsonrpc(&runtime, json!([])).await;
        assert_eq!(empty[0]["error"]["code"], -32600);
        assert_eq!(empty[0]["id"], Value::Null);
    }

    #[tokio::test]
    async fn requests_without_id_are_dispatched_and_answered_with_null_id() {
        let api = Arc::new(FakeApi::default());
        api.push_response(Ok(json!({ "output_text": "no useful information found" })));
        let runtime = runtime_with(api.clone());

        let response = call(
            &runtime,
            json!({
                "method": "tools/call",
                "params": { "name": SEARCH_TOOL_NAME, "arguments": { "query": "setback" } }
            }),
        )
        .await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["result"]["structuredContent"]["query"], "setback");
        assert_eq!(api.search_calls(), 1);

        let response = call(&runtime, json!({ "method": "foo/bar" })).await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn search_timeout_is_internal_error_tagged_timeout() {
        let api = Arc::new(FakeApi::default());
        api.push_response(Err(UpstreamError::Transport {
            message: "operation timed out".to_string(),
            timed_out: true,
        }));
        let runtime = runtime_with(api.clone());

        let response = call(
            &runtime,
            json!({
                "id": 12,
                "method": "tools/call",
                "params": { "name": SEARCH_TOOL_NAME, "arguments": { "query": "height" } }
            }),
        )
        .await;

        assert_eq!(response["error"]["code"], -32603);
        assert_eq!(response["error"]["data"]["code"], "timeout");
        assert_eq!(response["error"]["data"]["status"], Value::Null);
        assert_eq!(response["error"]["data"]["attempts"], 1);
        assert_eq!(api.search_calls(), 1);
    }

    #[tokio::test]
    async fn initialize_provisions_store_and_reports_identity() {
        let api = Arc::new(FakeApi::default());
        let runtime = runtime_with(api.clone());

        let response = call(
            &runtime,
            json!({ "jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {} }),
        )
        .await;

        let result = &response["result"];
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "docbridge");
        assert_eq!(result["vectorStoreId"], "vs_1");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
        assert_eq!(api.create_calls(), 1);
    }

    #[tokio::test]
    async fn initialize_surfaces_provisioning_failure() {
        let api = Arc::new(FakeApi::default());
        api.fail_create(429, "Rate limit reached");
        let runtime = runtime_with(api);

        let response = call(&runtime, json!({ "jsonrpc": "2.0", "id": 9, "method": "initialize" })).await;
        assert_eq!(response["error"]["code"], -32603);
        assert_eq!(response["error"]["data"]["status"], 429);
        assert_eq!(response["error"]["data"]["upstream_message"], "Rate limit reached");
    }

    #[tokio::test]
    async fn tools_list_describes_search_schema() {
        let runtime = runtime_with(Arc::new(FakeApi::default()));
        let response = call(&runtime, json!({ "id": 1, "method": "tools/list" })).await;

        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], SEARCH_TOOL_NAME);
        let schema = &tools[0]["inputSchema"];
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["top_k"]["maximum"], 25);
        assert_eq!(schema["properties"]["top_k"]["default"], 6);
        assert_eq!(schema["properties"]["jurisdiction"]["enum"][0], "federal");
    }

    #[tokio::test]
    async fn missing_query_is_invalid_params_without_outbound_calls() {
        let api = Arc::new(FakeApi::default());
        let runtime = runtime_with(api.clone());

        for arguments in [json!({}), json!({ "query": "" }), json!({ "query": "   " })] {
            let response = call(
                &runtime,
                json!({
                    "jsonrpc": "2.0",
                    "id": 5,
                    "method": "tools/call",
                    "params": { "name": SEARCH_TOOL_NAME, "arguments": arguments }
                }),
            )
            .await;
            assert_eq!(response["error"]["code"], -32602);
            assert_eq!(response["error"]["data"]["field"], "query");
        }
        assert_eq!(api.search_calls(), 0);
        assert_eq!(api.outbound_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let runtime = runtime_with(Arc::new(FakeApi::default()));
        let response = call(
            &runtime,
            json!({
                "id": 4,
                "method": "tools/call",
                "params": { "name": "delete_everything", "arguments": {} }
            }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["id"], 4);
    }

    #[tokio::test]
    async fn search_tool_returns_parsed_citations() {
        let api = Arc::new(FakeApi::default());
        api.push_response(Ok(json!({
            "id": "resp_1",
            "output_text": "Setbacks are 10ft.\n```json\n[{\"file\":\"a.pdf\",\"page\":\"3\",\"text\":\"setback 10ft\"}]\n```"
        })));
        let runtime = runtime_with(api.clone());

        let response = call(
            &runtime,
            json!({
                "jsonrpc": "2.0",
                "id": "s1",
                "method": "tools/call",
                "params": {
                    "name": SEARCH_TOOL_NAME,
                    "arguments": { "query": "setback", "jurisdiction": "County", "top_k": 3 }
                }
            }),
        )
        .await;

        let structured = &response["result"]["structuredContent"];
        assert_eq!(structured["vector_store_id"], "vs_1");
        assert_eq!(structured["jurisdiction"], "county");
        assert_eq!(structured["top_k"], 3);
        assert_eq!(structured["attempts"], 1);
        assert_eq!(structured["citation_count"], 1);
        assert_eq!(
            structured["citations"][0],
            json!({ "filename": "a.pdf", "section": "3", "snippet": "setback 10ft" })
        );
        assert!(structured.get("raw_text").is_none());
        assert_eq!(response["result"]["content"][0]["type"], "text");

        let payload = &api.response_payloads()[0];
        assert!(payload["input"].as_str().unwrap().contains("county level"));
    }

    #[tokio::test]
    async fn empty_extraction_is_still_a_success_with_raw_text() {
        let api = Arc::new(FakeApi::default());
        api.push_response(Ok(json!({ "output_text": "no useful information found" })));
        let runtime = runtime_with(api);

        let response = call(
            &runtime,
            json!({
                "id": 1,
                "method": "tools/call",
                "params": { "name": SEARCH_TOOL_NAME, "arguments": { "query": "parking" } }
            }),
        )
        .await;

        let structured = &response["result"]["structuredContent"];
        assert_eq!(structured["citations"], json!([]));
        assert_eq!(structured["raw_text"], "no useful information found");
    }

    #[tokio::test]
    async fn upstream_search_failure_is_internal_error_with_detail() {
        let api = Arc::new(FakeApi::default());
        api.push_response(Err(rejection(500, Some("server_error"), "The server had an error")));
        let runtime = runtime_with(api);

        let response = call(
            &runtime,
            json!({
                "id": 8,
                "method": "tools/call",
                "params": { "name": SEARCH_TOOL_NAME, "arguments": { "query": "height" } }
            }),
        )
        .await;

        assert_eq!(response["error"]["code"], -32603);
        assert_eq!(response["error"]["data"]["status"], 500);
        assert_eq!(response["error"]["data"]["code"], "server_error");
        assert_eq!(response["error"]["data"]["attempts"], 1);
    }

    #[tokio::test]
    async fn resources_list_maps_store_files() {
        let api = Arc::new(FakeApi::default());
        api.add_store_file(VectorStoreFile {
            id: "file-9".to_string(),
            status: Some("completed".to_string()),
            usage_bytes: Some(2048),
            attributes: Some(
                json!({ "filename": "zoning.pdf", "jurisdiction": "municipal" })
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
        });
        api.add_store_file(VectorStoreFile {
            id: "file-10".to_string(),
            ..Default::default()
        });
        let runtime = runtime_with(api);

        let response = call(&runtime, json!({ "id": 2, "method": "resources/list" })).await;
        let resources = response["result"]["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0]["uri"], "docbridge://files/file-9");
        assert_eq!(resources[0]["name"], "zoning.pdf");
        assert!(
            resources[0]["description"]
                .as_str()
                .unwrap()
                .contains("jurisdiction: municipal")
        );
        assert_eq!(resources[1]["name"], "file-10");
    }

    #[tokio::test]
    async fn resources_read_validates_uri_and_never_returns_binary() {
        let api = Arc::new(FakeApi::default());
        api.add_file_object(FileObject {
            id: "file-9".to_string(),
            filename: Some("zoning.pdf".to_string()),
            bytes: Some(1234),
            ..Default::default()
        });
        let runtime = runtime_with(api.clone());

        for params in [
            json!({}),
            json!({ "uri": "https://files/file-9" }),
            json!({ "uri": "docbridge://files/" }),
            json!({ "uri": "docbridge://other/file-9" }),
            json!({ "uri": "not a uri" }),
        ] {
            let response = call(
                &runtime,
                json!({ "id": 1, "method": "resources/read", "params": params }),
            )
            .await;
            assert_eq!(response["error"]["code"], -32602, "params: {params}");
        }
        assert_eq!(api.outbound_calls(), 0);

        let response = call(
            &runtime,
            json!({
                "id": 2,
                "method": "resources/read",
                "params": { "uri": "docbridge://files/file-9" }
            }),
        )
        .await;
        let content = &response["result"]["contents"][0];
        assert_eq!(content["mimeType"], "text/plain");
        let text = content["text"].as_str().unwrap();
        assert!(text.contains("zoning.pdf"));
        assert!(text.contains("1234 bytes"));
    }

    #[test]
    fn resource_uri_round_trips_through_parser() {
        assert_eq!(parse_resource_uri(&resource_uri("file-abc")).unwrap(), "file-abc");
    }
}
