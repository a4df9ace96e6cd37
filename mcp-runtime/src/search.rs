use std::sync::Arc;

use docbridge_core::search::SearchRequest;
use serde_json::{Value, json};

use crate::upstream::{Detection, RejectionReason, UpstreamError, VectorStoreApi};

/// How the store reference is attached to the `file_search` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Store bound through top-level `tool_resources`.
    ResourceBinding,
    /// Store ids declared inline on the tool.
    InlineToolIds,
}

impl PayloadShape {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadShape::ResourceBinding => "resource_binding",
            PayloadShape::InlineToolIds => "inline_tool_ids",
        }
    }

    fn alternate(self) -> Self {
        match self {
            PayloadShape::ResourceBinding => PayloadShape::InlineToolIds,
            PayloadShape::InlineToolIds => PayloadShape::ResourceBinding,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSearchOutput {
    pub text: String,
    pub response_id: Option<String>,
    pub payload_shape: PayloadShape,
    pub attempts: u8,
}

#[derive(Debug, thiserror::Error)]
#[error("search failed after {attempts} attempt(s) using {} payload: {source}", .shape.as_str())]
pub struct SearchError {
    pub shape: PayloadShape,
    pub attempts: u8,
    #[source]
    pub source: UpstreamError,
}

impl SearchError {
    pub fn to_value(&self) -> Value {
        let mut detail = self.source.to_value();
        detail["attempts"] = json!(self.attempts);
        detail["payload_shape"] = json!(self.shape.as_str());
        detail
    }
}

pub struct SearchClient {
    api: Arc<dyn VectorStoreApi>,
    model: String,
}

impl SearchClient {
    pub fn new(api: Arc<dyn VectorStoreApi>, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
        }
    }

    /// Run one search, switching payload shape at most once.
    pub async fn search(
        &self,
        request: &SearchRequest,
        store_id: &str,
    ) -> Result<RawSearchOutput, SearchError> {
        let instruction = build_instruction(request);
        let primary = PayloadShape::ResourceBinding;

        let first = self
            .api
            .create_response(build_payload(primary, &self.model, &instruction, request, store_id))
            .await;

        let (body, shape, attempts) = match first {
            Ok(body) => (body, primary, 1),
            Err(err) => {
                let RejectionReason::UnsupportedParameter { param, detected_by } =
                    err.reason().clone()
                else {
                    return Err(SearchError {
                        shape: primary,
                        attempts: 1,
                        source: err,
                    });
                };
                let fallback = primary.alternate();
                if detected_by == Detection::MessageHeuristic {
                    tracing::warn!(
                        event = "search_fallback_heuristic",
                        status = ?err.status(),
                        upstream_message = %err.upstream_message(),
                        "Upstream rejection carried no machine-readable code; matched on message text"
                    );
                }
                tracing::warn!(
                    event = "search_payload_fallback",
                    from = primary.as_str(),
                    to = fallback.as_str(),
                    param = ?param,
                    "Upstream rejected payload shape; retrying once with alternate shape"
                );

                let body = self
                    .api
                    .create_response(build_payload(
                        fallback,
                        &self.model,
                        &instruction,
                        request,
                        store_id,
                    ))
                    .await
                    .map_err(|source| SearchError {
                        shape: fallback,
                        attempts: 2,
                        source,
                    })?;
                (body, fallback, 2)
            }
        };

        Ok(RawSearchOutput {
            text: extract_output_text(&body),
            response_id: body.get("id").and_then(Value::as_str).map(ToOwned::to_owned),
            payload_shape: shape,
            attempts,
        })
    }
}

pub fn build_instruction(request: &SearchRequest) -> String {
    let mut instruction = format!(
        "Search the attached documents to answer the following question.\nQuestion: {}\n",
        request.query
    );
    if let Some(jurisdiction) = &request.jurisdiction {
        instruction.push_str(&format!(
            "Only use sources that apply at the {jurisdiction} level; ignore documents from other jurisdictions.\n"
        ));
    }
    instruction.push_str(&format!(
        "Answer briefly, then list up to {} citations as a JSON array inside a ```json fenced block. \
         Each element must have \"filename\" (the document name), \"section\" (section, article or page \
         where the passage appears) and \"snippet\" (a short verbatim excerpt). \
         If nothing relevant is found, return an empty array.",
        request.top_k
    ));
    instruction
}

pub fn build_payload(
    shape: PayloadShape,
    model: &str,
    instruction: &str,
    request: &SearchRequest,
    store_id: &str,
) -> Value {
    match shape {
        PayloadShape::ResourceBinding => json!({
            "model": model,
            "input": instruction,
            "tools": [{
                "type": "file_search",
                "max_num_results": request.top_k
            }],
            "tool_resources": {
                "file_search": { "vector_store_ids": [store_id] }
            }
        }),
        PayloadShape::InlineToolIds => json!({
            "model": model,
            "input": instruction,
            "tools": [{
                "type": "file_search",
                "vector_store_ids": [store_id],
                "max_num_results": request.top_k
            }]
        }),
    }
}

/// Consolidated `output_text` when present, otherwise every text part of the
/// structured output in order.
pub fn extract_output_text(body: &Value) -> String {
    if let Some(text) = body
        .get("output_text")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
    {
        return text.trim().to_string();
    }

    let parts: Vec<&str> = body
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    parts.join("\n").trim().to_string()
}
