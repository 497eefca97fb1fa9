//! Model client abstraction
//!
//! Wire types mirror the Messages API: a reply interleaves narration text
//! and structured tool invocations as content blocks, in the order the model
//! emitted them. The `ModelClient` trait is the seam between the
//! orchestrator and the provider; `ScriptedModel` replays canned replies for
//! tests.

use async_trait::async_trait;
use claimforge_common::config::ModelConfig;
use claimforge_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Base64 media payload for vision blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl MediaSource {
    pub fn base64(media_type: &str, data: String) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: media_type.to_string(),
            data,
        }
    }
}

/// One block of a model message, in wire order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Narration intended for display
    Text { text: String },
    /// Structured tool invocation emitted by the model
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Host-produced result fed back on the next round
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// Raster image payload
    Image { source: MediaSource },
    /// PDF payload
    Document { source: MediaSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// One message in the model-negotiation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ModelMessage {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
        }
    }
}

/// Named tool with a JSON-schema argument definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One request to the model
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// One reply from the model
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub blocks: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl ModelReply {
    pub fn has_tool_use(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// Seam between the orchestrator and the model provider
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply>;
}

// ============================================================================
// Anthropic client
// ============================================================================

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ModelMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

impl AnthropicClient {
    /// Build a client from configuration; the key is required
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Configuration {
                message: "model.api_key is required".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn make_request(&self, request: &ModelRequest) -> Result<ModelReply> {
        let url = format!("{}/v1/messages", self.api_base);

        let body = ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &request.system,
            messages: &request.messages,
            tools: request.tools.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                message: format!("API error {}: {}", status, body),
            });
        }

        let body = response.text().await.map_err(|e| AppError::Upstream {
            message: format!("Failed to read response body: {}", e),
        })?;
        // A 2xx with an unparseable body carries the raw text for diagnosis
        let result: ApiResponse =
            serde_json::from_str(&body).map_err(|e| AppError::Parse {
                message: format!("Malformed model response: {}", e),
                raw: body.clone(),
            })?;

        Ok(ModelReply {
            blocks: result.content,
            stop_reason: result.stop_reason,
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply> {
        // One bounded round-trip; a hung upstream must not hold the
        // transport open indefinitely
        match tokio::time::timeout(self.timeout, self.make_request(&request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::UpstreamTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

// ============================================================================
// Scripted model for tests
// ============================================================================

/// Replays a fixed script of replies, one per `complete` call
pub struct ScriptedModel {
    script: Mutex<VecDeque<ModelReply>>,
    /// Reply returned forever once the script is exhausted, if set
    fallback: Option<ModelReply>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            fallback: None,
        }
    }

    /// A model that replies with `reply` on every call
    pub fn repeating(reply: ModelReply) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(reply),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, _request: ModelRequest) -> Result<ModelReply> {
        let next = self
            .script
            .lock()
            .map_err(|_| AppError::Internal {
                message: "script lock poisoned".to_string(),
            })?
            .pop_front();

        match next.or_else(|| self.fallback.clone()) {
            Some(reply) => Ok(reply),
            None => Err(AppError::Upstream {
                message: "scripted model exhausted".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_blocks_round_trip_wire_format() {
        let block = ContentBlock::ToolUse {
            id: "tu_1".into(),
            name: "save-personal-info".into(),
            input: json!({"first_name": "Jane"}),
        };
        let wire = serde_json::to_value(&block).unwrap();
        assert_eq!(wire["type"], "tool_use");
        assert_eq!(wire["name"], "save-personal-info");

        let parsed: ContentBlock = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn tool_result_defaults_to_success() {
        let parsed: ContentBlock = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "tu_1",
            "content": "saved"
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ContentBlock::ToolResult {
                tool_use_id: "tu_1".into(),
                content: "saved".into(),
                is_error: false
            }
        );
    }

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::new(vec![
            ModelReply {
                blocks: vec![ContentBlock::text("first")],
                stop_reason: None,
            },
            ModelReply {
                blocks: vec![ContentBlock::text("second")],
                stop_reason: None,
            },
        ]);

        let req = ModelRequest {
            system: String::new(),
            messages: vec![],
            tools: vec![],
        };

        let first = model.complete(req.clone()).await.unwrap();
        assert_eq!(first.blocks, vec![ContentBlock::text("first")]);
        let second = model.complete(req.clone()).await.unwrap();
        assert_eq!(second.blocks, vec![ContentBlock::text("second")]);
        assert!(model.complete(req).await.is_err());
    }
}
