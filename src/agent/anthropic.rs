//! Anthropic Messages API agent implementation.

use super::framing::{lines, sse_data};
use super::{
    AgentError, AgentProfile, AgentSettings, ChunkStream, InferenceAgent, InferenceRequest,
    InferenceResponse, ModelCache, ModelDescriptor, StreamChunk, TokenUsage,
};
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const CONTEXT_WINDOW: u32 = 200_000;

/// Models advertised when the upstream has no listing endpoint.
const KNOWN_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-haiku-20240307",
];

/// Anthropic agent implementation.
///
/// - Health check and model listing via GET /v1/models
/// - Generation via POST /v1/messages with x-api-key header
pub struct AnthropicAgent {
    settings: AgentSettings,
    client: Arc<Client>,
    cache: ModelCache,
}

impl AnthropicAgent {
    pub fn new(settings: AgentSettings, client: Arc<Client>, cache: ModelCache) -> Self {
        Self {
            settings,
            client,
            cache,
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
        match &self.settings.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    fn build_request<'a>(
        request: &'a InferenceRequest,
        model: &'a str,
        stream: bool,
    ) -> MessagesRequest<'a> {
        MessagesRequest {
            model,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            system: request.system_prompt.as_deref(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            stop_sequences: &request.stop,
            stream,
        }
    }

    async fn post_messages(
        &self,
        body: &MessagesRequest<'_>,
    ) -> Result<reqwest::Response, AgentError> {
        let response = self
            .authorize(self.client.post(self.settings.url("/v1/messages")))
            .json(body)
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(|e| AgentError::from_reqwest(e, self.settings.timeout_ms()))?;

        if !response.status().is_success() {
            return Err(AgentError::from_response(response).await);
        }
        Ok(response)
    }

    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, AgentError> {
        let response = self
            .authorize(self.client.get(self.settings.url("/v1/models")))
            .timeout(self.settings.probe_timeout)
            .send()
            .await
            .map_err(|e| AgentError::from_reqwest(e, self.settings.probe_timeout_ms()))?;

        let mut names: Vec<String> = if response.status().as_u16() == 404 {
            // Proxies without a listing endpoint
            KNOWN_MODELS.iter().map(|m| m.to_string()).collect()
        } else if response.status().is_success() {
            let listing: ModelsResponse = response.json().await.map_err(|e| {
                AgentError::InvalidResponse(format!("Failed to parse Anthropic models: {}", e))
            })?;
            listing.data.into_iter().map(|m| m.id).collect()
        } else {
            return Err(AgentError::from_response(response).await);
        };

        for configured in &self.settings.models {
            if !names.contains(configured) {
                names.push(configured.clone());
            }
        }

        Ok(names
            .iter()
            .map(|name| self.settings.describe(name, CONTEXT_WINDOW))
            .collect())
    }
}

/// Map Anthropic stop reasons onto the shared vocabulary.
fn finish_reason(stop_reason: Option<&str>) -> String {
    match stop_reason {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        _ => "stop",
    }
    .to_string()
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StartedMessage,
    },
    ContentBlockDelta {
        delta: TextDelta,
    },
    MessageDelta {
        delta: StopDelta,
        #[serde(default)]
        usage: Option<Usage>,
    },
    Error {
        error: StreamErrorBody,
    },
    #[serde(other)]
    Other,
}

/// `message_start` carries the input count and a provisional output count.
#[derive(Debug, Deserialize)]
struct StartedMessage {
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
}

/// Decode one SSE line of the Messages stream.
fn decode_stream_line(line: &str) -> Result<Option<StreamChunk>, AgentError> {
    let Some(data) = sse_data(line) else {
        return Ok(None);
    };
    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| AgentError::InvalidResponse(format!("Failed to parse stream event: {}", e)))?;
    let counts = |usage: Usage| TokenUsage::from_counts(usage.input_tokens, usage.output_tokens, None);
    match event {
        StreamEvent::MessageStart { message } => Ok(message
            .usage
            .map(|usage| StreamChunk::usage_only(counts(usage)))),
        StreamEvent::ContentBlockDelta { delta } => Ok(delta
            .text
            .filter(|t| !t.is_empty())
            .map(StreamChunk::text)),
        StreamEvent::MessageDelta { delta, usage } => {
            if delta.stop_reason.is_none() && usage.is_none() {
                return Ok(None);
            }
            Ok(Some(StreamChunk {
                text: String::new(),
                finish_reason: delta.stop_reason.map(|reason| finish_reason(Some(&reason))),
                usage: usage.map(counts),
            }))
        }
        StreamEvent::Error { error } => Err(AgentError::Upstream {
            status: 500,
            message: error.message,
        }),
        StreamEvent::Other => Ok(None),
    }
}

#[async_trait]
impl InferenceAgent for AnthropicAgent {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn profile(&self) -> AgentProfile {
        AgentProfile {
            backend_type: "anthropic".to_string(),
            version: Some(ANTHROPIC_VERSION.to_string()),
        }
    }

    async fn call(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<InferenceResponse, AgentError> {
        let body = Self::build_request(request, model, false);
        let response = self.post_messages(&body).await?;

        let message: MessagesResponse = response.json().await.map_err(|e| {
            AgentError::InvalidResponse(format!("Failed to parse Anthropic response: {}", e))
        })?;

        let text = message
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let usage = message
            .usage
            .map(|u| TokenUsage::from_counts(u.input_tokens, u.output_tokens, None))
            .unwrap_or_default();

        let metadata = message
            .id
            .map(|id| HashMap::from([("id".to_string(), serde_json::Value::String(id))]));

        Ok(InferenceResponse {
            text,
            model: message.model.unwrap_or_else(|| model.to_string()),
            backend: self.settings.name.clone(),
            usage,
            finish_reason: finish_reason(message.stop_reason.as_deref()),
            metadata,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<ChunkStream, AgentError> {
        let body = Self::build_request(request, model, true);
        let response = self.post_messages(&body).await?;

        let stream = lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => decode_stream_line(&line).transpose(),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> bool {
        let result = self
            .authorize(self.client.get(self.settings.url("/v1/models")))
            .timeout(self.settings.probe_timeout)
            .send()
            .await;
        match result {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    tracing::warn!(backend = %self.settings.name, status = %status, "Anthropic authentication failed");
                }
                status.is_success() || status.as_u16() == 404
            }
            Err(e) => {
                tracing::debug!(backend = %self.settings.name, error = %e, "Health probe failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, AgentError> {
        self.cache.get_or_fetch(|| self.fetch_models()).await
    }
}
