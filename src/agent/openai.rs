//! OpenAI-compatible agent implementation.
//!
//! Speaks the `/v1/chat/completions` dialect, which also covers vLLM, LM Studio,
//! llama.cpp server and most hosted gateways. The API key is optional so the
//! same adapter serves unauthenticated local servers.

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

/// OpenAI agent implementation.
///
/// - Health check via GET /v1/models
/// - Model listing via GET /v1/models
/// - Generation via POST /v1/chat/completions with optional Bearer token
pub struct OpenAIAgent {
    settings: AgentSettings,
    /// Shared HTTP client for connection pooling
    client: Arc<Client>,
    cache: ModelCache,
}

impl OpenAIAgent {
    pub fn new(settings: AgentSettings, client: Arc<Client>, cache: ModelCache) -> Self {
        Self {
            settings,
            client,
            cache,
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.settings.api_key {
            Some(key) => builder.header("authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    fn build_request<'a>(
        request: &'a InferenceRequest,
        model: &'a str,
        stream: bool,
    ) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        ChatRequest {
            model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            stop: &request.stop,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn post_chat(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, AgentError> {
        let response = self
            .authorize(self.client.post(self.settings.url("/v1/chat/completions")))
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

        if !response.status().is_success() {
            return Err(AgentError::from_response(response).await);
        }

        let listing: ModelsResponse = response.json().await.map_err(|e| {
            AgentError::InvalidResponse(format!("Failed to parse models response: {}", e))
        })?;

        let mut names: Vec<String> = listing.data.into_iter().map(|m| m.id).collect();
        for configured in &self.settings.models {
            if !names.contains(configured) {
                names.push(configured.clone());
            }
        }

        Ok(names
            .iter()
            .map(|name| self.settings.describe(name, Self::context_window(name)))
            .collect())
    }

    /// Context window inferred from well-known model names.
    fn context_window(model: &str) -> u32 {
        let name = model.to_lowercase();
        if name.contains("gpt-4-turbo") || name.contains("gpt-4o") {
            128_000
        } else if name.contains("gpt-4-32k") {
            32_768
        } else if name.contains("gpt-4") {
            8_192
        } else if name.contains("gpt-3.5-turbo-16k") {
            16_384
        } else {
            4_096
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

/// Asks for a trailing frame with the usage block and no choices.
#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI /v1/models response format
#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Decode one SSE line. `Ok(None)` means "nothing to emit".
fn decode_stream_line(line: &str) -> Result<Option<StreamChunk>, AgentError> {
    let Some(data) = sse_data(line) else {
        return Ok(None);
    };
    if data == "[DONE]" {
        return Ok(None);
    }
    let event: StreamEvent = serde_json::from_str(data)
        .map_err(|e| AgentError::InvalidResponse(format!("Failed to parse stream event: {}", e)))?;
    let usage = event.usage.map(|u| {
        TokenUsage::from_counts(u.prompt_tokens, u.completion_tokens, u.total_tokens)
    });
    let (text, finish_reason) = match event.choices.into_iter().next() {
        Some(choice) => (choice.delta.content.unwrap_or_default(), choice.finish_reason),
        None => (String::new(), None),
    };
    if text.is_empty() && finish_reason.is_none() && usage.is_none() {
        return Ok(None);
    }
    Ok(Some(StreamChunk {
        text,
        finish_reason,
        usage,
    }))
}

#[async_trait]
impl InferenceAgent for OpenAIAgent {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn profile(&self) -> AgentProfile {
        AgentProfile {
            backend_type: "openai".to_string(),
            version: None,
        }
    }

    async fn call(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<InferenceResponse, AgentError> {
        let body = Self::build_request(request, model, false);
        let response = self.post_chat(&body).await?;

        let completion: ChatResponse = response.json().await.map_err(|e| {
            AgentError::InvalidResponse(format!("Failed to parse completion response: {}", e))
        })?;

        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            AgentError::InvalidResponse("Completion response has no choices".to_string())
        })?;

        let usage = completion
            .usage
            .map(|u| TokenUsage::from_counts(u.prompt_tokens, u.completion_tokens, u.total_tokens))
            .unwrap_or_default();

        let metadata = completion
            .id
            .map(|id| HashMap::from([("id".to_string(), serde_json::Value::String(id))]));

        Ok(InferenceResponse {
            text: choice.message.content.unwrap_or_default(),
            model: completion.model.unwrap_or_else(|| model.to_string()),
            backend: self.settings.name.clone(),
            usage,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            metadata,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<ChunkStream, AgentError> {
        let body = Self::build_request(request, model, true);
        let response = self.post_chat(&body).await?;

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
            Ok(response) => response.status().is_success(),
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
