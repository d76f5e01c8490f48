//! Ollama agent implementation.

use super::framing::lines;
use super::{
    AgentError, AgentProfile, AgentSettings, ChunkStream, InferenceAgent, InferenceRequest,
    InferenceResponse, ModelCache, ModelDescriptor, StreamChunk, TokenUsage,
};
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ollama agent implementation.
///
/// Handles the native Ollama API:
/// - Health check and model listing via GET /api/tags
/// - Generation via POST /api/generate (NDJSON when streaming)
pub struct OllamaAgent {
    settings: AgentSettings,
    client: Arc<Client>,
    cache: ModelCache,
}

impl OllamaAgent {
    pub fn new(settings: AgentSettings, client: Arc<Client>, cache: ModelCache) -> Self {
        Self {
            settings,
            client,
            cache,
        }
    }

    fn build_request<'a>(
        request: &'a InferenceRequest,
        model: &'a str,
        stream: bool,
    ) -> GenerateRequest<'a> {
        GenerateRequest {
            model,
            prompt: &request.prompt,
            system: request.system_prompt.as_deref(),
            stream,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                top_p: request.top_p,
                top_k: request.top_k,
                stop: &request.stop,
            },
        }
    }

    async fn post_generate(
        &self,
        body: &GenerateRequest<'_>,
    ) -> Result<reqwest::Response, AgentError> {
        let response = self
            .client
            .post(self.settings.url("/api/generate"))
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
            .client
            .get(self.settings.url("/api/tags"))
            .timeout(self.settings.probe_timeout)
            .send()
            .await
            .map_err(|e| AgentError::from_reqwest(e, self.settings.probe_timeout_ms()))?;

        if !response.status().is_success() {
            return Err(AgentError::from_response(response).await);
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            AgentError::InvalidResponse(format!("Failed to parse Ollama tags: {}", e))
        })?;

        let mut names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
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

    /// Context window inferred from name markers; Ollama's default otherwise.
    fn context_window(model: &str) -> u32 {
        let name = model.to_lowercase();
        if name.contains("128k") {
            131_072
        } else if name.contains("32k") || name.contains("mixtral") {
            32_768
        } else if name.starts_with("llama3") {
            8_192
        } else {
            4_096
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

/// One NDJSON object from /api/generate. The final object carries `done: true`
/// and the token counters.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama /api/tags response format
#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

fn decode_stream_line(line: &str) -> Result<Option<StreamChunk>, AgentError> {
    let event: GenerateResponse = serde_json::from_str(line)
        .map_err(|e| AgentError::InvalidResponse(format!("Failed to parse stream line: {}", e)))?;
    if event.response.is_empty() && !event.done {
        return Ok(None);
    }
    let usage = (event.done && (event.prompt_eval_count.is_some() || event.eval_count.is_some()))
        .then(|| TokenUsage::from_counts(event.prompt_eval_count, event.eval_count, None));
    Ok(Some(StreamChunk {
        text: event.response,
        finish_reason: event
            .done
            .then(|| event.done_reason.unwrap_or_else(|| "stop".to_string())),
        usage,
    }))
}

#[async_trait]
impl InferenceAgent for OllamaAgent {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn profile(&self) -> AgentProfile {
        AgentProfile {
            backend_type: "ollama".to_string(),
            version: None,
        }
    }

    async fn call(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<InferenceResponse, AgentError> {
        let body = Self::build_request(request, model, false);
        let response = self.post_generate(&body).await?;

        let generated: GenerateResponse = response.json().await.map_err(|e| {
            AgentError::InvalidResponse(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(InferenceResponse {
            text: generated.response,
            model: generated.model.unwrap_or_else(|| model.to_string()),
            backend: self.settings.name.clone(),
            usage: TokenUsage::from_counts(generated.prompt_eval_count, generated.eval_count, None),
            finish_reason: generated.done_reason.unwrap_or_else(|| "stop".to_string()),
            metadata: None,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<ChunkStream, AgentError> {
        let body = Self::build_request(request, model, true);
        let response = self.post_generate(&body).await?;

        let stream = lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => decode_stream_line(&line).transpose(),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.settings.url("/api/tags"))
            .timeout(self.settings.probe_timeout)
            .send()
            .await
        {
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
