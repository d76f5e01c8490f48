//! Scripted in-process agent.
//!
//! Echoes prompts back by default; outcomes can be queued to simulate upstream
//! failures.

use super::{
    AgentError, AgentProfile, ChunkStream, InferenceAgent, InferenceRequest, InferenceResponse,
    ModelDescriptor, StreamChunk, TokenUsage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

enum Scripted {
    Text(String),
    Error(AgentError),
}

pub struct MockAgent {
    name: String,
    models: Mutex<Vec<ModelDescriptor>>,
    script: Mutex<VecDeque<Scripted>>,
    stream_script: Mutex<Option<Vec<Result<StreamChunk, AgentError>>>>,
    usage: Mutex<Option<TokenUsage>>,
    requests: Mutex<Vec<(InferenceRequest, String)>>,
    healthy: AtomicBool,
    list_fails: AtomicBool,
    calls: AtomicU32,
}

impl MockAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            models: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            stream_script: Mutex::new(None),
            usage: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            list_fails: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    /// Advertise free models with the given names.
    pub fn with_models(self, names: &[&str]) -> Self {
        {
            let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
            for name in names {
                models.push(ModelDescriptor::new(&self.name, *name));
            }
        }
        self
    }

    /// Advertise a fully specified descriptor. Its backend is forced to this agent.
    pub fn with_descriptor(self, mut descriptor: ModelDescriptor) -> Self {
        descriptor.backend = self.name.clone();
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(descriptor);
        self
    }

    /// Fixed token usage reported on every call, and in a final frame of
    /// unscripted streams. Calls default to whitespace word counts and
    /// streams to no usage at all.
    pub fn with_usage(self, input: u32, output: u32) -> Self {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(TokenUsage::new(input, output));
        self
    }

    /// Chunks yielded by the next `stream` call.
    pub fn with_stream(self, chunks: Vec<Result<StreamChunk, AgentError>>) -> Self {
        *self
            .stream_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(chunks);
        self
    }

    /// Queue a successful reply for the next call.
    pub fn push_text(&self, text: impl Into<String>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Scripted::Text(text.into()));
    }

    /// Queue a failure for the next call.
    pub fn push_error(&self, error: AgentError) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Scripted::Error(error));
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_list_failure(&self, fails: bool) {
        self.list_fails.store(fails, Ordering::SeqCst);
    }

    /// Number of `call`/`stream` invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(r, _)| r.prompt.clone())
            .collect()
    }

    /// Models requested, in order.
    pub fn requested_models(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn begin(&self, request: &InferenceRequest, model: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.clone(), model.to_string()));
    }
}

#[async_trait]
impl InferenceAgent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn profile(&self) -> AgentProfile {
        AgentProfile {
            backend_type: "mock".to_string(),
            version: None,
        }
    }

    async fn call(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<InferenceResponse, AgentError> {
        self.begin(request, model);

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let text = match scripted {
            Some(Scripted::Error(e)) => return Err(e),
            Some(Scripted::Text(text)) => text,
            None => request.prompt.clone(),
        };
        let usage = self
            .usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or_else(|| TokenUsage::new(word_count(&request.prompt), word_count(&text)));

        Ok(InferenceResponse {
            text,
            model: model.to_string(),
            backend: self.name.clone(),
            usage,
            finish_reason: "stop".to_string(),
            metadata: None,
        })
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<ChunkStream, AgentError> {
        self.begin(request, model);
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(Scripted::Error(e)) = scripted {
            return Err(e);
        }
        let usage = *self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        let chunks = self
            .stream_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| {
                request
                    .prompt
                    .split_inclusive(' ')
                    .map(|word| Ok(StreamChunk::text(word)))
                    .chain(usage.map(|u| Ok(StreamChunk::usage_only(u))))
                    .collect()
            });
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, AgentError> {
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(AgentError::Network("mock listing disabled".to_string()));
        }
        Ok(self
            .models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_echo_and_script() {
        let agent = MockAgent::new("mock").with_usage(3, 2);
        agent.push_text("scripted");
        agent.push_error(AgentError::Timeout(10));

        let first = agent.call(&InferenceRequest::new("hi"), "m").await.unwrap();
        assert_eq!(first.text, "scripted");
        assert_eq!(first.usage.total, 5);
        assert!(agent.call(&InferenceRequest::new("hi"), "m").await.is_err());
        let echoed = agent.call(&InferenceRequest::new("hi"), "m").await.unwrap();
        assert_eq!(echoed.text, "hi");
        assert_eq!(agent.calls(), 3);
    }

    #[tokio::test]
    async fn test_default_stream_splits_words() {
        let agent = MockAgent::new("mock");
        let chunks: Vec<_> = agent
            .stream(&InferenceRequest::new("a b c"), "m")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
    }
}
