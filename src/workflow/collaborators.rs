//! Services the orchestrator delegates non-LLM steps to.

use super::CollaboratorError;
use crate::agent::tokenizer::{HeuristicTokenizer, Tokenizer};
use crate::agent::TokenUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A retrieved document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score: 0.0,
        }
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Document>, CollaboratorError>;
}

/// Output of a [`Compressor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compressed {
    pub summary: String,
    /// Tokens spent producing the summary, if any
    #[serde(default)]
    pub usage: TokenUsage,
}

#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(
        &self,
        messages: &[String],
        max_tokens: Option<u32>,
    ) -> Result<Compressed, CollaboratorError>;
}

/// A named side-effecting operation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, input: &serde_json::Value) -> Result<serde_json::Value, CollaboratorError>;
}

/// Dispatch table for `tool-use` steps.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.tools.insert(name.into(), handler);
    }

    pub fn with_tool(mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        self.register(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Keyword retriever over a fixed corpus. Scores are the fraction of query
/// terms found in a document; documents matching nothing are skipped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRetriever {
    documents: Vec<Document>,
}

impl InMemoryRetriever {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Document>, CollaboratorError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Document> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let content = doc.content.to_lowercase();
                let matched = terms.iter().filter(|t| content.contains(t.as_str())).count();
                (matched > 0).then(|| Document {
                    score: matched as f64 / terms.len() as f64,
                    ..doc.clone()
                })
            })
            .collect();
        // Stable sort keeps corpus order among equal scores
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Keeps the most recent messages that fit in `max_tokens` and joins them
/// with newlines. Spends no tokens.
#[derive(Default)]
pub struct TruncatingCompressor {
    tokenizer: HeuristicTokenizer,
}

#[async_trait]
impl Compressor for TruncatingCompressor {
    async fn compress(
        &self,
        messages: &[String],
        max_tokens: Option<u32>,
    ) -> Result<Compressed, CollaboratorError> {
        let budget = max_tokens.unwrap_or(u32::MAX);
        let mut kept: Vec<&str> = Vec::new();
        let mut used = 0u32;
        for message in messages.iter().rev() {
            let cost = self
                .tokenizer
                .count_tokens(message)
                .map_err(|e| CollaboratorError::new(e.to_string()))?;
            if used.saturating_add(cost) > budget {
                break;
            }
            used += cost;
            kept.push(message);
        }
        kept.reverse();
        Ok(Compressed {
            summary: kept.join("\n"),
            usage: TokenUsage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retriever_ranks_by_term_overlap() {
        let retriever = InMemoryRetriever::new(vec![
            Document::new("1", "Rust ownership rules"),
            Document::new("2", "Python packaging"),
            Document::new("3", "Rust async runtimes and ownership"),
        ]);
        let docs = retriever.retrieve("rust ownership async", 5).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);
        assert!((docs[0].score - 1.0).abs() < f64::EPSILON);

        let top = retriever.retrieve("rust", 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, "1");
    }

    #[tokio::test]
    async fn test_truncating_compressor_keeps_recent() {
        let messages = vec!["a".repeat(8), "b".repeat(8), "c".repeat(8)];
        let compressor = TruncatingCompressor::default();
        // 8 chars estimate to 3 tokens each
        let out = compressor.compress(&messages, Some(7)).await.unwrap();
        assert_eq!(out.summary, format!("{}\n{}", "b".repeat(8), "c".repeat(8)));

        let all = compressor.compress(&messages, None).await.unwrap();
        assert_eq!(all.summary.lines().count(), 3);
    }

    #[test]
    fn test_tool_registry_names_sorted() {
        struct Echo;
        #[async_trait]
        impl ToolHandler for Echo {
            async fn invoke(
                &self,
                input: &serde_json::Value,
            ) -> Result<serde_json::Value, CollaboratorError> {
                Ok(input.clone())
            }
        }
        let tools = ToolRegistry::new()
            .with_tool("zeta", Arc::new(Echo))
            .with_tool("alpha", Arc::new(Echo));
        assert_eq!(tools.names(), vec!["alpha", "zeta"]);
        assert!(tools.get("missing").is_none());
    }
}
