//! Local token counting for streams whose provider reports no usage.
//!
//! Counting comes in three accuracy tiers:
//! - **Exact**: the provider's own BPE (tiktoken for OpenAI models)
//! - **Approximation**: a similar BPE as a proxy (cl100k_base for Claude)
//! - **Heuristic**: a conservative character-based estimate for everything else

use super::TokenUsage;
use globset::{Glob, GlobMatcher};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tiktoken_rs::CoreBPE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountTier {
    Exact,
    Approximation,
    Heuristic,
}

impl CountTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountTier::Exact => "exact",
            CountTier::Approximation => "approximation",
            CountTier::Heuristic => "heuristic",
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("Tokenization failed: {0}")]
    Encoding(String),

    #[error("Invalid glob pattern: {0}")]
    GlobPattern(#[from] globset::Error),
}

/// Token counter shared across concurrent calls.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> Result<u32, TokenizerError>;

    fn tier(&self) -> CountTier;

    fn name(&self) -> &str;
}

/// tiktoken-backed counter. Exact for OpenAI families, an approximation
/// elsewhere.
pub struct BpeTokenizer {
    encoding: CoreBPE,
    tier: CountTier,
    name: &'static str,
}

impl BpeTokenizer {
    /// GPT-4o and GPT-4 Turbo.
    pub fn o200k_base() -> Result<Self, TokenizerError> {
        Ok(Self {
            encoding: tiktoken_rs::o200k_base()
                .map_err(|e| TokenizerError::Encoding(format!("o200k_base: {}", e)))?,
            tier: CountTier::Exact,
            name: "tiktoken_o200k_base",
        })
    }

    /// GPT-3.5 and GPT-4 base models.
    pub fn cl100k_base() -> Result<Self, TokenizerError> {
        Ok(Self {
            encoding: tiktoken_rs::cl100k_base()
                .map_err(|e| TokenizerError::Encoding(format!("cl100k_base: {}", e)))?,
            tier: CountTier::Exact,
            name: "tiktoken_cl100k_base",
        })
    }

    /// cl100k_base standing in for a vendor tokenizer that is not public.
    pub fn approximation() -> Result<Self, TokenizerError> {
        Ok(Self {
            tier: CountTier::Approximation,
            name: "tiktoken_approximation",
            ..Self::cl100k_base()?
        })
    }
}

impl Tokenizer for BpeTokenizer {
    fn count_tokens(&self, text: &str) -> Result<u32, TokenizerError> {
        self.encoding
            .encode_with_special_tokens(text)
            .len()
            .try_into()
            .map_err(|e| TokenizerError::Encoding(format!("Token count overflow: {}", e)))
    }

    fn tier(&self) -> CountTier {
        self.tier
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// ~4 characters per token, scaled up 15% so billing errs high.
pub struct HeuristicTokenizer {
    multiplier: f64,
}

impl HeuristicTokenizer {
    pub fn new() -> Self {
        Self { multiplier: 1.15 }
    }
}

impl Default for HeuristicTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for HeuristicTokenizer {
    fn count_tokens(&self, text: &str) -> Result<u32, TokenizerError> {
        if text.is_empty() {
            return Ok(0);
        }
        let base = (text.chars().count() / 4).max(1);
        Ok((base as f64 * self.multiplier).ceil() as u32)
    }

    fn tier(&self) -> CountTier {
        CountTier::Heuristic
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Picks a tokenizer by model name glob.
pub struct TokenizerRegistry {
    matchers: Vec<(GlobMatcher, Arc<dyn Tokenizer>)>,
    fallback: Arc<dyn Tokenizer>,
}

impl TokenizerRegistry {
    /// OpenAI families exact, Claude approximated, everything else heuristic.
    pub fn new() -> Result<Self, TokenizerError> {
        let o200k: Arc<dyn Tokenizer> = Arc::new(BpeTokenizer::o200k_base()?);
        let cl100k: Arc<dyn Tokenizer> = Arc::new(BpeTokenizer::cl100k_base()?);
        let claude: Arc<dyn Tokenizer> = Arc::new(BpeTokenizer::approximation()?);

        let table = [
            ("gpt-4-turbo*", &o200k),
            ("gpt-4o*", &o200k),
            ("gpt-3.5*", &cl100k),
            ("gpt-4", &cl100k),
            ("gpt-4-*", &cl100k),
            ("claude-*", &claude),
        ];
        let mut matchers = Vec::with_capacity(table.len());
        for (pattern, tokenizer) in table {
            matchers.push((Glob::new(pattern)?.compile_matcher(), Arc::clone(tokenizer)));
        }

        Ok(Self {
            matchers,
            fallback: Arc::new(HeuristicTokenizer::new()),
        })
    }

    /// Registry that only ever estimates. Used when the BPE tables fail to load.
    pub fn heuristic_only() -> Self {
        Self {
            matchers: Vec::new(),
            fallback: Arc::new(HeuristicTokenizer::new()),
        }
    }

    /// Process-wide registry, built on first use. BPE tables are large and
    /// slow to parse.
    pub fn shared() -> Arc<TokenizerRegistry> {
        static SHARED: OnceLock<Arc<TokenizerRegistry>> = OnceLock::new();
        let registry = SHARED.get_or_init(|| match TokenizerRegistry::new() {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                tracing::warn!(error = %e, "Tokenizer tables unavailable, token counts will be estimated");
                Arc::new(TokenizerRegistry::heuristic_only())
            }
        });
        Arc::clone(registry)
    }

    pub fn get_tokenizer(&self, model: &str) -> Arc<dyn Tokenizer> {
        self.matchers
            .iter()
            .find(|(matcher, _)| matcher.is_match(model))
            .map(|(_, tokenizer)| Arc::clone(tokenizer))
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn count_tokens(&self, model: &str, text: &str) -> Result<u32, TokenizerError> {
        let tokenizer = self.get_tokenizer(model);
        metrics::counter!("meridian_token_count_tier_total",
            "tier" => tokenizer.tier().as_str(), "model" => model.to_string())
        .increment(1);
        tokenizer.count_tokens(text)
    }

    /// Usage for a prompt and completion. A counting failure falls back to the
    /// heuristic rather than failing the call.
    pub fn usage(&self, model: &str, prompt: &str, completion: &str) -> TokenUsage {
        let count = |text: &str| {
            self.count_tokens(model, text).unwrap_or_else(|e| {
                tracing::debug!(model = %model, error = %e, "Token counting failed, estimating");
                self.fallback.count_tokens(text).unwrap_or(0)
            })
        };
        TokenUsage::new(count(prompt), count(completion))
    }
}
