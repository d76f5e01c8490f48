//! Workflow step, context and result types.

use super::WorkflowError;
use crate::agent::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Input of an `llm-call` step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmCallInput {
    /// Prompt text; may reference `{{stepId}}`, `{{knowledge}}`,
    /// `{{compressedHistory}}`, `{{userInput}}`, `{{reportData}}`, `{{symptoms}}`
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    /// Overrides the run's scenario
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Pinned `backend:model`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl LlmCallInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_user_input(mut self, user_input: impl Into<String>) -> Self {
        self.user_input = Some(user_input.into());
        self
    }

    pub fn with_report_data(mut self, report_data: impl Into<String>) -> Self {
        self.report_data = Some(report_data.into());
        self
    }

    pub fn with_symptoms(mut self, symptoms: impl Into<String>) -> Self {
        self.symptoms = Some(symptoms.into());
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalInput {
    pub query: String,
    /// Falls back to `workflow.retrieval_top_k`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionInput {
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

/// What a step does, with its typed input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepKind {
    LlmCall(LlmCallInput),
    RagRetrieval(RetrievalInput),
    Compression(CompressionInput),
    ToolUse(ToolInput),
}

impl StepKind {
    /// Wire tag, also used as the metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::LlmCall(_) => "llm-call",
            StepKind::RagRetrieval(_) => "rag-retrieval",
            StepKind::Compression(_) => "compression",
            StepKind::ToolUse(_) => "tool-use",
        }
    }
}

/// One unit of work in a run. The orchestrator fills `output`, `latency_ms`,
/// `tokens` and `error` in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
    /// Static output used when the step fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            fallback: None,
            output: None,
            latency_ms: None,
            tokens: None,
            error: None,
        }
    }

    pub fn llm(id: impl Into<String>, input: LlmCallInput) -> Self {
        Self::new(id, StepKind::LlmCall(input))
    }

    pub fn retrieval(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(
            id,
            StepKind::RagRetrieval(RetrievalInput {
                query: query.into(),
                top_k: None,
            }),
        )
    }

    pub fn compression(id: impl Into<String>, messages: Vec<String>) -> Self {
        Self::new(
            id,
            StepKind::Compression(CompressionInput {
                messages,
                max_tokens: None,
            }),
        )
    }

    pub fn tool(id: impl Into<String>, tool: impl Into<String>, input: serde_json::Value) -> Self {
        Self::new(
            id,
            StepKind::ToolUse(ToolInput {
                tool: tool.into(),
                input,
            }),
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Clear the results of a previous run.
    pub(crate) fn reset(&mut self) {
        self.output = None;
        self.latency_ms = None;
        self.tokens = None;
        self.error = None;
    }
}

/// Failure recorded on a step that fell back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub code: String,
    pub message: String,
}

impl From<&WorkflowError> for StepError {
    fn from(error: &WorkflowError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Shared state for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub caller_id: String,
    pub session_id: String,
    /// Scenario for LLM steps that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Extra `{{name}}` values for LLM prompts
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl WorkflowContext {
    pub fn new(caller_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// Per-step entry of a [`WorkflowResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub output: serde_json::Value,
    pub tokens: TokenUsage,
    pub latency_ms: u64,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// True iff no step carries an error
    pub success: bool,
    pub steps: Vec<StepOutcome>,
    pub total_tokens: u32,
    pub step_tokens: BTreeMap<String, u32>,
    pub duration_ms: u64,
}

impl WorkflowResult {
    pub(crate) fn from_outcomes(steps: Vec<StepOutcome>, duration_ms: u64) -> Self {
        let step_tokens: BTreeMap<String, u32> = steps
            .iter()
            .map(|s| (s.id.clone(), s.tokens.total))
            .collect();
        Self {
            success: steps.iter().all(StepOutcome::succeeded),
            total_tokens: step_tokens.values().sum(),
            step_tokens,
            steps,
            duration_ms,
        }
    }

    pub fn step(&self, id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Output of `id` as text: strings verbatim, anything else as JSON.
    pub fn output_text(&self, id: &str) -> Option<String> {
        self.step(id).map(|s| value_text(&s.output))
    }
}

pub(crate) fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_kind_wire_format() {
        let step = WorkflowStep::retrieval("docs", "chest pain");
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["kind"]["type"], "rag-retrieval");
        assert_eq!(value["kind"]["query"], "chest pain");

        let parsed: StepKind = serde_json::from_value(json!({
            "type": "llm-call",
            "prompt": "Summarize {{docs}}",
            "user_input": "hi"
        }))
        .unwrap();
        assert_eq!(
            parsed,
            StepKind::LlmCall(LlmCallInput::new("Summarize {{docs}}").with_user_input("hi"))
        );
        assert_eq!(parsed.as_str(), "llm-call");
    }

    #[test]
    fn test_result_totals_and_success() {
        let outcome = |id: &str, total: u32, error: Option<StepError>| StepOutcome {
            id: id.into(),
            name: id.into(),
            kind: "llm-call".into(),
            output: json!("x"),
            tokens: TokenUsage::new(total, 0),
            latency_ms: 1,
            cached: false,
            error,
        };
        let ok = WorkflowResult::from_outcomes(vec![outcome("a", 3, None), outcome("b", 4, None)], 9);
        assert!(ok.success);
        assert_eq!(ok.total_tokens, 7);
        assert_eq!(ok.step_tokens["b"], 4);

        let failed = WorkflowResult::from_outcomes(
            vec![
                outcome("a", 3, None),
                outcome(
                    "b",
                    0,
                    Some(StepError {
                        code: "TIMEOUT".into(),
                        message: "slow".into(),
                    }),
                ),
            ],
            9,
        );
        assert!(!failed.success);
    }

    #[test]
    fn test_result_json_round_trip() {
        let result = WorkflowResult::from_outcomes(
            vec![StepOutcome {
                id: "a".into(),
                name: "Analyze".into(),
                kind: "tool-use".into(),
                output: json!({"score": 0.5, "tags": ["x"]}),
                tokens: TokenUsage::default(),
                latency_ms: 12,
                cached: true,
                error: None,
            }],
            12,
        );
        let text = serde_json::to_string(&result).unwrap();
        let back: WorkflowResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.output_text("a").unwrap(), r#"{"score":0.5,"tags":["x"]}"#);
    }
}
