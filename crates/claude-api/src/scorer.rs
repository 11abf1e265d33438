use async_trait::async_trait;
use forge_core::analysis::ComplexityAnalysis;
use tracing::debug;

use crate::client::ClaudeClient;
use crate::output::extract_json_object;
use crate::{ClaudeApiError, Result};

const SYSTEM_PROMPT: &str = "You estimate implementation and test complexity of Gherkin features. \
Reply with a single JSON object and nothing else.";

const RESPONSE_SHAPE: &str = r#"{
  "overallComplexity": <1-10>,
  "scenarios": [
    {
      "title": "<scenario title exactly as written>",
      "complexity": <1-10>,
      "factors": {"stepCount": <0-10>, "dataComplexity": <0-10>, "integrationPoints": <0-10>, "uiInteractions": <0-10>},
      "explanation": "<one or two sentences>"
    }
  ],
  "recommendations": ["<short suggestion>"]
}"#;

/// Scores a Gherkin document. Implementations make at most one remote call
/// per invocation and never retry.
#[async_trait]
pub trait ComplexityScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<ComplexityAnalysis>;
}

/// [`ComplexityScorer`] backed by the Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeScorer {
    client: ClaudeClient,
}

impl ClaudeScorer {
    pub fn new(client: ClaudeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComplexityScorer for ClaudeScorer {
    async fn score(&self, text: &str) -> Result<ComplexityAnalysis> {
        let prompt = format!(
            "Analyze every scenario in this feature, in order, using this JSON shape:\n\
             {RESPONSE_SHAPE}\n\nFeature:\n{text}"
        );
        let reply = self.client.complete(Some(SYSTEM_PROMPT), &prompt).await?;
        parse_analysis(&reply)
    }
}

/// Turn a model reply into an analysis, tolerating prose or fences around
/// the JSON object.
pub fn parse_analysis(reply: &str) -> Result<ComplexityAnalysis> {
    let json = extract_json_object(reply).unwrap_or(reply);
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|source| ClaudeApiError::Parse {
            output: reply.chars().take(500).collect(),
            source,
        })?;
    let analysis = ComplexityAnalysis::from_model_output(&value)?;
    debug!(
        scenarios = analysis.scenarios.len(),
        overall = analysis.overall_complexity,
        "parsed complexity analysis"
    );
    Ok(analysis)
}
