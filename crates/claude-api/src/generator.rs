use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::ClaudeClient;
use crate::output::strip_code_fences;
use crate::{ClaudeApiError, Result};

const SYSTEM_PROMPT: &str = "You write Cucumber feature files in Gherkin. \
Reply with the feature file only, no commentary.";

/// Input for generating a new feature file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub title: String,
    pub story: String,
    pub scenario_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl GenerationRequest {
    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "Write a Gherkin feature titled \"{}\" with exactly {} scenarios \
             (use `Scenario:` or `Scenario Outline:` headings).\n\nUser story:\n{}\n",
            self.title, self.scenario_count, self.story
        );
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.trim().is_empty()) {
            prompt.push_str(&format!("\nDomain: {domain}\n"));
        }
        prompt
    }
}

/// Produces the initial Gherkin text for a feature.
#[async_trait]
pub trait FeatureGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// [`FeatureGenerator`] backed by the Messages API.
#[derive(Debug, Clone)]
pub struct ClaudeGenerator {
    client: ClaudeClient,
}

impl ClaudeGenerator {
    pub fn new(client: ClaudeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeatureGenerator for ClaudeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let reply = self
            .client
            .complete(Some(SYSTEM_PROMPT), &request.prompt())
            .await?;
        let text = strip_code_fences(&reply);
        if text.is_empty() {
            return Err(ClaudeApiError::EmptyResponse);
        }

        let found = forge_core::gherkin::scenario_count(Some(text));
        if found != request.scenario_count as usize {
            warn!(
                requested = request.scenario_count,
                found, "generated feature has a different scenario count"
            );
        }
        debug!(title = %request.title, bytes = text.len(), "generated feature text");
        Ok(format!("{text}\n"))
    }
}
