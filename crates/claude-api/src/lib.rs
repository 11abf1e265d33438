//! `claude-api`: thin Anthropic Messages API client and the two model-backed
//! collaborators the forge uses.
//!
//! # Architecture
//!
//! ```text
//! LlmConfig (forge-core)
//!     │
//!     ▼
//! ClaudeClient      ← one POST /v1/messages per call, no retries
//!     │
//!     ├──▶ ClaudeGenerator  ← FeatureGenerator: story → Gherkin text
//!     └──▶ ClaudeScorer     ← ComplexityScorer: Gherkin → ComplexityAnalysis
//! ```
//!
//! Both collaborators are traits so the server and tests can substitute
//! their own implementations.

pub mod client;
pub mod error;
pub mod generator;
pub mod output;
pub mod scorer;
pub mod types;

pub use client::ClaudeClient;
pub use error::ClaudeApiError;
pub use generator::{ClaudeGenerator, FeatureGenerator, GenerationRequest};
pub use scorer::{parse_analysis, ClaudeScorer, ComplexityScorer};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeApiError>;
