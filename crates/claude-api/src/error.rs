use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeApiError {
    #[error("API key not set: export {0}")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("response contained no text content")]
    EmptyResponse,

    #[error("model output is not valid JSON: {source}\n  output: {output}")]
    Parse {
        output: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Analysis(#[from] forge_core::ForgeError),
}

impl ClaudeApiError {
    /// Whether the failure came from the remote side (or the network) rather
    /// than from local configuration.
    pub fn is_upstream(&self) -> bool {
        !matches!(self, ClaudeApiError::MissingApiKey(_))
    }
}
