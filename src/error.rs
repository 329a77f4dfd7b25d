//! Error taxonomy surfaced to the chat UI.
//!
//! Transport failures are classified once, inside the completion client, so
//! nothing above it ever looks at status codes or `reqwest` errors.

use thiserror::Error;

/// Required settings are missing or still hold placeholder values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Azure OpenAI API key is not configured. Set AZURE_OPENAI_KEY or add it to config.toml.")]
    MissingApiKey,

    #[error("Azure OpenAI endpoint is not configured. Set AZURE_OPENAI_ENDPOINT or add it to config.toml.")]
    MissingEndpoint,

    #[error("Azure OpenAI deployment name is not configured. Set AZURE_OPENAI_DEPLOYMENT or add it to config.toml.")]
    MissingDeployment,
}

/// A completion request reached (or tried to reach) the provider and failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// HTTP 401
    #[error("Invalid API key. Please check your Azure OpenAI credentials.")]
    Unauthorized,

    /// HTTP 404, almost always a wrong deployment name
    #[error("Deployment not found. Please check your deployment name.")]
    NotFound,

    /// HTTP 429. Not retried by the client.
    #[error("Rate limit exceeded. Please wait {} and try again.", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    #[error("Network error. Please check your internet connection and endpoint URL. ({0})")]
    Network(String),

    #[error("{0}")]
    Unknown(String),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(1) => "1 second".to_string(),
        Some(secs) => format!("{} seconds", secs),
        None => "a moment".to_string(),
    }
}

/// Any failure of a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CompletionError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, CompletionError::Configuration(_))
    }
}

/// Persisting the conversation failed. In-memory state is still authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not persist chat history: {0}")]
pub struct StorageWarning(pub String);
