//! Error types for the financial A2A orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Boundary Errors (raised, never retried)
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invocation error: {0}")]
    InvocationError(String),

    // =============================
    // Call-site Errors (absorbed into the run)
    // =============================

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Stream consumer disconnected")]
    ConsumerGone,

    // =============================
    // External Library Conversions
    // =============================

    #[error("Prompt rendering error: {0}")]
    PromptError(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
