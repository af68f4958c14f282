//! Error types for agent-eval operations.
//!
//! Defines the error types for every subsystem that can fail:
//! - Live event streams (transport and record handling)
//! - Judge calls and retry exhaustion
//! - Evaluation delivery (live phase, fallback polling)
//! - LLM API interactions
//! - Configuration loading
//! - Report storage
//!
//! The event converter has no error type: malformed input degrades to raw
//! fallbacks and unknown references are ignored.

use thiserror::Error;

/// Errors raised while consuming a live event stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Unable to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Stream request to {url} failed with HTTP {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Remote reported an error: {0}")]
    Remote(String),

    #[error("Failed to serialize stream request: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while obtaining a verdict from the judge.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Cannot reach the judge service at {endpoint}: {message}. Check that the service is running and the URL is correct")]
    Connectivity { endpoint: String, message: String },

    #[error("Judge service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Judge returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Judge is not configured: {0}")]
    Configuration(String),

    #[error("Judge evaluation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<JudgeError>,
    },
}

impl JudgeError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            JudgeError::Connectivity { .. } | JudgeError::InvalidResponse(_) => true,
            JudgeError::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            JudgeError::Configuration(_) | JudgeError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<LlmError> for JudgeError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Connection { endpoint, message } => {
                JudgeError::Connectivity { endpoint, message }
            }
            LlmError::RateLimited(message) => JudgeError::Api {
                status: 429,
                message,
            },
            LlmError::ApiError { code, message } => JudgeError::Api {
                status: code,
                message,
            },
            LlmError::ParseError(message) => JudgeError::InvalidResponse(message),
            LlmError::MissingApiBase => {
                JudgeError::Configuration("LITELLM_API_BASE is not set".to_string())
            }
            LlmError::RequestFailed(message) => JudgeError::InvalidResponse(message),
        }
    }
}

/// Errors that can occur while delivering an evaluation.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Evaluation stream ended before the run was started")]
    StreamEnded,

    #[error("Failed to poll run {run_id}: {message}")]
    Poll { run_id: String, message: String },
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("Unable to reach LLM endpoint {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that can occur during report storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Invalid report id '{0}'")]
    InvalidId(String),
}
