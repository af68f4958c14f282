//! agent-eval: trajectory-based evaluation of AG-UI agents.
//!
//! The crate turns the event stream an agent emits while it works into an
//! ordered trajectory, scores that trajectory with an external judge, and
//! delivers whole benchmark runs either from a local runner or from a remote
//! evaluation server with polling fallback.

pub mod cli;
pub mod config;
pub mod converter;
pub mod delivery;
pub mod error;
pub mod evaluation;
pub mod events;
pub mod judge;
pub mod llm;
pub mod metrics;
pub mod storage;
pub mod stream;
pub mod trajectory;

// Re-export commonly used error types
pub use error::{ConfigError, DeliveryError, JudgeError, LlmError, StorageError, StreamError};
