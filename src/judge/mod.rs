//! Judge client: scores a trajectory against expected behavior.
//!
//! The judging model itself is an external service. This module sends it a
//! [`JudgeRequest`], retries transient failures with exponential backoff, and
//! returns a structured [`Verdict`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use agent_eval::judge::{HttpJudgeBackend, JudgeClient, JudgeRequest};
//!
//! let client = JudgeClient::new(Arc::new(HttpJudgeBackend::new("http://localhost:8000/judge")));
//! let verdict = client.judge(&request).await?;
//! ```

pub mod backend;
pub mod client;
pub mod types;

pub use backend::{parse_verdict, HttpJudgeBackend, JudgeBackend, LlmJudgeBackend};
pub use client::{JudgeClient, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
pub use types::{ExpectedBehavior, JudgeRequest, Metrics, PassFailStatus, Verdict};
