//! Resilient delivery of evaluation runs from the evaluation server.
//!
//! Live push over an event stream is preferred; status polling is the safety
//! net for dropped connections. See [`pipeline`] for the phase rules.

pub mod pipeline;
pub mod types;

pub use pipeline::{
    DeliveryConfig, DeliveryPipeline, EvaluationTransport, HttpEvaluationTransport,
    HttpRunStatusSource, RecordHandler, RunStatusSource, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_TIMEOUT,
};
pub use types::{
    DeliveryOutcome, DeliveryPath, EvaluationRequest, ProgressUpdate, RunState, StreamRecord,
};
