//! Prometheus-based metrics for agent-eval.
//!
//! Tracks evaluations, converter output, judge attempts and delivery
//! fallbacks.
//!
//! # Example
//!
//! ```ignore
//! use agent_eval::metrics::{export_metrics, init_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! let collector = MetricsCollector::new();
//! collector.record_fallback();
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{JudgeOutcome, MetricsCollector};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_EVALUATIONS, DELIVERY_FALLBACKS_TOTAL, EVALUATIONS_TOTAL, EVALUATION_DURATION,
    JUDGE_ATTEMPTS_TOTAL, JUDGE_LATENCY, REGISTRY, RUN_POLLS_TOTAL, TRAJECTORY_STEPS_TOTAL,
};
