//! Local agent evaluation.
//!
//! [`AgentEvaluator`] runs one test case against an AG-UI agent endpoint,
//! converts the event stream into a trajectory and judges it.
//! [`BenchmarkRunner`] does that for every test case of a benchmark, honouring
//! a [`CancellationFlag`] between cases.

pub mod evaluator;
pub mod runner;
pub mod types;

pub use evaluator::{AgentEvaluator, AgentTransport, HttpAgentTransport, RunAgentInput};
pub use runner::{BenchmarkRunner, CancellationFlag};
pub use types::{
    Benchmark, BenchmarkReport, EvaluationResult, EvaluationStatus, ReportSummary, TestCase,
};
