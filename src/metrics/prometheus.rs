//! Prometheus metrics registration and export.
//!
//! Defines every metric agent-eval records and the functions that register
//! and export them.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Mutex, OnceLock};

/// Global Prometheus registry for all agent-eval metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total evaluations, labeled by agent and final status.
pub static EVALUATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Evaluation wall time in seconds, labeled by agent.
pub static EVALUATION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Evaluations currently in flight.
pub static ACTIVE_EVALUATIONS: OnceLock<Gauge> = OnceLock::new();

/// Trajectory steps produced by the converter, labeled by step type.
pub static TRAJECTORY_STEPS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Judge attempts, labeled by outcome (`success`, `transient`, `fatal`).
pub static JUDGE_ATTEMPTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Latency of single judge attempts in seconds.
pub static JUDGE_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Live streams that fell back to status polling.
pub static DELIVERY_FALLBACKS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Status polls, labeled by result (`ok`, `error`).
pub static RUN_POLLS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Initializes all metrics and registers them with the registry.
///
/// Call once at startup. Repeated calls keep the first registry.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric definition is invalid.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let evaluations_total = CounterVec::new(
        Opts::new("agent_eval_evaluations_total", "Total evaluations run"),
        &["agent", "status"],
    )?;

    let evaluation_duration = HistogramVec::new(
        HistogramOpts::new(
            "agent_eval_evaluation_duration_seconds",
            "Evaluation wall time in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["agent"],
    )?;

    let active_evaluations = Gauge::new(
        "agent_eval_active_evaluations",
        "Evaluations currently in flight",
    )?;

    let trajectory_steps_total = CounterVec::new(
        Opts::new(
            "agent_eval_trajectory_steps_total",
            "Trajectory steps produced by the converter",
        ),
        &["type"],
    )?;

    let judge_attempts_total = CounterVec::new(
        Opts::new("agent_eval_judge_attempts_total", "Judge attempts by outcome"),
        &["outcome"],
    )?;

    let judge_latency = Histogram::with_opts(
        HistogramOpts::new(
            "agent_eval_judge_latency_seconds",
            "Latency of single judge attempts in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )?;

    let delivery_fallbacks_total = Counter::new(
        "agent_eval_delivery_fallbacks_total",
        "Live streams that fell back to status polling",
    )?;

    let run_polls_total = CounterVec::new(
        Opts::new("agent_eval_run_polls_total", "Run status polls by result"),
        &["result"],
    )?;

    registry.register(Box::new(evaluations_total.clone()))?;
    registry.register(Box::new(evaluation_duration.clone()))?;
    registry.register(Box::new(active_evaluations.clone()))?;
    registry.register(Box::new(trajectory_steps_total.clone()))?;
    registry.register(Box::new(judge_attempts_total.clone()))?;
    registry.register(Box::new(judge_latency.clone()))?;
    registry.register(Box::new(delivery_fallbacks_total.clone()))?;
    registry.register(Box::new(run_polls_total.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = EVALUATIONS_TOTAL.set(evaluations_total);
    let _ = EVALUATION_DURATION.set(evaluation_duration);
    let _ = ACTIVE_EVALUATIONS.set(active_evaluations);
    let _ = TRAJECTORY_STEPS_TOTAL.set(trajectory_steps_total);
    let _ = JUDGE_ATTEMPTS_TOTAL.set(judge_attempts_total);
    let _ = JUDGE_LATENCY.set(judge_latency);
    let _ = DELIVERY_FALLBACKS_TOTAL.set(delivery_fallbacks_total);
    let _ = RUN_POLLS_TOTAL.set(run_polls_total);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Exports all registered metrics in Prometheus text format.
///
/// Returns a comment line instead when the registry is not initialized or
/// encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_init_has_metric_names() {
        init_metrics().expect("metrics should initialize");
        if let Some(counter) = DELIVERY_FALLBACKS_TOTAL.get() {
            counter.inc();
        }
        let text = export_metrics();
        assert!(!text.starts_with("# Error"));
        assert!(text.contains("agent_eval_delivery_fallbacks_total"));
    }
}
