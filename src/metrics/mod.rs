//! Prometheus metrics registration and export.
//!
//! Defines the pipeline's metrics and provides functions for initializing,
//! recording, and exporting them. Recording helpers are no-ops until
//! [`init_metrics`] runs, so library code can call them unconditionally.

use prometheus::{CounterVec, Encoder, GaugeVec, HistogramVec, IntCounter, Opts, Registry, TextEncoder};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus registry for all briefcast metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total messages processed, labeled by stage and outcome.
pub static MESSAGES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Stage handler duration in seconds, labeled by stage.
pub static STAGE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of messages in each queue list, labeled by queue and list.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Total speech synthesis requests, labeled by status.
pub static SPEECH_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total briefs completed end to end.
pub static BRIEFS_COMPLETED: OnceLock<IntCounter> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at application startup.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due
/// to duplicate metric names.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let messages_total = CounterVec::new(
        Opts::new("briefcast_messages_total", "Total messages processed"),
        &["stage", "outcome"],
    )?;

    let stage_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "briefcast_stage_duration_seconds",
            "Stage handler duration in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 180.0, 600.0]),
        &["stage"],
    )?;

    let queue_depth = GaugeVec::new(
        Opts::new("briefcast_queue_depth", "Messages per queue list"),
        &["queue", "list"],
    )?;

    let speech_requests_total = CounterVec::new(
        Opts::new(
            "briefcast_speech_requests_total",
            "Total speech synthesis requests",
        ),
        &["status"],
    )?;

    let briefs_completed = IntCounter::new(
        "briefcast_briefs_completed_total",
        "Total briefs completed end to end",
    )?;

    registry.register(Box::new(messages_total.clone()))?;
    registry.register(Box::new(stage_duration.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(speech_requests_total.clone()))?;
    registry.register(Box::new(briefs_completed.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = MESSAGES_TOTAL.set(messages_total);
    let _ = STAGE_DURATION.set(stage_duration);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = SPEECH_REQUESTS_TOTAL.set(speech_requests_total);
    let _ = BRIEFS_COMPLETED.set(briefs_completed);

    Ok(())
}

/// Records a processed message for a stage.
pub fn record_message(stage: &str, outcome: &str) {
    if let Some(counter) = MESSAGES_TOTAL.get() {
        counter.with_label_values(&[stage, outcome]).inc();
    }
}

/// Observes a stage handler's duration.
pub fn observe_stage_duration(stage: &str, duration: Duration) {
    if let Some(histogram) = STAGE_DURATION.get() {
        histogram
            .with_label_values(&[stage])
            .observe(duration.as_secs_f64());
    }
}

/// Sets the depth gauge for one queue list.
pub fn set_queue_depth(queue: &str, list: &str, depth: usize) {
    if let Some(gauge) = QUEUE_DEPTH.get() {
        gauge.with_label_values(&[queue, list]).set(depth as f64);
    }
}

/// Records a speech synthesis request.
pub fn record_speech_request(status: &str) {
    if let Some(counter) = SPEECH_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

/// Increments the completed-brief counter.
pub fn inc_briefs_completed() {
    if let Some(counter) = BRIEFS_COMPLETED.get() {
        counter.inc();
    }
}

/// Exports all metrics in the Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return String::new();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_are_noops_before_init() {
        // Must not panic even if init_metrics has not run in this process.
        record_message("fetch", "completed");
        observe_stage_duration("fetch", Duration::from_millis(250));
        set_queue_depth("briefcast:fetch", "pending", 3);
        record_speech_request("ok");
        inc_briefs_completed();
    }

    #[test]
    fn test_init_and_export() {
        init_metrics().expect("init should work");

        record_message("audio", "completed");
        inc_briefs_completed();

        let exported = export_metrics();
        assert!(exported.contains("briefcast_messages_total"));
        assert!(exported.contains("briefcast_briefs_completed_total"));
    }
}
