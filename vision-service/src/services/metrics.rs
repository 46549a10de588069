//! Prometheus metrics for vision-service.
//!
//! Recording helpers are no-ops until `init_metrics` has run, so library
//! code and tests can call them unconditionally.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Registry plus every series the service records, published as one value.
struct Metrics {
    registry: Registry,
    vision_requests: IntCounterVec,
    provider_latency: HistogramVec,
    provider_errors: IntCounterVec,
    provider_tokens: IntCounterVec,
    image_fetch_duration: Histogram,
    image_fetch_errors: IntCounterVec,
    conversations_active: IntGauge,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let vision_requests = IntCounterVec::new(
            Opts::new("vision_requests_total", "Total vision chat requests"),
            &["outcome"],
        )
        .expect("Failed to create vision_requests_total metric");

        let provider_latency = HistogramVec::new(
            HistogramOpts::new(
                "provider_latency_seconds",
                "AI provider API latency in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["operation"],
        )
        .expect("Failed to create provider_latency_seconds metric");

        let provider_errors = IntCounterVec::new(
            Opts::new("provider_errors_total", "Total AI provider errors"),
            &["operation", "error_type"],
        )
        .expect("Failed to create provider_errors_total metric");

        let provider_tokens = IntCounterVec::new(
            Opts::new("provider_tokens_total", "Total tokens processed"),
            &["type"], // type: input, output
        )
        .expect("Failed to create provider_tokens_total metric");

        let image_fetch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "image_fetch_duration_seconds",
                "Image download duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("Failed to create image_fetch_duration_seconds metric");

        let image_fetch_errors = IntCounterVec::new(
            Opts::new("image_fetch_errors_total", "Total image download errors"),
            &["error_type"],
        )
        .expect("Failed to create image_fetch_errors_total metric");

        let conversations_active = IntGauge::new(
            "conversations_active",
            "Number of users with a conversation history",
        )
        .expect("Failed to create conversations_active metric");

        registry
            .register(Box::new(vision_requests.clone()))
            .expect("Failed to register vision_requests_total");
        registry
            .register(Box::new(provider_latency.clone()))
            .expect("Failed to register provider_latency_seconds");
        registry
            .register(Box::new(provider_errors.clone()))
            .expect("Failed to register provider_errors_total");
        registry
            .register(Box::new(provider_tokens.clone()))
            .expect("Failed to register provider_tokens_total");
        registry
            .register(Box::new(image_fetch_duration.clone()))
            .expect("Failed to register image_fetch_duration_seconds");
        registry
            .register(Box::new(image_fetch_errors.clone()))
            .expect("Failed to register image_fetch_errors_total");
        registry
            .register(Box::new(conversations_active.clone()))
            .expect("Failed to register conversations_active");

        tracing::info!("Prometheus metrics initialized");

        Self {
            registry,
            vision_requests,
            provider_latency,
            provider_errors,
            provider_tokens,
            image_fetch_duration,
            image_fetch_errors,
            conversations_active,
        }
    }
}

/// Initialize all metrics. Safe to call from any number of threads; the
/// registry is built once and every caller sees the same one.
pub fn init_metrics() {
    METRICS.get_or_init(Metrics::new);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match METRICS.get() {
        Some(m) => &m.registry,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

// Helper functions for recording metrics

/// Record a finished vision request by outcome (ok, invalid_request, ...).
pub fn record_vision_request(outcome: &str) {
    if let Some(counter) = METRICS.get().map(|m| &m.vision_requests) {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record provider latency for an operation (upload, generate).
pub fn record_provider_latency(operation: &str, duration_secs: f64) {
    if let Some(histogram) = METRICS.get().map(|m| &m.provider_latency) {
        histogram
            .with_label_values(&[operation])
            .observe(duration_secs);
    }
}

/// Record a provider error.
pub fn record_provider_error(operation: &str, error_type: &str) {
    if let Some(counter) = METRICS.get().map(|m| &m.provider_errors) {
        counter.with_label_values(&[operation, error_type]).inc();
    }
}

/// Record token usage of a chat call.
pub fn record_tokens(input_tokens: i32, output_tokens: i32) {
    if let Some(counter) = METRICS.get().map(|m| &m.provider_tokens) {
        counter
            .with_label_values(&["input"])
            .inc_by(input_tokens.max(0) as u64);
        counter
            .with_label_values(&["output"])
            .inc_by(output_tokens.max(0) as u64);
    }
}

/// Record a successful image download.
pub fn record_image_fetch(duration_secs: f64) {
    if let Some(histogram) = METRICS.get().map(|m| &m.image_fetch_duration) {
        histogram.observe(duration_secs);
    }
}

/// Record a failed image download.
pub fn record_image_fetch_error(error_type: &str) {
    if let Some(counter) = METRICS.get().map(|m| &m.image_fetch_errors) {
        counter.with_label_values(&[error_type]).inc();
    }
}

/// Set the number of users holding a history.
pub fn set_conversations_active(count: usize) {
    if let Some(gauge) = METRICS.get().map(|m| &m.conversations_active) {
        gauge.set(count as i64);
    }
}
