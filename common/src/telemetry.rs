// Telemetry module for structured logging, metrics, and tracing

use crate::config::ObservabilityConfig;
use crate::models::TriggerCategory;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "krittics-scheduler";

/// Install the global subscriber: JSON logs, plus OTLP spans when an
/// endpoint is configured
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", config.log_level, e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_filter(env_filter);

    let otel_layer = match config.tracing_endpoint.as_deref() {
        Some(endpoint) => Some(tracing_opentelemetry::layer().with_tracer(init_tracer(endpoint)?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(json_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(
        log_level = %config.log_level,
        tracing_endpoint = config.tracing_endpoint.as_deref(),
        "Logging initialized"
    );

    Ok(())
}

fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let tracer = tracer_provider.tracer(SERVICE_NAME);

    Ok(tracer)
}

/// Flush buffered spans before exit
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Initialize Prometheus metrics exporter
///
/// Registers:
/// - trigger_fired_total: Counter of fired trigger points by category
/// - trigger_pause_failed_total: Counter of pause requests the player refused
/// - trigger_reset_total: Counter of scheduler resets
/// - trigger_fire_offset_seconds: Histogram of how far from its offset a point fired
/// - playback_progress_checkpoint_total: Counter of saved progress checkpoints
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!("trigger_fired_total", "Total number of fired trigger points");
    describe_counter!(
        "trigger_pause_failed_total",
        "Total number of pause requests the player could not honor"
    );
    describe_counter!("trigger_reset_total", "Total number of trigger scheduler resets");
    describe_histogram!(
        "trigger_fire_offset_seconds",
        "Distance between playback time and trigger offset when a point fired"
    );
    describe_counter!(
        "playback_progress_checkpoint_total",
        "Total number of saved playback progress checkpoints"
    );

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

/// Record a fired trigger point
#[inline]
pub fn record_trigger_fired(category: TriggerCategory, offset_seconds: f64) {
    counter!("trigger_fired_total", "category" => category.as_str()).increment(1);
    histogram!("trigger_fire_offset_seconds", "category" => category.as_str())
        .record(offset_seconds);
}

#[inline]
pub fn record_pause_failure(category: TriggerCategory) {
    counter!("trigger_pause_failed_total", "category" => category.as_str()).increment(1);
}

#[inline]
pub fn record_trigger_reset() {
    counter!("trigger_reset_total").increment(1);
}

#[inline]
pub fn record_progress_checkpoint(completed: bool) {
    counter!(
        "playback_progress_checkpoint_total",
        "completed" => if completed { "true" } else { "false" }
    )
    .increment(1);
}
