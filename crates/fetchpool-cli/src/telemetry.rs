//! # Telemetry Features
//!
//! This binary supports optional telemetry using the `tracing` and `metrics`
//! crates, exported via OpenTelemetry to stdout.
//!
//! ## Feature matrix
//!
//! - `tracing`: Enables OpenTelemetry distributed tracing (via spans) and the
//!   worker pool's own `tracing` events.
//! - `metrics`: Enables OpenTelemetry metrics (via counters, histograms, etc.).
//! - `stdout`: Enables the stdout OpenTelemetry exporter.
//!
//! ## Feature constraints
//!
//! - The `stdout` exporter requires at least one of: `tracing` or `metrics`.
//!
//! ## Span behavior
//!
//! - Spans created via `tracing::info_span!` (and the pool's instrumented
//!   `run`) are exported to any enabled telemetry backend
//! - Events outside of a span are only shown in log output (via
//!   `fmt::layer()`), not exported
//!
//! ## Metrics behavior
//!
//! - Per-fetch metrics are recorded by
//!   [`InstrumentedFetcher`](crate::instrument::InstrumentedFetcher); the batch
//!   duration is recorded by `main`
//!
//! ## Example usage
//!
//! Enable tracing and metrics, exported to stdout:
//!
//! ```bash
//! cargo run --features tracing,metrics,stdout -- https://example.com
//! ```

// Disallow using `stdout` without `tracing` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

// Core imports - always needed
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// Metrics-specific imports
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "tracing")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Shuts down every enabled provider, exporting whatever is still
    /// buffered. Errors go to stderr since the subscriber may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "tracing")]
        if let Err(err) = self.tracer_provider.shutdown() {
            eprintln!("Error shutting down tracer: {err:?}");
        }

        #[cfg(feature = "metrics")]
        if let Err(err) = self.meter_provider.shutdown() {
            eprintln!("Error shutting down meter: {err:?}");
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "tracing")]
    let tracer_provider = init_tracer();

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let scope = InstrumentationScope::builder("fetchpool")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Always subscribe to standard tracing logs printed to stderr via
    // `tracing_subscriber::fmt`, keeping stdout free for the report. This is
    // unrelated to the `opentelemetry_stdout` exporter.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        );

    #[cfg(feature = "tracing")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    // Metrics are recorded through the handles below, not through tracing
    // events, so no metrics layer joins the subscriber.
    #[cfg(feature = "metrics")]
    {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
    }

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "tracing"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("fetchpool")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    // A batch rarely outlives one export interval; shutdown exports the rest.
    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .build(),
    );

    builder.build()
}

#[cfg(feature = "tracing")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    // Few spans per run, so export each one as it closes.
    #[cfg(feature = "stdout")]
    let builder = builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default());

    builder.build()
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static FETCHES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static FETCH_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static FETCHES_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static FETCH_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BATCH_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = FETCHES.set(
        meter
            .u64_counter("fetches")
            .with_description("Total fetches started")
            .build(),
    );

    let _ = FETCH_FAILURES.set(
        meter
            .u64_counter("fetch_failures")
            .with_description("Fetches that failed in transport or while reading the body")
            .build(),
    );

    let _ = FETCHES_INFLIGHT.set(
        meter
            .i64_up_down_counter("fetches_inflight")
            .with_description("Concurrent fetches (bounded by the worker count)")
            .build(),
    );

    let _ = FETCH_DURATION_MS.set(
        meter
            .f64_histogram("fetch_duration")
            .with_unit("ms")
            .with_description("Request plus body read duration")
            .build(),
    );

    let _ = BATCH_DURATION_MS.set(
        meter
            .f64_histogram("batch_duration")
            .with_unit("ms")
            .with_description("End-to-end batch duration including worker shutdown")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_fetches() {
    if let Some(counter) = FETCHES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_fetches() {}

#[cfg(feature = "metrics")]
pub fn increment_fetch_failures() {
    if let Some(counter) = FETCH_FAILURES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_fetch_failures() {}

#[cfg(feature = "metrics")]
pub fn increment_fetches_inflight() {
    if let Some(counter) = FETCHES_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_fetches_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_fetches_inflight() {
    if let Some(counter) = FETCHES_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_fetches_inflight() {}

#[cfg(feature = "metrics")]
pub fn record_fetch_duration(duration_ms: f64) {
    if let Some(histogram) = FETCH_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_fetch_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn record_batch_duration(duration_ms: f64) {
    if let Some(histogram) = BATCH_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_batch_duration(_duration_ms: f64) {}
