//! # Telemetry
//!
//! Console logging is always on: a `tracing-subscriber` registry with an
//! `EnvFilter` (`RUST_LOG`, `info` by default) and a pretty `fmt` layer
//! writing to stderr, leaving stdout to the display.
//!
//! ## Feature matrix
//!
//! - `metrics`: OpenTelemetry counters and histograms for loads and rows.
//! - `stdout`: exports those metrics to stdout every 5 seconds.
//!
//! ```bash
//! cargo run -p sluice-cli --features metrics,stdout -- --rows 200000
//! ```

// Disallow using `stdout` without `metrics`
#[cfg(all(feature = "stdout", not(feature = "metrics")))]
compile_error!("The 'stdout' feature requires 'metrics' to be enabled.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Histogram, Meter},
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::{Resource, metrics as sdkmetrics};
#[cfg(feature = "metrics")]
use opentelemetry_semantic_conventions as semvcns;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

pub struct TelemetryProviders {
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and stops every exporter. Errors are reported on stderr since
    /// logging may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "metrics")]
    let meter_provider = {
        let provider = init_metrics();
        opentelemetry::global::set_meter_provider(provider.clone());
        let scope = InstrumentationScope::builder("sluice")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(semvcns::SCHEMA_URL)
            .build();
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
        provider
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(feature = "metrics")]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("sluice")
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

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "metrics")]
static LOADS_STARTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static LOADS_REJECTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ROWS_PRODUCED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ROWS_FAILED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ROWS_DRAINED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ROWS_DROPPED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static LOAD_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = LOADS_STARTED.set(
        meter
            .u64_counter("loads_started")
            .with_description("Accepted load requests")
            .build(),
    );
    let _ = LOADS_REJECTED.set(
        meter
            .u64_counter("loads_rejected")
            .with_description("Load requests refused while loading or invalid")
            .build(),
    );
    let _ = ROWS_PRODUCED.set(
        meter
            .u64_counter("rows_produced")
            .with_description("Rows handed off by workers")
            .build(),
    );
    let _ = ROWS_FAILED.set(
        meter
            .u64_counter("rows_failed")
            .with_description("Rows whose task failed, panicked or was abandoned")
            .build(),
    );
    let _ = ROWS_DRAINED.set(
        meter
            .u64_counter("rows_drained")
            .with_description("Rows appended to the display")
            .build(),
    );
    let _ = ROWS_DROPPED.set(
        meter
            .u64_counter("rows_dropped")
            .with_description("Rows rejected by a full hand-off queue")
            .build(),
    );
    let _ = LOAD_DURATION_MS.set(
        meter
            .f64_histogram("load_duration")
            .with_unit("ms")
            .with_description("Time from load request to the last row handed off")
            .build(),
    );
}

#[cfg(feature = "metrics")]
pub fn increment_loads_started() {
    if let Some(counter) = LOADS_STARTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_loads_started() {}

#[cfg(feature = "metrics")]
pub fn increment_loads_rejected() {
    if let Some(counter) = LOADS_REJECTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_loads_rejected() {}

#[cfg(feature = "metrics")]
pub fn add_rows_produced(rows: u64) {
    if let Some(counter) = ROWS_PRODUCED.get() {
        counter.add(rows, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn add_rows_produced(_rows: u64) {}

#[cfg(feature = "metrics")]
pub fn add_rows_failed(rows: u64) {
    if let Some(counter) = ROWS_FAILED.get() {
        counter.add(rows, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn add_rows_failed(_rows: u64) {}

#[cfg(feature = "metrics")]
pub fn add_rows_drained(rows: u64) {
    if let Some(counter) = ROWS_DRAINED.get() {
        counter.add(rows, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn add_rows_drained(_rows: u64) {}

#[cfg(feature = "metrics")]
pub fn add_rows_dropped(rows: u64) {
    if let Some(counter) = ROWS_DROPPED.get() {
        counter.add(rows, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn add_rows_dropped(_rows: u64) {}

#[cfg(feature = "metrics")]
pub fn record_load_duration(duration_ms: f64) {
    if let Some(histogram) = LOAD_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_load_duration(_duration_ms: f64) {}
