//! Telemetry initialization for structured logging and OpenTelemetry export
//!
//! - JSON structured logging filtered by `RUST_LOG`
//! - OTLP export of spans and of the [`crate::metrics`] instruments when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` is set
//! - Kubernetes resource detection from downward-API environment variables

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str =
    "info,remotecluster=debug,kube=info,tower=warn,hyper=warn,russh=warn";

/// Environment variable naming the OTLP collector
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// An OTLP exporter could not be built
    #[error("failed to build OTLP {signal} exporter: {message}")]
    Export {
        /// `traces` or `metrics`
        signal: &'static str,
        /// Exporter build error
        message: String,
    },

    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for traces and metrics
    pub service_name: String,

    /// OTLP endpoint (e.g., "http://otel-collector:4317").
    /// If None, logs are only written locally.
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    /// Config for `service_name`. A blank endpoint counts as unset.
    pub fn new(service_name: impl Into<String>, otlp_endpoint: Option<String>) -> Self {
        Self {
            service_name: service_name.into(),
            otlp_endpoint: otlp_endpoint
                .map(|endpoint| endpoint.trim().to_string())
                .filter(|endpoint| !endpoint.is_empty()),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new(
            "remotecluster-operator",
            std::env::var(OTLP_ENDPOINT_ENV).ok(),
        )
    }
}

/// Initialize telemetry with the given configuration
///
/// Must be called once, from within a tokio runtime when an OTLP endpoint is
/// configured (the batch exporters spawn onto it).
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = build_resource(&config.service_name);

    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let tracer = install_otlp_export(endpoint, resource)?.tracer(config.service_name);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::SubscriberInit(e.to_string())
        })?;

    Ok(())
}

/// Build OpenTelemetry resource with service info and K8s detection
fn build_resource(service_name: &str) -> Resource {
    let mut attributes = vec![KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        service_name.to_string(),
    )];

    for (var, key) in [
        ("POD_NAME", "k8s.pod.name"),
        ("POD_NAMESPACE", "k8s.namespace.name"),
        ("NODE_NAME", "k8s.node.name"),
    ] {
        if let Ok(value) = std::env::var(var) {
            attributes.push(KeyValue::new(key, value));
        }
    }

    attributes.push(KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
        env!("CARGO_PKG_VERSION"),
    ));

    Resource::new(attributes)
}

/// Install span and metric export to the collector at `endpoint`
///
/// The meter provider becomes the global one that [`crate::metrics`] records
/// to. The tracer provider is returned for the `tracing` bridge layer and is
/// registered globally as well.
fn install_otlp_export(
    endpoint: &str,
    resource: Resource,
) -> Result<TracerProvider, TelemetryError> {
    let spans = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Export {
            signal: "traces",
            message: e.to_string(),
        })?;
    let metrics = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Export {
            signal: "metrics",
            message: e.to_string(),
        })?;

    global::set_meter_provider(
        SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(metrics, runtime::Tokio).build())
            .with_resource(resource.clone())
            .build(),
    );

    let tracers = TracerProvider::builder()
        .with_batch_exporter(spans, runtime::Tokio)
        .with_resource(resource)
        .build();
    global::set_tracer_provider(tracers.clone());

    Ok(tracers)
}
