//! Log and OpenTelemetry setup for the `disco` binary.
//!
//! Without an OTLP endpoint, events go to stderr through a plain fmt layer.
//! With one, spans, metrics and log records are also exported over gRPC,
//! tagged with the service name and the deployment environment.

pub mod metrics;
pub mod workflow;

use std::fmt::Display;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::Config;
use crate::error::{Error, Result};

/// Resource attribute naming the deployment a process belongs to.
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment.name";

const SCOPE: &str = "disco-rs";

pub struct TelemetryConfig {
    /// OTLP gRPC endpoint. `None` logs to stderr only.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// The `DISCO_ENV` namespace this process runs under.
    pub environment: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl TelemetryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.otel_endpoint.clone(),
            service_name: "disco".to_string(),
            environment: config.env.clone(),
            log_level: config.log_level.clone(),
        }
    }

    /// What every exported signal is tagged with.
    pub fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes([
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT, self.environment.clone()),
            ])
            .build()
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}

/// The three OTLP pipelines, flushed and shut down together.
struct Exporters {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Exporters {
    fn build(endpoint: &str, resource: Resource) -> Result<Self> {
        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;

        Ok(Self {
            tracer: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meter: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logger: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }

    fn force_flush(&self) {
        let _ = self.tracer.force_flush();
        let _ = self.meter.force_flush();
        let _ = self.logger.force_flush();
    }

    /// Logs first, so records emitted while the others stop still go out.
    fn shutdown(&self) {
        let _ = self.logger.shutdown();
        let _ = self.meter.shutdown();
        let _ = self.tracer.shutdown();
    }
}

fn exporter_error(signal: &str, e: impl Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {e}"))
}

fn subscriber_error(e: impl Display) -> Error {
    Error::Other(format!("failed to init tracing subscriber: {e}"))
}

/// Hold for the life of the process; dropping it flushes and stops export.
pub struct TelemetryGuard {
    exporters: Option<Exporters>,
}

impl TelemetryGuard {
    pub fn force_flush(&self) {
        if let Some(exporters) = &self.exporters {
            exporters.force_flush();
        }
    }

    pub fn is_exporting(&self) -> bool {
        self.exporters.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(exporters) = self.exporters.take() {
            exporters.shutdown();
        }
    }
}

/// Install the global subscriber, and the OTLP pipelines when configured.
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let registry = tracing_subscriber::registry().with(config.filter());

    let Some(endpoint) = config.endpoint.as_deref() else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(subscriber_error)?;
        return Ok(TelemetryGuard { exporters: None });
    };

    let exporters = Exporters::build(endpoint, config.resource())?;
    opentelemetry::global::set_meter_provider(exporters.meter.clone());

    let traces = tracing_opentelemetry::layer().with_tracer(exporters.tracer.tracer(SCOPE));
    let logs = OpenTelemetryTracingBridge::new(&exporters.logger);
    registry
        .with(tracing_subscriber::fmt::layer().compact())
        .with(traces)
        .with(logs)
        .try_init()
        .map_err(subscriber_error)?;

    Ok(TelemetryGuard {
        exporters: Some(exporters),
    })
}
