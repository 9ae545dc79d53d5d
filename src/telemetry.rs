//! Telemetry bootstrap: providers, configuration, logging
//!
//! Builds the tracer and meter providers the middleware records into, plus
//! the tracing subscriber for process logs. Providers are returned as plain
//! values and passed by reference wherever they are needed — nothing is
//! registered in the global OpenTelemetry registries, so tests can construct
//! providers over in-memory exporters and production code owns shutdown
//! explicitly.

use std::env;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::installer::{InstrumentationMode, SCOPE_NAME};

/// Telemetry initialization errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid configuration value.
    #[error("invalid telemetry configuration: {0}")]
    Config(String),
    /// An exporter could not be constructed.
    #[error("failed to build exporter: {0}")]
    Exporter(String),
    /// The tracing subscriber was already installed or failed to install.
    #[error("failed to initialize tracing subscriber: {0}")]
    Subscriber(String),
    /// Flushing or shutting down a provider failed.
    #[error("telemetry shutdown failed: {0}")]
    Shutdown(String),
}

/// Where spans and metrics are exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExporterBackend {
    /// Push to an OTLP collector over gRPC.
    Otlp {
        /// Collector endpoint, e.g. `http://localhost:4317`.
        endpoint: String,
    },
    /// Print to stdout; for local debugging only.
    Stdout,
}

impl Default for ExporterBackend {
    fn default() -> Self {
        Self::Otlp {
            endpoint: "http://localhost:4317".to_string(),
        }
    }
}

/// Complete telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, stamped on the resource as `service.name` and
    /// `compose_service` (the latter links traces to aggregated logs).
    pub service_name: String,
    /// Which instrumentation strategy the installer applies.
    pub mode: InstrumentationMode,
    /// Span/metric export backend.
    pub exporter: ExporterBackend,
    /// Interval between metric exports.
    pub export_interval: Duration,
    /// Attach an OpenTelemetry layer to the tracing subscriber so log events
    /// carry trace/span ids.
    pub log_correlation: bool,
    /// Emit log events as JSON lines instead of human-readable text.
    pub log_json: bool,
    /// Log filter directive when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "app".to_string(),
            mode: InstrumentationMode::default(),
            exporter: ExporterBackend::default(),
            export_interval: Duration::from_secs(5),
            log_correlation: true,
            log_json: false,
            log_filter: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: service name (default: "app")
    /// - `INSTRUMENTATION_MODE`: "manual", "auto", or "external", also the
    ///   legacy levels "0"/"1"/"2" (default: "manual")
    /// - `TELEMETRY_EXPORTER`: "otlp" or "stdout" (default: "otlp")
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector endpoint for OTLP
    ///   (default: "http://localhost:4317")
    /// - `OTEL_METRIC_EXPORT_INTERVAL`: export interval in milliseconds
    ///   (default: 5000)
    /// - `LOG_CORRELATION`: attach trace ids to log events (default: "true")
    /// - `LOG_FORMAT`: "json" for JSON lines, anything else for text
    ///   (default: text)
    /// - `RUST_LOG`: log filter directive (default: "info")
    pub fn from_env() -> Self {
        let exporter = match env::var("TELEMETRY_EXPORTER").as_deref() {
            Ok("stdout") => ExporterBackend::Stdout,
            _ => ExporterBackend::Otlp {
                endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            },
        };

        let export_interval = env::var("OTEL_METRIC_EXPORT_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(5));

        let log_correlation = env::var("LOG_CORRELATION")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let log_json = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Self {
            service_name: env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "app".to_string()),
            mode: InstrumentationMode::from_env(),
            exporter,
            export_interval,
            log_correlation,
            log_json,
            log_filter: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Create a new configuration builder.
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Default)]
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    /// Set the service name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Set the instrumentation mode.
    pub fn mode(mut self, mode: InstrumentationMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the exporter backend.
    pub fn exporter(mut self, exporter: ExporterBackend) -> Self {
        self.config.exporter = exporter;
        self
    }

    /// Set the metric export interval.
    pub fn export_interval(mut self, interval: Duration) -> Self {
        self.config.export_interval = interval;
        self
    }

    /// Enable or disable trace/log correlation.
    pub fn log_correlation(mut self, enable: bool) -> Self {
        self.config.log_correlation = enable;
        self
    }

    /// Emit log events as JSON lines instead of human-readable text.
    pub fn log_json(mut self, enable: bool) -> Self {
        self.config.log_json = enable;
        self
    }

    /// Set the log filter directive.
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TelemetryConfig {
        self.config
    }
}

/// The explicitly owned tracer and meter providers.
///
/// Hand these (by reference) to the installer and middleware; call
/// [`shutdown`](Self::shutdown) on exit to flush pending exports.
#[derive(Debug)]
pub struct Providers {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl Providers {
    /// Assemble providers from already-built parts (used by tests to inject
    /// in-memory exporters).
    pub fn new(tracer_provider: SdkTracerProvider, meter_provider: SdkMeterProvider) -> Self {
        Self {
            tracer_provider,
            meter_provider,
        }
    }

    /// The tracer provider spans are created from.
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    /// The meter provider instruments are created from.
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    /// Flush and shut down both providers.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        self.tracer_provider
            .shutdown()
            .map_err(|e| TelemetryError::Shutdown(e.to_string()))?;
        self.meter_provider
            .shutdown()
            .map_err(|e| TelemetryError::Shutdown(e.to_string()))?;
        Ok(())
    }
}

/// Build the tracer and meter providers for the configured backend.
///
/// The resource carries `service.name` plus a `compose_service` attribute
/// with the same value, which log aggregation uses to join traces and logs.
pub fn init_providers(config: &TelemetryConfig) -> Result<Providers, TelemetryError> {
    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("compose_service", config.service_name.clone()),
        ])
        .build();

    let providers = match &config.exporter {
        ExporterBackend::Otlp { endpoint } => {
            use opentelemetry_otlp::WithExportConfig;

            let span_exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?;
            let tracer_provider = SdkTracerProvider::builder()
                .with_batch_exporter(span_exporter)
                .with_resource(resource.clone())
                .build();

            let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| TelemetryError::Exporter(e.to_string()))?;
            let reader = PeriodicReader::builder(metric_exporter)
                .with_interval(config.export_interval)
                .build();
            let meter_provider = SdkMeterProvider::builder()
                .with_reader(reader)
                .with_resource(resource)
                .build();

            info!(%endpoint, "OTLP telemetry exporters configured");
            Providers::new(tracer_provider, meter_provider)
        }
        ExporterBackend::Stdout => {
            let tracer_provider = SdkTracerProvider::builder()
                .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
                .with_resource(resource.clone())
                .build();
            let reader = PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                .with_interval(config.export_interval)
                .build();
            let meter_provider = SdkMeterProvider::builder()
                .with_reader(reader)
                .with_resource(resource)
                .build();

            info!("stdout telemetry exporters configured");
            Providers::new(tracer_provider, meter_provider)
        }
    };

    Ok(providers)
}

/// Initialize the tracing subscriber.
///
/// This must be called once at startup, before any logging occurs. When
/// `log_correlation` is enabled and providers are given, log events are
/// bridged onto the trace pipeline so they carry trace and span ids.
pub fn init_logging(
    config: &TelemetryConfig,
    providers: Option<&Providers>,
) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| TelemetryError::Config(format!("invalid log filter: {e}")))?;

    let fmt_layer: Box<dyn Layer<_> + Send + Sync> = if config.log_json {
        Box::new(tracing_subscriber::fmt::layer().json())
    } else {
        Box::new(tracing_subscriber::fmt::layer())
    };
    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);

    match providers.filter(|_| config.log_correlation) {
        Some(providers) => {
            use opentelemetry::trace::TracerProvider as _;
            let tracer = providers.tracer_provider().tracer(SCOPE_NAME);
            registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;
        }
        None => {
            registry
                .try_init()
                .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "app");
        assert_eq!(config.mode, InstrumentationMode::Manual);
        assert_eq!(config.export_interval, Duration::from_secs(5));
        assert!(config.log_correlation);
        assert!(!config.log_json);
        assert!(matches!(config.exporter, ExporterBackend::Otlp { .. }));
    }

    #[test]
    fn test_builder() {
        let config = TelemetryConfig::builder()
            .service_name("orders")
            .mode(InstrumentationMode::External)
            .exporter(ExporterBackend::Stdout)
            .export_interval(Duration::from_secs(1))
            .log_correlation(false)
            .log_json(true)
            .log_filter("debug")
            .build();

        assert_eq!(config.service_name, "orders");
        assert_eq!(config.mode, InstrumentationMode::External);
        assert_eq!(config.exporter, ExporterBackend::Stdout);
        assert_eq!(config.export_interval, Duration::from_secs(1));
        assert!(!config.log_correlation);
        assert!(config.log_json);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_stdout_providers_shutdown_cleanly() {
        let config = TelemetryConfig::builder()
            .exporter(ExporterBackend::Stdout)
            .build();
        let providers = init_providers(&config).unwrap();
        providers.shutdown().unwrap();
    }
}
