//! Instrumentation mode selection
//!
//! One enumerated setting decides how a service gets instrumented: this
//! crate's middleware with custom metrics and manual spans, a fully
//! library-driven tracing layer, or nothing at all because an external agent
//! owns instrumentation. Exactly one strategy is installed at startup.

use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::TracerProvider as _;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::Instrumentation;
use crate::route::RouteTable;
use crate::router::InstrumentedRouter;
use crate::telemetry::{Providers, TelemetryError};

/// Instrumentation scope name stamped on this crate's meter and tracer.
pub(crate) const SCOPE_NAME: &str = "gatehouse-middleware";

/// Which instrumentation strategy to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstrumentationMode {
    /// Custom metrics and manual spans via this crate's middleware.
    #[default]
    Manual,
    /// Library-driven instrumentation only (request tracing layer).
    Auto,
    /// No in-process instrumentation; an external agent is expected.
    External,
}

impl InstrumentationMode {
    /// String form used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::External => "external",
        }
    }

    /// Read the mode from `INSTRUMENTATION_MODE`, defaulting to manual.
    pub fn from_env() -> Self {
        std::env::var("INSTRUMENTATION_MODE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for InstrumentationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentationMode {
    type Err = TelemetryError;

    /// Accepts the names and the legacy numeric levels (`0`/`1`/`2`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" | "0" => Ok(Self::Manual),
            "auto" | "1" => Ok(Self::Auto),
            "external" | "agent" | "2" => Ok(Self::External),
            other => Err(TelemetryError::Config(format!(
                "unknown instrumentation mode: {other}"
            ))),
        }
    }
}

/// Install exactly one instrumentation strategy on the router.
///
/// - [`Manual`](InstrumentationMode::Manual): this crate's middleware, built
///   from the injected providers and the given route table.
/// - [`Auto`](InstrumentationMode::Auto): a `tower-http` request tracing
///   layer; no custom instruments.
/// - [`External`](InstrumentationMode::External): the router is returned
///   unchanged.
pub fn install_instrumentation<S>(
    router: Router<S>,
    mode: InstrumentationMode,
    service_name: &str,
    routes: Arc<RouteTable>,
    providers: &Providers,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    info!(service = service_name, mode = %mode, "installing instrumentation");
    match mode {
        InstrumentationMode::Manual => {
            let meter = providers.meter_provider().meter(SCOPE_NAME);
            let tracer = providers.tracer_provider().tracer(SCOPE_NAME);
            let instrumentation =
                Arc::new(Instrumentation::new(service_name, routes, &meter, tracer));
            router.with_instrumentation(instrumentation)
        }
        InstrumentationMode::Auto => router.layer(TraceLayer::new_for_http()),
        InstrumentationMode::External => router,
    }
}
