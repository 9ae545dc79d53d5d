//! # Gatehouse
//!
//! OpenTelemetry request instrumentation middleware for axum services.
//!
//! Every request that matches a registered route gets a server span plus a
//! fixed set of metrics: a request counter, a response counter tagged with
//! the final status code, an in-flight gauge, a latency histogram, and an
//! exception counter tagged with a stable error kind. Requests that match no
//! route pass through untouched, keeping label cardinality bounded.
//!
//! ## Features
//!
//! - **Route resolution**: metrics are labeled with route templates
//!   (`/items/{id}`), never raw paths
//! - **Trace propagation**: inbound W3C `traceparent` headers parent the
//!   server span
//! - **Leak-proof accounting**: the in-flight gauge and span are finalized
//!   on every exit path, including cancellation and panics
//! - **Injected providers**: tracer and meter providers are plain values
//!   passed in by the caller, so tests can use in-memory exporters
//! - **Mode selection**: one setting switches between this middleware, a
//!   library-driven tracing layer, or no in-process instrumentation at all
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{http::Method, routing::get, Router};
//! use gatehouse::{
//!     init_logging, init_providers, install_instrumentation, RouteTable, TelemetryConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TelemetryConfig::from_env();
//!     let providers = init_providers(&config)?;
//!     init_logging(&config, Some(&providers))?;
//!
//!     let routes = Arc::new(RouteTable::new().route(Method::GET, "/items/{id}"));
//!     let app = Router::new().route("/items/{id}", get(get_item));
//!     let app = install_instrumentation(app, config.mode, &config.service_name, routes, &providers);
//!
//!     // serve `app`, then flush on exit:
//!     providers.shutdown()?;
//!     Ok(())
//! }
//! ```

mod error;
mod installer;
mod metrics;
mod middleware;
mod route;
mod router;
mod telemetry;
mod trace;

// Core middleware
pub use middleware::Instrumentation;
pub use router::InstrumentedRouter;

// Route resolution
pub use route::{ResolvedRoute, Route, RouteMatch, RouteTable};

// Metrics and error classification
pub use error::{ClassifyError, ErrorKind};
pub use metrics::{RequestAttributes, RequestMetrics};

// Span bridge
pub use trace::SpanBridge;

// Bootstrap
pub use installer::{install_instrumentation, InstrumentationMode};
pub use telemetry::{
    init_logging, init_providers, ExporterBackend, Providers, TelemetryConfig,
    TelemetryConfigBuilder, TelemetryError,
};
