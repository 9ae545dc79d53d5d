//! Request instrumentation middleware
//!
//! The orchestrator for each request: resolve the route, start a server span,
//! update the request counter and in-flight gauge, await the downstream
//! handler, then record the outcome. The terminal bookkeeping (response
//! counter, in-flight decrement, span end) runs on every exit path, carried
//! by a drop guard so that cancellation and panics cannot leak the gauge or
//! leave the span open.
//!
//! Requests whose route does not resolve bypass instrumentation entirely:
//! unknown paths would otherwise blow up label cardinality, so they are
//! forwarded untouched with no metric or span side effects.
//!
//! Known limitation, kept on purpose: the duration histogram is only updated
//! on the success path. A failed request shows up in the exception counter
//! but contributes no latency sample, so failed-request latency is not
//! observable from these instruments.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use opentelemetry::metrics::Meter;
use opentelemetry::trace::{FutureExt as _, TraceContextExt, Tracer};
use opentelemetry::Context;
use tracing::debug;

use crate::error::ClassifyError;
use crate::metrics::{RequestAttributes, RequestMetrics};
use crate::route::RouteTable;
use crate::trace::SpanBridge;

/// Per-request instrumentation over an injected meter and tracer.
///
/// Construct one at startup and share it behind an [`Arc`]; all per-request
/// state lives on the stack of [`dispatch`](Instrumentation::dispatch).
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use axum::http::Method;
/// use gatehouse::{Instrumentation, InstrumentedRouter, RouteTable};
/// use opentelemetry::metrics::MeterProvider as _;
/// use opentelemetry::trace::TracerProvider as _;
///
/// let routes = Arc::new(RouteTable::new().route(Method::GET, "/items/{id}"));
/// let inst = Arc::new(Instrumentation::new(
///     "my-service",
///     routes,
///     &providers.meter_provider().meter("gatehouse"),
///     providers.tracer_provider().tracer("gatehouse"),
/// ));
///
/// let app = axum::Router::new()
///     .route("/items/{id}", axum::routing::get(handler))
///     .with_instrumentation(inst);
/// ```
#[derive(Debug)]
pub struct Instrumentation {
    app_name: String,
    routes: Arc<RouteTable>,
    metrics: RequestMetrics,
    bridge: SpanBridge,
}

impl Instrumentation {
    /// Create the middleware from explicitly injected providers.
    ///
    /// The meter and tracer come from provider objects owned by the caller;
    /// nothing is read from the global registries, so tests can hand in
    /// in-memory providers.
    pub fn new<T>(
        app_name: impl Into<String>,
        routes: Arc<RouteTable>,
        meter: &Meter,
        tracer: T,
    ) -> Self
    where
        T: Tracer + Send + Sync + 'static,
        T::Span: Send + Sync + 'static,
    {
        Self {
            app_name: app_name.into(),
            routes,
            metrics: RequestMetrics::new(meter),
            bridge: SpanBridge::new(tracer),
        }
    }

    /// The service name stamped on every metric and span.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// The route table requests are resolved against.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Instrument one request around the downstream call `next`.
    ///
    /// The downstream error type only needs [`ClassifyError`] for the
    /// exception counter label; the error value itself is returned to the
    /// caller unchanged after bookkeeping. For infallible stacks (plain
    /// axum), use `E = Infallible`.
    pub async fn dispatch<F, Fut, E>(&self, request: Request, next: F) -> Result<Response, E>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Result<Response, E>>,
        E: ClassifyError,
    {
        let resolved = self.routes.resolve(request.method(), request.uri().path());
        if !resolved.handled {
            debug!(path = %resolved.path, "unmatched route, bypassing instrumentation");
            return next(request).await;
        }

        let attrs = RequestAttributes::new(request.method(), &resolved.path, &self.app_name);
        let parent = self.bridge.extract_context(request.headers());
        let cx = self.bridge.start_server_span(
            request.method(),
            &resolved.path,
            attrs.base().to_vec(),
            &parent,
        );

        // The guard owns the +1/-1 pairing and the span end. It finalizes in
        // Drop, so a cancelled or panicking downstream still restores the
        // gauge and closes the span.
        let guard = FinalizeGuard::new(&self.metrics, &attrs, cx.clone());
        self.metrics.inc_requests(&attrs);

        let started = Instant::now();
        match next(request).with_context(cx).await {
            Ok(response) => {
                self.metrics
                    .record_duration(&attrs, started.elapsed().as_secs_f64());
                guard.finish(response.status().as_u16());
                Ok(response)
            }
            Err(err) => {
                self.metrics.inc_exceptions(&attrs, err.error_kind());
                guard.finish(StatusCode::INTERNAL_SERVER_ERROR.as_u16());
                Err(err)
            }
        }
    }
}

/// Guaranteed-cleanup block for one in-flight request.
///
/// Construction increments the in-flight gauge; `Drop` decrements it and
/// ends the span. When the outcome is known, [`finish`](Self::finish) stores
/// the final status so the drop also counts the response. A drop without
/// `finish` (cancellation, panic) restores the gauge and span only.
struct FinalizeGuard<'a> {
    metrics: &'a RequestMetrics,
    attrs: &'a RequestAttributes,
    cx: Context,
    status: Option<u16>,
}

impl<'a> FinalizeGuard<'a> {
    fn new(metrics: &'a RequestMetrics, attrs: &'a RequestAttributes, cx: Context) -> Self {
        metrics.adjust_in_flight(attrs, 1);
        Self {
            metrics,
            attrs,
            cx,
            status: None,
        }
    }

    fn finish(mut self, status: u16) {
        self.status = Some(status);
    }
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        if let Some(status) = self.status {
            self.metrics.inc_responses(self.attrs, status);
        }
        self.metrics.adjust_in_flight(self.attrs, -1);
        self.cx.span().end();
    }
}
