//! Trace context extraction and server span creation
//!
//! Bridges inbound W3C trace context (`traceparent`/`tracestate` headers)
//! into a server span for each instrumented request. The propagator is held
//! locally rather than looked up from the global registry, so the bridge
//! behaves identically no matter what the process has (or hasn't) installed
//! globally.

use axum::http::{HeaderMap, Method};
use opentelemetry::global::BoxedTracer;
use opentelemetry::propagation::text_map_propagator::TextMapPropagator;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::{SpanKind, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Adapts an HTTP header map to the propagation carrier interface.
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Starts server spans correlated with any inbound trace context.
pub struct SpanBridge {
    tracer: BoxedTracer,
    propagator: TraceContextPropagator,
}

impl std::fmt::Debug for SpanBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanBridge").finish_non_exhaustive()
    }
}

impl SpanBridge {
    /// Wrap a tracer obtained from an explicitly constructed provider.
    pub fn new<T>(tracer: T) -> Self
    where
        T: Tracer + Send + Sync + 'static,
        T::Span: Send + Sync + 'static,
    {
        Self {
            tracer: BoxedTracer::new(Box::new(tracer)),
            propagator: TraceContextPropagator::new(),
        }
    }

    /// Extract the remote parent context from request headers.
    ///
    /// Returns a fresh root context when no valid `traceparent` is present,
    /// so callers can parent to the result unconditionally.
    pub fn extract_context(&self, headers: &HeaderMap) -> Context {
        self.propagator
            .extract_with_context(&Context::new(), &HeaderExtractor(headers))
    }

    /// Start a server span named `"{method} {route}"` under `parent`.
    ///
    /// The returned context carries the span; downstream work should run
    /// with it attached, and the span must be ended on every exit path.
    pub fn start_server_span(
        &self,
        method: &Method,
        route: &str,
        attributes: Vec<KeyValue>,
        parent: &Context,
    ) -> Context {
        use opentelemetry::trace::TraceContextExt;

        let span = self
            .tracer
            .span_builder(format!("{method} {route}"))
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, parent);
        parent.with_span(span)
    }
}
