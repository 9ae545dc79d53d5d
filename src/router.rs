//! InstrumentedRouter trait for axum integration
//!
//! Extension trait that layers the instrumentation middleware onto any axum
//! router. axum's `Next` is infallible — handler errors have already been
//! converted into responses by the time middleware sees them — so this
//! adapter drives [`Instrumentation::dispatch`] with `E = Infallible`. Stacks
//! with a fallible seam (custom tower services, RPC bridges) can call
//! `dispatch` directly with their own error type.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;

use crate::middleware::Instrumentation;

/// Extension trait for adding request instrumentation to an axum Router.
///
/// # Example
///
/// ```ignore
/// use axum::{routing::get, Router};
/// use gatehouse::{Instrumentation, InstrumentedRouter, RouteTable};
/// use std::sync::Arc;
///
/// let app = Router::new()
///     .route("/items/{id}", get(handler))
///     .with_instrumentation(instrumentation);
/// ```
pub trait InstrumentedRouter {
    /// Wrap every route with the instrumentation middleware.
    ///
    /// Requests that do not resolve against the instrumentation's route
    /// table pass through unmodified.
    fn with_instrumentation(self, instrumentation: Arc<Instrumentation>) -> Self;
}

impl<S> InstrumentedRouter for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_instrumentation(self, instrumentation: Arc<Instrumentation>) -> Self {
        self.layer(middleware::from_fn(move |request: Request, next: Next| {
            let instrumentation = instrumentation.clone();
            async move {
                let result: Result<Response, Infallible> = instrumentation
                    .dispatch(request, |request| async move { Ok(next.run(request).await) })
                    .await;
                match result {
                    Ok(response) => response,
                    Err(never) => match never {},
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteTable;
    use axum::body::Body;
    use axum::http::{Method, Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use tower::ServiceExt;

    fn instrumentation() -> Arc<Instrumentation> {
        let routes = Arc::new(RouteTable::new().route(Method::GET, "/health"));
        let meter_provider = SdkMeterProvider::builder().build();
        let tracer_provider = SdkTracerProvider::builder().build();
        Arc::new(Instrumentation::new(
            "test",
            routes,
            &meter_provider.meter("gatehouse"),
            tracer_provider.tracer("gatehouse"),
        ))
    }

    #[tokio::test]
    async fn test_instrumented_route_serves_normally() {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .with_instrumentation(instrumentation());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unmatched_route_passes_through() {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .with_instrumentation(instrumentation());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
