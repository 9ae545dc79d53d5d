//! Request metric instruments
//!
//! The five instruments every instrumented request reports into, created once
//! at startup from an injected [`Meter`] and shared across all requests. The
//! instrument names, units, and descriptions are fixed: collectors and
//! dashboards key on them, so they must not drift between deployments.
//!
//! | Instrument | Type | Extra label |
//! |------------|------|-------------|
//! | `fastapi_requests_total` | Counter | - |
//! | `fastapi_responses_total` | Counter | `status_code` |
//! | `fastapi_requests_duration_seconds` | Histogram (s) | - |
//! | `fastapi_exceptions_total` | Counter | `exception_type` |
//! | `fastapi_requests_in_progress` | UpDownCounter | - |
//!
//! All recording methods are fire-and-forget and never fail; concurrency
//! safety comes from the backing OpenTelemetry instruments.

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;

use crate::error::ErrorKind;
use axum::http::Method;

/// The immutable label set shared by every metric emission in one request.
///
/// Computed once at dispatch start so that the request counter, response
/// counter, exception counter, and in-flight gauge all carry identical
/// `{method, path, app_name}` labels — no drift mid-request.
#[derive(Debug, Clone)]
pub struct RequestAttributes {
    base: Vec<KeyValue>,
}

impl RequestAttributes {
    /// Build the label set for a resolved request.
    pub fn new(method: &Method, path: &str, app_name: &str) -> Self {
        Self {
            base: vec![
                KeyValue::new("method", method.to_string()),
                KeyValue::new("path", path.to_string()),
                KeyValue::new("app_name", app_name.to_string()),
            ],
        }
    }

    /// The shared `{method, path, app_name}` labels.
    pub fn base(&self) -> &[KeyValue] {
        &self.base
    }

    /// Base labels plus the response status code.
    pub fn with_status(&self, status: u16) -> Vec<KeyValue> {
        let mut attrs = self.base.clone();
        attrs.push(KeyValue::new("status_code", i64::from(status)));
        attrs
    }

    /// Base labels plus the classified exception kind.
    pub fn with_error_kind(&self, kind: ErrorKind) -> Vec<KeyValue> {
        let mut attrs = self.base.clone();
        attrs.push(KeyValue::new("exception_type", kind.as_str()));
        attrs
    }
}

/// The fixed set of request instruments.
///
/// Created once per process via [`RequestMetrics::new`]; the middleware holds
/// this by reference for the lifetime of the service. Never recreate it per
/// request — instruments are process-lifetime singletons.
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    requests: Counter<u64>,
    responses: Counter<u64>,
    duration: Histogram<f64>,
    exceptions: Counter<u64>,
    in_progress: UpDownCounter<i64>,
}

impl RequestMetrics {
    /// Create the five instruments from the injected meter.
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("fastapi_requests_total")
                .with_description("Total count of requests by method and path.")
                .build(),
            responses: meter
                .u64_counter("fastapi_responses_total")
                .with_description("Total count of responses by method, path and status codes.")
                .build(),
            duration: meter
                .f64_histogram("fastapi_requests_duration_seconds")
                .with_unit("s")
                .with_description("Histogram of requests processing time by path (in seconds)")
                .build(),
            exceptions: meter
                .u64_counter("fastapi_exceptions_total")
                .with_description("Total count of exceptions raised by path and exception type")
                .build(),
            in_progress: meter
                .i64_up_down_counter("fastapi_requests_in_progress")
                .with_description("Gauge of requests by method and path currently being processed")
                .build(),
        }
    }

    /// Count one inbound request.
    pub fn inc_requests(&self, attrs: &RequestAttributes) {
        self.requests.add(1, attrs.base());
    }

    /// Count one outbound response with its final status code.
    pub fn inc_responses(&self, attrs: &RequestAttributes, status: u16) {
        self.responses.add(1, &attrs.with_status(status));
    }

    /// Count one downstream fault, tagged with its classified kind.
    pub fn inc_exceptions(&self, attrs: &RequestAttributes, kind: ErrorKind) {
        self.exceptions.add(1, &attrs.with_error_kind(kind));
    }

    /// Move the in-flight gauge by `delta` (+1 on entry, -1 on completion).
    pub fn adjust_in_flight(&self, attrs: &RequestAttributes, delta: i64) {
        self.in_progress.add(delta, attrs.base());
    }

    /// Record one processing-time observation, in seconds.
    pub fn record_duration(&self, attrs: &RequestAttributes, seconds: f64) {
        self.duration.record(seconds, attrs.base());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;

    #[test]
    fn test_attributes_are_computed_once() {
        let attrs = RequestAttributes::new(&Method::GET, "/items/{id}", "demo");
        let base = attrs.base();
        assert_eq!(base.len(), 3);

        let with_status = attrs.with_status(200);
        assert_eq!(with_status.len(), 4);
        // The shared labels are untouched by the extended sets.
        assert_eq!(attrs.base().len(), 3);

        let with_kind = attrs.with_error_kind(ErrorKind::Internal);
        assert_eq!(with_kind.len(), 4);
    }

    #[test]
    fn test_recording_never_panics() {
        // A provider with no reader drops everything; recording must still
        // be a no-op rather than an error.
        let provider = SdkMeterProvider::builder().build();
        let meter = provider.meter("test");
        let metrics = RequestMetrics::new(&meter);
        let attrs = RequestAttributes::new(&Method::GET, "/health", "demo");

        metrics.inc_requests(&attrs);
        metrics.inc_responses(&attrs, 200);
        metrics.inc_exceptions(&attrs, ErrorKind::Timeout);
        metrics.adjust_in_flight(&attrs, 1);
        metrics.adjust_in_flight(&attrs, -1);
        metrics.record_duration(&attrs, 0.012);
    }
}
