//! Route resolution for metrics labeling
//!
//! Maps a concrete request path back to the route template it was registered
//! under (e.g. `/items/42` → `/items/{id}`), so metric labels stay bounded
//! regardless of how many distinct parameter values show up in traffic.

use axum::http::Method;

/// How closely a route matches an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    /// Method and path both match.
    Full,
    /// Path matches but the method does not.
    ///
    /// Partial matches must not resolve: counting them would file 405-style
    /// traffic under a verb the route never handled.
    Partial,
    /// Path does not match.
    None,
}

/// A single registered route: an HTTP method plus a path template.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    template: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param,
}

impl Route {
    fn new(method: Method, template: &str) -> Self {
        let segments = template
            .split('/')
            .skip(1)
            .map(|seg| {
                if seg.starts_with('{') && seg.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(seg.to_string())
                }
            })
            .collect();
        Self {
            method,
            template: template.to_string(),
            segments,
        }
    }

    /// The path template this route was registered with.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Match this route against a request's method and path.
    pub fn matches(&self, method: &Method, path: &str) -> RouteMatch {
        if !self.path_matches(path) {
            return RouteMatch::None;
        }
        if self.method == *method {
            RouteMatch::Full
        } else {
            RouteMatch::Partial
        }
    }

    fn path_matches(&self, path: &str) -> bool {
        let mut given = path.split('/').skip(1);
        for segment in &self.segments {
            let Some(part) = given.next() else {
                return false;
            };
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return false;
                    }
                }
                Segment::Param => {
                    if part.is_empty() {
                        return false;
                    }
                }
            }
        }
        given.next().is_none()
    }
}

/// The outcome of resolving a request against the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// The matched template, or the raw request path when unhandled.
    pub path: String,
    /// Whether any registered route fully matched the request.
    pub handled: bool,
}

/// Registration-ordered table of the routes worth instrumenting.
///
/// The table is a snapshot registered alongside the server's own routes; the
/// resolver never mutates it and holds no per-request state.
///
/// # Example
///
/// ```
/// use axum::http::Method;
/// use gatehouse::RouteTable;
///
/// let routes = RouteTable::new()
///     .route(Method::GET, "/items/{id}")
///     .route(Method::POST, "/items");
///
/// let resolved = routes.resolve(&Method::GET, "/items/42");
/// assert!(resolved.handled);
/// assert_eq!(resolved.path, "/items/{id}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Create an empty route table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route template for the given method.
    ///
    /// Templates use `{param}` for dynamic segments, matching the server's
    /// route syntax: `/users/{id}/profile`.
    pub fn route(mut self, method: Method, template: &str) -> Self {
        self.routes.push(Route::new(method, template));
        self
    }

    /// Iterate registered routes in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Resolve a request to its canonical route identifier.
    ///
    /// Walks the table in registration order and returns the first route
    /// whose match is [`RouteMatch::Full`]. Partial matches (path hit,
    /// method miss) are skipped. When nothing fully matches, the raw path
    /// comes back with `handled = false` so callers can bypass
    /// instrumentation entirely.
    pub fn resolve(&self, method: &Method, path: &str) -> ResolvedRoute {
        for route in &self.routes {
            if route.matches(method, path) == RouteMatch::Full {
                return ResolvedRoute {
                    path: route.template.clone(),
                    handled: true,
                };
            }
        }
        ResolvedRoute {
            path: path.to_string(),
            handled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new()
            .route(Method::GET, "/items/{id}")
            .route(Method::POST, "/items")
            .route(Method::GET, "/health")
    }

    #[test]
    fn test_resolve_template() {
        let resolved = table().resolve(&Method::GET, "/items/42");
        assert!(resolved.handled);
        assert_eq!(resolved.path, "/items/{id}");
    }

    #[test]
    fn test_resolve_literal() {
        let resolved = table().resolve(&Method::GET, "/health");
        assert!(resolved.handled);
        assert_eq!(resolved.path, "/health");
    }

    #[test]
    fn test_unmatched_path_falls_back_to_raw() {
        let resolved = table().resolve(&Method::GET, "/unknown/path");
        assert!(!resolved.handled);
        assert_eq!(resolved.path, "/unknown/path");
    }

    #[test]
    fn test_method_mismatch_is_partial_not_full() {
        let route = Route::new(Method::GET, "/items/{id}");
        assert_eq!(route.matches(&Method::DELETE, "/items/42"), RouteMatch::Partial);

        // A partial match must not resolve as handled.
        let resolved = table().resolve(&Method::DELETE, "/items/42");
        assert!(!resolved.handled);
        assert_eq!(resolved.path, "/items/42");
    }

    #[test]
    fn test_registration_order_wins() {
        let routes = RouteTable::new()
            .route(Method::GET, "/items/{id}")
            .route(Method::GET, "/items/latest");

        // Both templates match; the first registered one is returned.
        let resolved = routes.resolve(&Method::GET, "/items/latest");
        assert_eq!(resolved.path, "/items/{id}");
    }

    #[test]
    fn test_segment_count_must_match() {
        let route = Route::new(Method::GET, "/items/{id}");
        assert_eq!(route.matches(&Method::GET, "/items"), RouteMatch::None);
        assert_eq!(route.matches(&Method::GET, "/items/42/extra"), RouteMatch::None);
    }

    #[test]
    fn test_empty_param_segment_does_not_match() {
        let route = Route::new(Method::GET, "/items/{id}");
        assert_eq!(route.matches(&Method::GET, "/items/"), RouteMatch::None);
    }
}
