//! In-memory remote collaborators for tests.
//!
//! [`StubFetch`] answers `GET path` from a table of canned JSON documents and
//! [`StubQuery`] answers GraphQL operations by name. Both record every call so
//! tests can assert on how many round-trips an operation made. Anything not in
//! the table is reported as [`RemoteError::NotFound`].

use super::{KeyedFetch, Operation, StructuredQuery};
use crate::error::{RemoteError, RemoteResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// A canned failure. `RemoteError` is not `Clone`, so failures are stored as
/// constructors.
pub type FailureFn = fn() -> RemoteError;

#[derive(Clone)]
enum Canned {
    Json(Value),
    Fail(FailureFn),
}

impl Canned {
    fn respond(&self) -> RemoteResult<Value> {
        match self {
            Canned::Json(value) => Ok(value.clone()),
            Canned::Fail(make) => Err(make()),
        }
    }
}

/// Renders a request the way [`StubFetch::requests`] reports it.
fn render_request(path: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{path}?{}", query.join("&"))
}

/// Table-driven [`KeyedFetch`].
///
/// Routes registered with [`with`](Self::with) answer regardless of query
/// parameters. Routes registered with [`with_page`](Self::with_page) answer
/// only the given `page` parameter; other pages of a paged route are empty
/// arrays, which ends any drain.
#[derive(Default)]
pub struct StubFetch {
    routes: HashMap<String, Canned>,
    pages: HashMap<(String, u32), Value>,
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
}

impl StubFetch {
    /// An empty table: every request is "not found".
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `path` with `body`.
    #[must_use]
    pub fn with(mut self, path: impl Into<String>, body: Value) -> Self {
        self.routes.insert(path.into(), Canned::Json(body));
        self
    }

    /// Answers page `page` of `path` with `body`.
    #[must_use]
    pub fn with_page(mut self, path: impl Into<String>, page: u32, body: Value) -> Self {
        self.pages.insert((path.into(), page), body);
        self
    }

    /// Fails every request for `path`.
    #[must_use]
    pub fn with_failure(mut self, path: impl Into<String>, failure: FailureFn) -> Self {
        self.routes.insert(path.into(), Canned::Fail(failure));
        self
    }

    /// Sleeps this long before answering anything.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request so far, rendered as `path?k=v&k=v`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Number of requests so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of requests for exactly `path`, any parameters.
    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.split('?').next() == Some(path))
            .count()
    }

    fn answer(&self, path: &str, params: &[(&str, String)]) -> RemoteResult<Value> {
        let page = params
            .iter()
            .find(|(k, _)| *k == "page")
            .and_then(|(_, v)| v.parse::<u32>().ok());

        if let Some(page) = page {
            if let Some(body) = self.pages.get(&(path.to_string(), page)) {
                return Ok(body.clone());
            }
            if self.pages.keys().any(|(p, _)| p == path) {
                return Ok(Value::Array(Vec::new()));
            }
        }

        self.routes
            .get(path)
            .map_or(Err(RemoteError::NotFound), Canned::respond)
    }
}

impl KeyedFetch for StubFetch {
    async fn get(&self, resource_path: &str, params: &[(&str, String)]) -> RemoteResult<Value> {
        self.requests.lock().push(render_request(resource_path, params));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(resource_path, params)
    }
}

type Matcher = Box<dyn Fn(&Value) -> bool + Send + Sync>;

struct QueryRoute {
    operation: &'static str,
    matcher: Matcher,
    response: Canned,
}

/// Table-driven [`StructuredQuery`].
///
/// Each route names an operation and a predicate over its variables; the
/// first matching route answers. Unmatched queries are "not found".
#[derive(Default)]
pub struct StubQuery {
    routes: Vec<QueryRoute>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StubQuery {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `operation` with `data` whenever `matcher` accepts the
    /// variables.
    #[must_use]
    pub fn on(
        mut self,
        operation: &'static str,
        matcher: impl Fn(&Value) -> bool + Send + Sync + 'static,
        data: Value,
    ) -> Self {
        self.routes.push(QueryRoute {
            operation,
            matcher: Box::new(matcher),
            response: Canned::Json(data),
        });
        self
    }

    /// Answers `operation` with `data` for any variables.
    #[must_use]
    pub fn always(self, operation: &'static str, data: Value) -> Self {
        self.on(operation, |_| true, data)
    }

    /// Fails `operation` whenever `matcher` accepts the variables.
    #[must_use]
    pub fn fail(
        mut self,
        operation: &'static str,
        matcher: impl Fn(&Value) -> bool + Send + Sync + 'static,
        failure: FailureFn,
    ) -> Self {
        self.routes.push(QueryRoute {
            operation,
            matcher: Box::new(matcher),
            response: Canned::Fail(failure),
        });
        self
    }

    /// Sleeps this long before answering anything.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Operation names of every call so far.
    pub fn operations(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Variables of every call to `operation`.
    pub fn variables_of(&self, operation: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == operation)
            .map(|(_, vars)| vars.clone())
            .collect()
    }

    /// Number of calls so far.
    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }
}

impl StructuredQuery for StubQuery {
    async fn query(&self, operation: &Operation, variables: Value) -> RemoteResult<Value> {
        self.calls
            .lock()
            .push((operation.name.to_string(), variables.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.routes
            .iter()
            .find(|route| route.operation == operation.name && (route.matcher)(&variables))
            .map_or(Err(RemoteError::NotFound), |route| route.response.respond())
    }
}

/// Matches variables whose `key` is the string `expected`.
pub fn var_eq(key: &'static str, expected: &'static str) -> impl Fn(&Value) -> bool + Send + Sync {
    move |vars| vars.get(key).and_then(Value::as_str) == Some(expected)
}
