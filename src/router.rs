//! The route table.
//!
//! Routes are stored in registration order and indexed by method and segment
//! count, which is all the matcher needs to narrow its candidates. Build the
//! table once at startup; it is read-only while serving.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::negotiate::Schema;
use crate::pattern::PathPattern;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AuthRequirement {
    None,
    /// Every scheme registered on the gate, in registration order.
    Any,
    /// Only the named schemes, still in gate registration order.
    Schemes(Vec<String>),
}

/// A registered route.
pub struct Route {
    method: Method,
    pattern: PathPattern,
    pub(crate) handler: BoxedHandler,
    pub(crate) auth: AuthRequirement,
    input: Option<Arc<Schema>>,
    output: Option<Arc<Schema>>,
    location: Option<Arc<Schema>>,
}

impl Route {
    pub fn method(&self) -> Method { self.method }
    pub fn pattern(&self) -> &PathPattern { &self.pattern }
    pub fn requires_auth(&self) -> bool { self.auth != AuthRequirement::None }
    pub fn input(&self) -> Option<&Arc<Schema>> { self.input.as_ref() }
    pub fn output(&self) -> Option<&Arc<Schema>> { self.output.as_ref() }
    pub fn location(&self) -> Option<&Arc<Schema>> { self.location.as_ref() }

    /// Scheme names this route is restricted to, if any.
    pub fn schemes(&self) -> Option<&[String]> {
        match &self.auth {
            AuthRequirement::Schemes(names) => Some(names),
            _ => None,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.to_string())
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

// ── Endpoint ──────────────────────────────────────────────────────────────────

/// A route under construction, for registrations that need more than a
/// method, a path and a handler.
///
/// ```rust
/// use gatehouse::{Context, Endpoint, FieldType, Router, Schema};
///
/// async fn register(ctx: Context) -> gatehouse::TypedPayload {
///     ctx.payload().cloned().unwrap()
/// }
///
/// let book = Schema::new("Book").field("id", FieldType::Int).field("title", FieldType::Str);
/// let router = Router::new()
///     .endpoint(Endpoint::post("/book/register", register).accepts(book.clone()).returns(book))
///     .unwrap();
/// ```
pub struct Endpoint {
    method: Method,
    path: String,
    handler: BoxedHandler,
    auth: AuthRequirement,
    input: Option<Arc<Schema>>,
    output: Option<Arc<Schema>>,
    location: Option<Arc<Schema>>,
}

impl Endpoint {
    pub fn new(method: Method, path: &str, handler: impl Handler) -> Self {
        Self {
            method,
            path: path.to_owned(),
            handler: handler.into_boxed_handler(),
            auth: AuthRequirement::None,
            input: None,
            output: None,
            location: None,
        }
    }

    pub fn get(path: &str, handler: impl Handler) -> Self { Self::new(Method::Get, path, handler) }
    pub fn post(path: &str, handler: impl Handler) -> Self { Self::new(Method::Post, path, handler) }
    pub fn put(path: &str, handler: impl Handler) -> Self { Self::new(Method::Put, path, handler) }
    pub fn patch(path: &str, handler: impl Handler) -> Self { Self::new(Method::Patch, path, handler) }
    pub fn delete(path: &str, handler: impl Handler) -> Self { Self::new(Method::Delete, path, handler) }

    /// Requires any scheme registered on the gate.
    pub fn authenticate(mut self) -> Self {
        self.auth = AuthRequirement::Any;
        self
    }

    /// Requires one of the named schemes.
    pub fn authenticate_with<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth = AuthRequirement::Schemes(schemes.into_iter().map(Into::into).collect());
        self
    }

    /// Decode the request body against `schema` before the handler runs.
    pub fn accepts(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.input = Some(schema.into());
        self
    }

    /// Project structured handler results through `schema`.
    pub fn returns(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.output = Some(schema.into());
        self
    }

    /// Decode path and query parameters against `schema`.
    pub fn location(mut self, schema: impl Into<Arc<Schema>>) -> Self {
        self.location = Some(schema.into());
        self
    }

    fn into_route(self) -> Result<Route, Error> {
        for schema in [&self.input, &self.output, &self.location].into_iter().flatten() {
            schema
                .check()
                .map_err(|e| Error::InvalidSchema { schema: schema.name().to_owned(), reason: e.to_string() })?;
        }
        Ok(Route {
            method: self.method,
            pattern: PathPattern::parse(&self.path)?,
            handler: self.handler,
            auth: self.auth,
            input: self.input,
            output: self.output,
            location: self.location,
        })
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application route table.
///
/// Each registration returns `Result<Self, Error>` so a table reads as one
/// `?`-chained expression, and a conflicting or malformed route stops
/// startup:
///
/// ```rust
/// # use gatehouse::{Context, Router};
/// # async fn hello(_: Context) -> &'static str { "" }
/// # async fn detail(_: Context) -> &'static str { "" }
/// # fn main() -> Result<(), gatehouse::Error> {
/// let router = Router::new()
///     .get("/hello/{name}", hello)?
///     .get("/user/detail", detail)?;
/// assert!(Router::new().get("/a", hello)?.get("/a/", hello).is_err());
/// # Ok(()) }
/// ```
pub struct Router {
    routes: Vec<Route>,
    /// method -> segment count -> route indices, ascending (registration order)
    pub(crate) index: HashMap<Method, BTreeMap<usize, Vec<usize>>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new(), index: HashMap::new() }
    }

    /// Register a handler for a method + path pair.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Result<Self, Error> {
        self.endpoint(Endpoint::new(method, path, handler))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Result<Self, Error> {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Result<Self, Error> {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Result<Self, Error> {
        self.on(Method::Put, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Result<Self, Error> {
        self.on(Method::Patch, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Result<Self, Error> {
        self.on(Method::Delete, path, handler)
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Result<Self, Error> {
        self.register(endpoint)?;
        Ok(self)
    }

    /// Adds a route. Fails with [`Error::Conflict`] if a route with the same
    /// method and pattern shape exists, or [`Error::InvalidPattern`].
    pub fn register(&mut self, endpoint: Endpoint) -> Result<(), Error> {
        self.insert(endpoint.into_route()?)
    }

    /// Mounts every route of `other` under the literal-or-parameter `prefix`,
    /// after the routes already registered here.
    pub fn nest(mut self, prefix: &str, other: Router) -> Result<Self, Error> {
        let prefix = PathPattern::parse(prefix)?;
        for mut route in other.routes {
            // re-parse so parameter names are checked across prefix and route
            route.pattern = PathPattern::parse(&route.pattern.prefixed(&prefix).to_string())?;
            self.insert(route)?;
        }
        Ok(self)
    }

    fn insert(&mut self, route: Route) -> Result<(), Error> {
        let bucket = self
            .index
            .entry(route.method)
            .or_default()
            .entry(route.pattern.len())
            .or_default();

        if bucket.iter().any(|&i| self.routes[i].pattern.same_shape(&route.pattern)) {
            return Err(Error::Conflict { method: route.method, pattern: route.pattern.to_string() });
        }

        debug!(method = %route.method, pattern = %route.pattern, auth = route.requires_auth(), "route registered");
        bucket.push(self.routes.len());
        self.routes.push(route);
        Ok(())
    }

    /// Registered routes in registration order. The iterator is lazy and can
    /// be cloned or requested again to restart.
    pub fn routes(&self) -> Routes<'_> {
        Routes(self.routes.iter())
    }

    pub(crate) fn route(&self, index: usize) -> &Route {
        &self.routes[index]
    }

    pub fn len(&self) -> usize { self.routes.len() }
    pub fn is_empty(&self) -> bool { self.routes.is_empty() }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Iterator over registered routes; see [`Router::routes`].
#[derive(Clone)]
pub struct Routes<'a>(std::slice::Iter<'a, Route>);

impl<'a> Iterator for Routes<'a> {
    type Item = &'a Route;

    fn next(&mut self) -> Option<Self::Item> { self.0.next() }
    fn size_hint(&self) -> (usize, Option<usize>) { self.0.size_hint() }
}

impl ExactSizeIterator for Routes<'_> {}
