//! Request dispatch.
//!
//! One request in, exactly one response out. The steps, each of which may
//! end the request early with its error response:
//!
//! 1. resolve the route (404, or 405 for an unknown method token)
//! 2. run the authentication gate if the route asks for it (401)
//! 3. decode the body against the route's input schema (415 / 400)
//! 4. decode path + query against the route's location schema (400)
//! 5. run the handler on its own task (a panic becomes 500)
//! 6. encode a structured result with the negotiated codec (406 / 500)

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::auth::Authentication;
use crate::context::Context;
use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::matcher::MatchResult;
use crate::method::Method;
use crate::negotiate::{Negotiator, Schema};
use crate::request::Request;
use crate::response::{Body, IntoResponse, Response};
use crate::router::{AuthRequirement, Router};

/// Routes, authentication and negotiation, frozen for serving.
///
/// ```rust
/// # use gatehouse::{Context, Dispatcher, Request, Router};
/// # async fn hello(ctx: Context) -> String { format!("Hello {}!", ctx.param("name").unwrap_or("")) }
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), gatehouse::Error> {
/// let app = Dispatcher::new(Router::new().get("/hello/{name}", hello)?)?;
/// let res = app.handle(Request::new("GET", "/hello/John")).await;
/// assert_eq!(res.body(), b"Hello John!");
/// # Ok(()) }
/// ```
pub struct Dispatcher {
    router: Router,
    auth: Authentication,
    negotiator: Arc<Negotiator>,
}

impl Dispatcher {
    /// A dispatcher with no authentication schemes and a JSON-only negotiator.
    pub fn new(router: Router) -> Result<Self, Error> {
        Self::builder(router).build()
    }

    pub fn builder(router: Router) -> DispatcherBuilder {
        DispatcherBuilder { router, auth: Authentication::new(), negotiator: Negotiator::new() }
    }

    pub fn router(&self) -> &Router { &self.router }
    pub fn authentication(&self) -> &Authentication { &self.auth }
    pub fn negotiator(&self) -> &Negotiator { &self.negotiator }

    /// Handles one request. Never fails: every error becomes its response.
    pub async fn handle(&self, req: Request) -> Response {
        let span = info_span!("request", method = %req.method(), path = %req.path());
        async move {
            let started = Instant::now();
            let response = match self.dispatch(req).await {
                Ok(res) => res,
                Err(e) => {
                    if e.status().is_server_error() {
                        warn!(error = %e, "request failed");
                    } else {
                        debug!(error = %e, "request refused");
                    }
                    e.into_response()
                }
            };
            info!(status = response.status.as_u16(), elapsed_us = started.elapsed().as_micros() as u64, "done");
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, req: Request) -> Result<Response, Error> {
        let method: Method = req
            .method()
            .parse()
            .map_err(|_| Error::MethodNotAllowed(req.method().to_owned()))?;
        let MatchResult { route, params } = self.router.matches(method, req.path())?;

        let identity = match &route.auth {
            AuthRequirement::None => None,
            AuthRequirement::Any => Some(self.auth.authenticate(&req, None).await?),
            AuthRequirement::Schemes(names) => Some(self.auth.authenticate(&req, Some(names.as_slice())).await?),
        };

        let payload = route.input().map(|schema| self.negotiator.decode(&req, schema)).transpose()?;

        // path parameters shadow query parameters of the same name
        let location = route
            .location()
            .map(|schema| {
                let query = req.query_params().iter();
                let pairs = query.chain(params.iter()).map(|(k, v)| (k.as_str(), v.as_str()));
                schema.decode_pairs(pairs)
            })
            .transpose()?;

        let accept = req.header("accept").map(str::to_owned);
        let ctx = Context::new(req, params, Arc::clone(&self.negotiator))
            .with_identity(identity)
            .with_payload(payload)
            .with_location(location);

        let response = run(Arc::clone(&route.handler), ctx).await?;
        self.encode(response, route.output(), accept.as_deref())
    }

    /// Encodes a negotiated body, projecting it through `output` first.
    /// Byte bodies pass through untouched.
    fn encode(&self, response: Response, output: Option<&Arc<Schema>>, accept: Option<&str>) -> Result<Response, Error> {
        let Response { status, headers, body } = response;
        let (value, media_type) = match body {
            Body::Bytes(_) => return Ok(Response { status, headers, body }),
            Body::Negotiated { value, media_type } => (value?, media_type),
        };

        let value = match output {
            Some(schema) => schema.project_value(&value)?.to_value(),
            None => value,
        };
        let codec = self.negotiator.response_codec(accept, media_type)?;
        let bytes = codec.encode(&value)?;

        let mut response = Response { status, headers, body: Body::Bytes(Bytes::from(bytes)) };
        response.set_header("content-type", codec.content_type());
        Ok(response)
    }
}

/// Runs the handler on its own task. Dropping the returned future (client
/// gone) aborts the task.
async fn run(handler: BoxedHandler, ctx: Context) -> Result<Response, Error> {
    let task = tokio::spawn(handler.call(ctx).instrument(Span::current()));
    let _abort = AbortOnDrop(task.abort_handle());

    task.await.map_err(|e| {
        if e.is_panic() {
            warn!("handler panicked");
        }
        Error::Io(std::io::Error::other(format!("handler task failed: {e}")))
    })
}

struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Assembles a [`Dispatcher`]; see [`Dispatcher::builder`].
pub struct DispatcherBuilder {
    router: Router,
    auth: Authentication,
    negotiator: Negotiator,
}

impl DispatcherBuilder {
    pub fn authentication(mut self, auth: Authentication) -> Self {
        self.auth = auth;
        self
    }

    pub fn negotiator(mut self, negotiator: Negotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    /// Fails with [`Error::UnknownScheme`] if a route names a scheme the
    /// gate does not have, or requires authentication while no scheme is
    /// configured at all (reported as scheme `*`).
    pub fn build(self) -> Result<Dispatcher, Error> {
        for route in self.router.routes() {
            match &route.auth {
                AuthRequirement::None => {}
                AuthRequirement::Any if self.auth.is_empty() => return Err(Error::UnknownScheme("*".to_owned())),
                AuthRequirement::Any => {}
                AuthRequirement::Schemes(names) => {
                    if let Some(missing) = names.iter().find(|n| !self.auth.contains(n)) {
                        return Err(Error::UnknownScheme(missing.clone()));
                    }
                }
            }
        }
        info!(
            routes = self.router.len(),
            schemes = self.auth.names().count(),
            codecs = self.negotiator.media_types().count(),
            "dispatcher ready"
        );
        Ok(Dispatcher { router: self.router, auth: self.auth, negotiator: Arc::new(self.negotiator) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use http::StatusCode;

    use super::*;
    use crate::negotiate::{FieldType, FormCodec, Json};
    use crate::router::Endpoint;

    async fn noop(_: Context) -> &'static str { "ok" }

    #[tokio::test]
    async fn unknown_method_is_405() {
        let app = Dispatcher::new(Router::new().get("/", noop).unwrap()).unwrap();
        let res = app.handle(Request::new("BREW", "/")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        async fn boom(_: Context) -> &'static str {
            panic!("boom")
        }
        let app = Dispatcher::new(Router::new().get("/boom", boom).unwrap()).unwrap();
        let res = app.handle(Request::new("GET", "/boom")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["message"], "internal server error");
    }

    #[tokio::test]
    async fn dropped_request_aborts_handler() {
        static FINISHED: AtomicBool = AtomicBool::new(false);
        async fn slow(_: Context) -> &'static str {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            FINISHED.store(true, Ordering::SeqCst);
            "late"
        }
        let app = Dispatcher::new(Router::new().get("/slow", slow).unwrap()).unwrap();
        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), app.handle(Request::new("GET", "/slow"))).await;
        assert!(pending.is_err());
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!FINISHED.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn output_schema_projects_results() {
        #[derive(serde::Serialize)]
        struct User {
            name: &'static str,
            password_hash: &'static str,
        }
        async fn me(_: Context) -> Json<User> {
            Json(User { name: "jet", password_hash: "x9f..." })
        }
        let public = Schema::new("PublicUser").field("name", FieldType::Str).optional("bio", FieldType::Str);
        let router = Router::new().endpoint(Endpoint::get("/me", me).returns(public)).unwrap();
        let res = Dispatcher::new(router).unwrap().handle(Request::new("GET", "/me")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), br#"{"name":"jet","bio":""}"#);
    }

    #[tokio::test]
    async fn output_type_mismatch_is_500() {
        async fn wrong(_: Context) -> Json<serde_json::Value> {
            Json(serde_json::json!({"id": "not-a-number"}))
        }
        let schema = Schema::new("Book").field("id", FieldType::Int);
        let router = Router::new().endpoint(Endpoint::get("/book", wrong).returns(schema)).unwrap();
        let res = Dispatcher::new(router).unwrap().handle(Request::new("GET", "/book")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn accept_picks_the_codec() {
        async fn book(_: Context) -> Response {
            Response::negotiated(serde_json::json!({"id": 1, "title": "a b"}))
        }
        let router = Router::new().get("/book", book).unwrap();
        let app = Dispatcher::builder(router).negotiator(Negotiator::new().with_codec(FormCodec)).build().unwrap();

        let res = app
            .handle(Request::new("GET", "/book").with_header("accept", "application/x-www-form-urlencoded"))
            .await;
        assert_eq!(res.header("content-type"), Some("application/x-www-form-urlencoded"));
        assert_eq!(res.body(), b"id=1&title=a+b");

        let res = app.handle(Request::new("GET", "/book").with_header("accept", "text/html")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn location_schema_types_path_and_query() {
        async fn page(ctx: Context) -> String {
            let loc = ctx.location().unwrap();
            format!("{}:{}", loc.get_i64("id").unwrap(), loc.get_i64("page").unwrap())
        }
        let schema = Schema::new("BookPage").field("id", FieldType::Int).optional_with("page", FieldType::Int, 1);
        let router = Router::new().endpoint(Endpoint::get("/book/{id}", page).location(schema)).unwrap();
        let app = Dispatcher::new(router).unwrap();

        assert_eq!(app.handle(Request::new("GET", "/book/7?page=3")).await.body(), b"7:3");
        assert_eq!(app.handle(Request::new("GET", "/book/7")).await.body(), b"7:1");
        assert_eq!(app.handle(Request::new("GET", "/book/7?id=9")).await.body(), b"7:1");
        assert_eq!(app.handle(Request::new("GET", "/book/seven")).await.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn build_rejects_unknown_schemes() {
        let router = Router::new().endpoint(Endpoint::get("/a", noop).authenticate_with(["ldap"])).unwrap();
        assert!(matches!(Dispatcher::new(router), Err(Error::UnknownScheme(n)) if n == "ldap"));

        let router = Router::new().endpoint(Endpoint::get("/a", noop).authenticate()).unwrap();
        assert!(matches!(Dispatcher::new(router), Err(Error::UnknownScheme(_))));
    }
}
