//! # gatehouse
//!
//! An HTTP routing engine with pluggable authentication and content
//! negotiation, served with hyper on tokio.
//!
//! - Explicit routing: literal and `{param}` segments. The most specific
//!   route wins, then the one registered first. Ambiguous registrations are
//!   rejected at startup.
//! - Authentication gate: Basic, Form, Digest (SHA-256) and Bearer JWT
//!   schemes, tried in registration order. Protected handlers never run for
//!   a rejected request.
//! - Content negotiation: typed request payloads checked against a
//!   [`Schema`], results encoded per `Accept` and projected onto an output
//!   schema.
//! - Graceful shutdown: SIGTERM / Ctrl-C, drains in-flight requests.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gatehouse::auth::{Authentication, Basic, Identity, UserPasswordCredential};
//! use gatehouse::{Context, Dispatcher, Endpoint, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gatehouse::Error> {
//!     gatehouse::logging::init("info");
//!
//!     let auth = Authentication::new().with(Basic::new("basic", "ktor", |c: UserPasswordCredential| async move {
//!         (c.name == "user" && c.password == "password").then(|| Identity::new(c.name))
//!     }))?;
//!
//!     let router = Router::new()
//!         .get("/hello/{name}", hello)?
//!         .endpoint(Endpoint::get("/me", me).authenticate())?;
//!
//!     let app = Dispatcher::builder(router).authentication(auth).build()?;
//!     Server::bind(([0, 0, 0, 0], 3000).into()).serve(app).await
//! }
//!
//! async fn hello(ctx: Context) -> String {
//!     format!("Hello {}!", ctx.param("name").unwrap_or("stranger"))
//! }
//!
//! async fn me(mut ctx: Context) -> String {
//!     ctx.take_identity().map(|id| id.name().to_owned()).unwrap_or_default()
//! }
//! ```

pub mod auth;
pub mod config;
pub mod logging;
pub mod negotiate;

mod context;
mod dispatch;
mod error;
mod handler;
mod matcher;
mod method;
mod pattern;
mod request;
mod response;
mod router;
mod server;

pub use config::ServerConfig;
pub use context::Context;
pub use dispatch::{Dispatcher, DispatcherBuilder};
pub use error::Error;
pub use handler::Handler;
pub use http::StatusCode;
pub use matcher::MatchResult;
pub use method::{Method, UnknownMethod};
pub use negotiate::{FieldType, Json, Schema, TypedPayload};
pub use pattern::{PathPattern, Segment};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Endpoint, Route, Router, Routes};
pub use server::Server;
