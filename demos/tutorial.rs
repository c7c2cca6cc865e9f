//! The book-store tutorial: greetings, typed bodies and every auth scheme.
//!
//! Run with:
//!   cargo run --example tutorial [config.toml]
//!
//! Try:
//!   curl http://localhost:8080/hello/John
//!   curl -X POST http://localhost:8080/book/register \
//!        -H 'content-type: application/json' \
//!        -d '{"id":200,"title":"X","author":"Y"}'
//!   curl -u user:password http://localhost:8080/protected/route/basic
//!   curl --digest -u Mufasa:'Circle of Life' http://localhost:8080/protected/route/digest
//!   curl -X POST http://localhost:8080/protected/route/form -d 'user=user&password=password'

use gatehouse::auth::{Authentication, Basic, Digest, Form, Identity, Jwt, UserPasswordCredential, digest_ha1};
use gatehouse::negotiate::{FormCodec, Negotiator};
use gatehouse::{Context, Dispatcher, Endpoint, Error, FieldType, Router, Schema, Server, ServerConfig, StatusCode, TypedPayload};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;

const REALM: &str = "ktor";

#[derive(Deserialize)]
struct Claims {
    sub: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    gatehouse::logging::init(&config.log_filter);

    let book = Schema::new("Book")
        .field("id", FieldType::Int)
        .field("title", FieldType::Str)
        .field("author", FieldType::Str);

    let router = Router::new()
        .get("/hello/{name}", hello)?
        .endpoint(Endpoint::post("/book/register", register).accepts(book.clone()).returns(book))?
        .endpoint(Endpoint::get("/protected/route/basic", whoami).authenticate_with(["basic"]))?
        .endpoint(Endpoint::post("/protected/route/form", whoami).authenticate_with(["form"]))?
        .endpoint(Endpoint::get("/protected/route/digest", whoami).authenticate_with(["digest"]))?
        .endpoint(Endpoint::get("/protected/route/jwt", whoami).authenticate_with(["jwt"]))?
        .endpoint(Endpoint::get("/me", whoami).authenticate())?;

    let auth = Authentication::new()
        .with(Basic::new("basic", REALM, check_password))?
        .with(Form::new("form", check_password))?
        .with(Digest::new("digest", REALM, |user: String, realm: String| async move {
            (user == "Mufasa").then(|| digest_ha1(&user, &realm, "Circle of Life"))
        }))?
        .with(Jwt::new(
            "jwt",
            REALM,
            DecodingKey::from_secret(b"tutorial-secret"),
            Validation::default(),
            |claims: Claims| async move { Some(Identity::new(claims.sub)) },
        ))?;

    let app = Dispatcher::builder(router)
        .authentication(auth)
        .negotiator(Negotiator::new().with_codec(FormCodec))
        .build()?;

    Server::from_config(&config).serve(app).await
}

async fn check_password(cred: UserPasswordCredential) -> Option<Identity> {
    (cred.name == "user" && cred.password == "password").then(|| Identity::new(cred.name))
}

async fn hello(ctx: Context) -> String {
    format!("Hello {}!", ctx.param("name").unwrap_or("stranger"))
}

async fn register(mut ctx: Context) -> Result<TypedPayload, Error> {
    ctx.take_payload()
        .ok_or_else(|| Error::handler(StatusCode::BAD_REQUEST, "missing book"))
}

async fn whoami(mut ctx: Context) -> String {
    match ctx.take_identity() {
        Some(identity) => format!("Hello {}", identity.name()),
        None => "Hello stranger".to_owned(),
    }
}
