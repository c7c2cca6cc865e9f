//! Request-scoped context handed to every handler.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::auth::Identity;
use crate::error::Error;
use crate::negotiate::{Negotiator, TypedPayload};
use crate::request::Request;

/// Everything a handler gets to see about its request.
///
/// Owned by the task handling the request and dropped with it.
pub struct Context {
    request: Request,
    params: HashMap<String, String>,
    payload: Option<TypedPayload>,
    location: Option<TypedPayload>,
    identity: Option<Identity>,
    negotiator: Arc<Negotiator>,
}

impl Context {
    pub(crate) fn new(request: Request, params: HashMap<String, String>, negotiator: Arc<Negotiator>) -> Self {
        Self { request, params, payload: None, location: None, identity: None, negotiator }
    }

    pub(crate) fn with_payload(mut self, payload: Option<TypedPayload>) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn with_location(mut self, location: Option<TypedPayload>) -> Self {
        self.location = location;
        self
    }

    pub(crate) fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn body(&self) -> &[u8] { self.request.body() }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// Returns a named path parameter.
    ///
    /// For a route `/hello/{name}`, `ctx.param("name")` on `/hello/John`
    /// returns `Some("John")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.query(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// The body decoded against the route's input schema.
    pub fn payload(&self) -> Option<&TypedPayload> {
        self.payload.as_ref()
    }

    pub fn take_payload(&mut self) -> Option<TypedPayload> {
        self.payload.take()
    }

    /// Path and query parameters decoded against the route's location schema.
    pub fn location(&self) -> Option<&TypedPayload> {
        self.location.as_ref()
    }

    /// The authenticated identity. Readable once: later calls return `None`.
    pub fn take_identity(&mut self) -> Option<Identity> {
        self.identity.take()
    }

    /// Decodes the body into `T` with the codec named by `Content-Type`.
    pub fn receive<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(self.negotiator.receive(&self.request)?)
    }
}
