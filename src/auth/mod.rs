//! The authentication gate.
//!
//! A request to a protected route is *unauthenticated* until the gate starts
//! *validating* it against the configured schemes, one at a time, in
//! registration order. The first scheme that yields an [`Identity`] makes the
//! request *authenticated*; if none does, it is *rejected* with 401 and the
//! handler never runs.
//!
//! Schemes are anything implementing [`AuthScheme`]. Built in:
//!
//! | Scheme | Credentials |
//! |---|---|
//! | [`Basic`] | `Authorization: Basic base64(user:password)` |
//! | [`Form`] | urlencoded `user` / `password` body fields |
//! | [`Digest`] | RFC 7616 `Authorization: Digest …`, SHA-256 |
//! | [`Jwt`] | `Authorization: Bearer <jwt>` |

mod basic;
mod digest;
mod form;
mod jwt;

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::Request;

pub use basic::Basic;
pub use digest::{Digest, digest_ha1};
pub use form::Form;
pub use jwt::Jwt;

/// The authenticated principal attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
    attributes: BTreeMap<String, String>,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: BTreeMap::new() }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn attributes(&self) -> &BTreeMap<String, String> { &self.attributes }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A user name and password pair, as carried by Basic and Form auth.
#[derive(Clone, PartialEq, Eq)]
pub struct UserPasswordCredential {
    pub name: String,
    pub password: String,
}

impl fmt::Debug for UserPasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPasswordCredential")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Why a scheme could not produce an identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credentials for this scheme")]
    Missing,

    #[error("malformed credentials: {0}")]
    Malformed(String),

    #[error("invalid credentials: {0}")]
    Invalid(String),
}

/// A pluggable credential check.
///
/// `validate` returns `Ok(None)` when credentials were present but not
/// accepted, and an error when they were absent or unusable. Both reject.
pub trait AuthScheme: Send + Sync + 'static {
    /// Unique name routes refer to this scheme by.
    fn name(&self) -> &str;

    fn validate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<Option<Identity>, AuthError>>;

    /// `WWW-Authenticate` value sent on rejection.
    fn challenge(&self) -> Option<String> {
        None
    }
}

/// The configured schemes, in registration order.
#[derive(Clone, Default)]
pub struct Authentication {
    schemes: Vec<Arc<dyn AuthScheme>>,
}

impl Authentication {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scheme. Names must be unique.
    pub fn with(mut self, scheme: impl AuthScheme) -> Result<Self, Error> {
        self.register(scheme)?;
        Ok(self)
    }

    pub fn register(&mut self, scheme: impl AuthScheme) -> Result<(), Error> {
        if self.contains(scheme.name()) {
            return Err(Error::DuplicateScheme(scheme.name().to_owned()));
        }
        debug!(scheme = scheme.name(), "authentication scheme registered");
        self.schemes.push(Arc::new(scheme));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemes.iter().any(|s| s.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemes.iter().map(|s| s.name())
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    /// Runs the gate. `only` restricts the attempt to the named schemes;
    /// they are still tried in registration order.
    pub async fn authenticate(&self, req: &Request, only: Option<&[String]>) -> Result<Identity, Error> {
        let mut challenges = Vec::new();

        let selected = self
            .schemes
            .iter()
            .filter(|s| only.is_none_or(|names| names.iter().any(|n| n == s.name())));

        for scheme in selected {
            debug!(scheme = scheme.name(), "validating");
            // a panicking validator rejects like any other failed validation
            let outcome = AssertUnwindSafe(async { scheme.validate(req).await }).catch_unwind().await;
            match outcome {
                Ok(Ok(Some(identity))) => {
                    debug!(scheme = scheme.name(), principal = identity.name(), "authenticated");
                    return Ok(identity);
                }
                Ok(Ok(None)) => debug!(scheme = scheme.name(), "credentials not accepted"),
                Ok(Err(e)) => debug!(scheme = scheme.name(), error = %e, "validation failed"),
                Err(_) => warn!(scheme = scheme.name(), "validator panicked"),
            }
            challenges.extend(scheme.challenge());
        }

        debug!("rejected");
        Err(Error::AuthRejected { challenges })
    }
}

/// The credentials part of `Authorization: <scheme> <credentials>`, if the
/// header names `scheme` (case-insensitively).
pub(crate) fn authorization<'r>(req: &'r Request, scheme: &str) -> Result<&'r str, AuthError> {
    let header = req.header("authorization").ok_or(AuthError::Missing)?;
    let (given, rest) = header.trim().split_once(' ').ok_or(AuthError::Missing)?;
    if !given.eq_ignore_ascii_case(scheme) {
        return Err(AuthError::Missing);
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(AuthError::Malformed(format!("empty {scheme} credentials")));
    }
    Ok(rest)
}
