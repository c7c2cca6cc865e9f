//! Unified error type.
//!
//! Startup-time variants ([`Error::Conflict`], [`Error::InvalidPattern`],
//! [`Error::InvalidSchema`], [`Error::UnknownScheme`],
//! [`Error::DuplicateScheme`]) come back from route and scheme registration
//! and should abort startup. Everything else is a per-request failure that
//! the dispatcher turns into exactly one response.

use http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::method::Method;
use crate::negotiate::NegotiationError;
use crate::response::{IntoResponse, Response};

/// The error type returned by gatehouse's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("route conflict: {method} {pattern} is already registered")]
    Conflict { method: Method, pattern: String },

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("invalid schema `{schema}`: {reason}")]
    InvalidSchema { schema: String, reason: String },

    #[error("unknown authentication scheme `{0}`")]
    UnknownScheme(String),

    #[error("authentication scheme `{0}` is already registered")]
    DuplicateScheme(String),

    #[error("no route matches {method} {path}")]
    NotFound { method: String, path: String },

    #[error("method `{0}` is not supported")]
    MethodNotAllowed(String),

    /// No configured scheme accepted the request's credentials. Carries the
    /// `WWW-Authenticate` challenges of every scheme that was consulted.
    #[error("authentication required")]
    AuthRejected { challenges: Vec<String> },

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Business-logic failure raised by a handler, with a status of its choosing.
    #[error("{message}")]
    Handler { status: StatusCode, message: String },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Shorthand for a handler-raised error.
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Handler { status, message: message.into() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::AuthRejected { .. } => StatusCode::UNAUTHORIZED,
            Self::Negotiation(e) => e.status(),
            Self::Handler { status, .. } => *status,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidPattern { .. }
            | Self::InvalidSchema { .. }
            | Self::UnknownScheme(_)
            | Self::DuplicateScheme(_)
            | Self::Io(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable name used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::InvalidSchema { .. } => "invalid_schema",
            Self::UnknownScheme(_) => "unknown_scheme",
            Self::DuplicateScheme(_) => "duplicate_scheme",
            Self::NotFound { .. } => "not_found",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::AuthRejected { .. } => "unauthorized",
            Self::Negotiation(e) => e.kind(),
            Self::Handler { .. } => "handler_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Io(_) | Self::Config(_) => "internal",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal failures are logged by the dispatcher; the client only
        // gets a generic message for them.
        let message = if status.is_server_error() && !matches!(self, Self::Handler { .. }) {
            "internal server error".to_owned()
        } else {
            self.to_string()
        };
        let body = json!({
            "status": status.as_u16(),
            "error": self.kind(),
            "message": message,
        });

        let mut builder = Response::builder().status(status);
        if let Self::AuthRejected { challenges } = &self {
            for challenge in challenges {
                builder = builder.header("www-authenticate", challenge);
            }
        }
        builder.json(body.to_string().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_is_structured() {
        let res = Error::NotFound { method: "GET".into(), path: "/nope".into() }.into_response();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], 404);
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "no route matches GET /nope");
    }

    #[test]
    fn rejection_carries_challenges() {
        let res = Error::AuthRejected {
            challenges: vec![r#"Basic realm="a""#.into(), r#"Bearer realm="b""#.into()],
        }
        .into_response();
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        let values: Vec<_> = res.headers_named("www-authenticate").collect();
        assert_eq!(values, [r#"Basic realm="a""#, r#"Bearer realm="b""#]);
    }

    #[test]
    fn handler_errors_keep_their_message() {
        let res = Error::handler(StatusCode::SERVICE_UNAVAILABLE, "db down").into_response();
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["message"], "db down");
    }
}
