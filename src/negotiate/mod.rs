//! Content negotiation.
//!
//! The [`Negotiator`] owns an ordered list of [`Codec`]s. The first one is
//! the default. Request bodies are decoded with the codec named by
//! `Content-Type`; structured response bodies are encoded with the best codec
//! the client's `Accept` header allows.

mod form;
mod json;
mod schema;

use std::sync::Arc;

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::request::Request;

pub use form::FormCodec;
pub(crate) use form::parse_pairs;
pub use json::{Json, JsonCodec};
pub use schema::{Field, FieldType, Schema, TypedPayload};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NegotiationError {
    /// Malformed body, or a value that cannot be coerced to its field type.
    #[error("malformed body: {0}")]
    Decode(String),

    #[error("missing required field `{field}`")]
    Schema { field: String },

    #[error("unsupported content type `{0}`")]
    UnsupportedMediaType(String),

    #[error("cannot produce any of `{0}`")]
    NotAcceptable(String),

    /// A response value does not fit its declared schema.
    #[error("cannot encode response: {0}")]
    Encode(String),
}

impl NegotiationError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::Schema { .. } => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::Schema { .. } => "schema_error",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::NotAcceptable(_) => "not_acceptable",
            Self::Encode(_) => "encode_error",
        }
    }
}

/// A wire format that converts between bytes and [`Value`]s.
pub trait Codec: Send + Sync + 'static {
    /// Media type essence, lowercase, without parameters (`application/json`).
    fn media_type(&self) -> &'static str;

    /// Full `Content-Type` value written on responses.
    fn content_type(&self) -> &'static str {
        self.media_type()
    }

    fn decode(&self, body: &[u8]) -> Result<Value, NegotiationError>;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, NegotiationError>;
}

/// Picks codecs for requests and responses.
#[derive(Clone)]
pub struct Negotiator {
    codecs: Vec<Arc<dyn Codec>>,
}

impl Negotiator {
    /// A negotiator that speaks JSON only.
    pub fn new() -> Self {
        Self { codecs: vec![Arc::new(JsonCodec)] }
    }

    /// Registers another codec after the existing ones. A codec for an
    /// already-registered media type replaces the old one in place.
    pub fn with_codec(mut self, codec: impl Codec) -> Self {
        let codec: Arc<dyn Codec> = Arc::new(codec);
        match self.codecs.iter_mut().find(|c| c.media_type() == codec.media_type()) {
            Some(slot) => *slot = codec,
            None => self.codecs.push(codec),
        }
        self
    }

    pub fn media_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.codecs.iter().map(|c| c.media_type())
    }

    /// The codec matching a request's `Content-Type`.
    pub fn request_codec(&self, content_type: Option<&str>) -> Result<&dyn Codec, NegotiationError> {
        let Some(raw) = content_type else {
            return Err(NegotiationError::UnsupportedMediaType("(none)".to_owned()));
        };
        let essence = essence(raw);
        self.codecs
            .iter()
            .find(|c| c.media_type() == essence)
            .map(|c| c.as_ref())
            .ok_or_else(|| NegotiationError::UnsupportedMediaType(raw.to_owned()))
    }

    /// The best codec for a request's `Accept` header. A missing or empty
    /// header selects the default codec. With `required` set only that media
    /// type is a candidate.
    pub fn response_codec(&self, accept: Option<&str>, required: Option<&str>) -> Result<&dyn Codec, NegotiationError> {
        let candidates: Vec<&dyn Codec> = self
            .codecs
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| required.is_none_or(|r| c.media_type() == r))
            .collect();

        let accept = accept.map(str::trim).filter(|a| !a.is_empty());
        let not_acceptable = || NegotiationError::NotAcceptable(accept.unwrap_or("(none)").to_owned());

        let Some(accept) = accept else {
            return candidates.first().copied().ok_or_else(not_acceptable);
        };

        for range in parse_accept(accept) {
            if let Some(codec) = candidates.iter().find(|c| media_range_matches(&range, c.media_type())) {
                return Ok(*codec);
            }
        }
        Err(not_acceptable())
    }

    /// Decodes a request body against `schema`.
    pub fn decode(&self, req: &Request, schema: &Arc<Schema>) -> Result<TypedPayload, NegotiationError> {
        let value = self.request_codec(req.header("content-type"))?.decode(req.body())?;
        schema.decode_value(&value)
    }

    /// Decodes a request body into any deserializable type.
    pub fn receive<T: DeserializeOwned>(&self, req: &Request) -> Result<T, NegotiationError> {
        let value = self.request_codec(req.header("content-type"))?.decode(req.body())?;
        serde_json::from_value(value).map_err(|e| NegotiationError::Decode(e.to_string()))
    }
}

impl Default for Negotiator {
    fn default() -> Self { Self::new() }
}

/// `Application/JSON; charset=utf-8` -> `application/json`
fn essence(media_type: &str) -> String {
    media_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// Media ranges in preference order: descending q, ties keep header order.
/// Ranges with `q=0` are dropped.
fn parse_accept(header: &str) -> Vec<String> {
    let mut ranges: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let range = parts.next()?.trim().to_ascii_lowercase();
            if range.is_empty() {
                return None;
            }
            let q = parts
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (q > 0.0).then_some((range, q))
        })
        .collect();
    ranges.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranges.into_iter().map(|(r, _)| r).collect()
}

fn media_range_matches(range: &str, media_type: &str) -> bool {
    if range == "*/*" || range == "*" {
        return true;
    }
    match range.strip_suffix("/*") {
        Some(ty) => media_type.split('/').next() == Some(ty),
        None => range == media_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both() -> Negotiator {
        Negotiator::new().with_codec(FormCodec)
    }

    #[test]
    fn request_codec_ignores_parameters_and_case() {
        let n = both();
        assert_eq!(n.request_codec(Some("Application/JSON; charset=utf-8")).unwrap().media_type(), "application/json");
        assert_eq!(
            n.request_codec(Some("application/x-www-form-urlencoded")).unwrap().media_type(),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn unknown_or_missing_content_type_is_unsupported() {
        let n = Negotiator::new();
        assert!(matches!(n.request_codec(Some("text/xml")), Err(NegotiationError::UnsupportedMediaType(_))));
        assert!(matches!(n.request_codec(None), Err(NegotiationError::UnsupportedMediaType(_))));
    }

    #[test]
    fn accept_selects_by_quality() {
        let n = both();
        let pick = |accept| n.response_codec(Some(accept), None).map(|c| c.media_type());
        assert_eq!(pick("application/x-www-form-urlencoded;q=0.9, application/json"), Ok("application/json"));
        assert_eq!(pick("application/json;q=0.1, application/x-www-form-urlencoded"), Ok("application/x-www-form-urlencoded"));
        assert_eq!(pick("text/html, */*;q=0.8"), Ok("application/json"));
        assert_eq!(pick("application/*"), Ok("application/json"));
    }

    #[test]
    fn missing_accept_uses_default() {
        assert_eq!(both().response_codec(None, None).unwrap().media_type(), "application/json");
        assert_eq!(both().response_codec(Some(""), None).unwrap().media_type(), "application/json");
    }

    #[test]
    fn unacceptable_types_are_rejected() {
        let n = Negotiator::new();
        assert!(matches!(n.response_codec(Some("text/html"), None), Err(NegotiationError::NotAcceptable(_))));
        assert!(matches!(n.response_codec(Some("application/json;q=0"), None), Err(NegotiationError::NotAcceptable(_))));
    }

    #[test]
    fn required_media_type_narrows_candidates() {
        let n = both();
        let form = "application/x-www-form-urlencoded";
        assert!(n.response_codec(Some(form), Some("application/json")).is_err());
        assert_eq!(n.response_codec(Some("*/*"), Some(form)).unwrap().media_type(), form);
    }

    #[test]
    fn receive_deserializes_rust_types() {
        #[derive(serde::Deserialize)]
        struct Login {
            user: String,
        }
        let req = Request::new("POST", "/login")
            .with_header("content-type", "application/json")
            .with_body(r#"{"user":"jet"}"#);
        let login: Login = Negotiator::new().receive(&req).unwrap();
        assert_eq!(login.user, "jet");
    }
}
