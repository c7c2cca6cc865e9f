//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use percent_encoding::percent_decode_str;

use crate::negotiate::NegotiationError;

/// An incoming HTTP request, parsed and fully buffered.
///
/// The server builds one per hyper request; tests build them directly:
///
/// ```rust
/// use gatehouse::Request;
///
/// let req = Request::new("POST", "/book/register?dry_run=1")
///     .with_header("content-type", "application/json")
///     .with_body(r#"{"id":1}"#);
/// assert_eq!(req.path(), "/book/register");
/// assert_eq!(req.query("dry_run"), Some("1"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) raw_query: Option<String>,
    pub(crate) query: HashMap<String, String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
}

impl Request {
    /// `target` is the request-target as sent on the wire: path plus
    /// optional `?query`. Duplicate query keys keep the last value.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_owned())),
            None => (target, None),
        };
        let query = raw_query
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Self {
            method: method.into(),
            path: if path.is_empty() { "/".to_owned() } else { path.to_owned() },
            raw_query,
            query,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &str { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn query_params(&self) -> &HashMap<String, String> { &self.query }

    /// The original request-target (path and raw query).
    pub fn target(&self) -> String {
        match &self.raw_query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    /// Case-insensitive header lookup. Returns the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Percent-decoded path segments with the trailing slash normalized away.
    /// Fails if a segment does not decode to UTF-8.
    pub fn segments(&self) -> Result<Vec<String>, NegotiationError> {
        split_path(&self.path)
    }
}

/// Splits a request path into decoded segments. `/` and `""` have none;
/// `/a/b/` and `/a/b` are the same two segments.
pub(crate) fn split_path(path: &str) -> Result<Vec<String>, NegotiationError> {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split('/')
        .map(|s| {
            percent_decode_str(s)
                .decode_utf8()
                .map(|decoded| decoded.into_owned())
                .map_err(|_| NegotiationError::Decode(format!("path segment `{s}` is not UTF-8")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_duplicates_keep_last_value() {
        let req = Request::new("GET", "/search?q=a&page=2&q=b");
        assert_eq!(req.query("q"), Some("b"));
        assert_eq!(req.query("page"), Some("2"));
        assert_eq!(req.target(), "/search?q=a&page=2&q=b");
    }

    #[test]
    fn trailing_slash_is_normalized() {
        assert_eq!(split_path("/hello/John/").unwrap(), ["hello", "John"]);
        assert_eq!(split_path("/hello/John").unwrap(), ["hello", "John"]);
        assert!(split_path("/").unwrap().is_empty());
        assert!(split_path("").unwrap().is_empty());
    }

    #[test]
    fn segments_are_percent_decoded() {
        assert_eq!(split_path("/hello/John%20Doe").unwrap(), ["hello", "John Doe"]);
        assert_eq!(split_path("/a//b").unwrap(), ["a", "", "b"]);
    }

    #[test]
    fn non_utf8_segments_are_rejected() {
        assert!(matches!(split_path("/hello/%FF%FE"), Err(NegotiationError::Decode(_))));
        assert!(Request::new("GET", "/a/%C3").segments().is_err());
        assert_eq!(Request::new("GET", "/caf%C3%A9").segments().unwrap(), ["café"]);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::new("GET", "/").with_header("Content-Type", "text/plain");
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.header("accept"), None);
    }
}
