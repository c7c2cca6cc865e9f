//! Request matching.
//!
//! Candidates are the routes for the request's method whose pattern has as
//! many segments as the path. Among the candidates that bind, the one with
//! the fewest parameters wins, and among those the first registered.

use std::collections::HashMap;

use crate::error::Error;
use crate::method::Method;
use crate::request::split_path;
use crate::router::{Route, Router};

/// The route a request resolved to and its bound path parameters.
#[derive(Debug)]
pub struct MatchResult<'r> {
    pub route: &'r Route,
    pub params: HashMap<String, String>,
}

impl Router {
    /// Resolves `method` + `path`. Trailing slashes are ignored and segments
    /// are percent-decoded before comparison; a segment that is not UTF-8
    /// once decoded is a decode error.
    pub fn matches(&self, method: Method, path: &str) -> Result<MatchResult<'_>, Error> {
        let segments = split_path(path)?;
        let not_found = || Error::NotFound { method: method.to_string(), path: path.to_owned() };

        let candidates = self
            .index
            .get(&method)
            .and_then(|by_len| by_len.get(&segments.len()))
            .ok_or_else(not_found)?;

        let mut best: Option<(usize, &Route, Vec<(&str, &str)>)> = None;
        for &i in candidates {
            let route = self.route(i);
            let score = route.pattern().param_count();
            if best.as_ref().is_some_and(|(s, _, _)| *s <= score) {
                continue;
            }
            if let Some(bound) = route.pattern().bind(&segments) {
                best = Some((score, route, bound));
                if score == 0 {
                    break;
                }
            }
        }

        let (_, route, bound) = best.ok_or_else(not_found)?;
        let params = bound.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        Ok(MatchResult { route, params })
    }
}
