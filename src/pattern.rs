//! Route path patterns.
//!
//! A pattern is a `/`-separated list of segments. A segment written `{name}`
//! is a parameter and binds whatever the request has in that position;
//! anything else is a literal that must match exactly.

use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed, validated route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parses `raw`. A leading slash is optional and a trailing slash is
    /// ignored, so `/user/{id}/`, `user/{id}` and `/user/{id}` are equal.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let invalid = |reason| Error::InvalidPattern { pattern: raw.to_owned(), reason };

        let trimmed = raw.trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self { segments: Vec::new() });
        }

        let mut segments = Vec::new();
        for part in trimmed.split('/') {
            if part.is_empty() {
                return Err(invalid("empty path segment"));
            }
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => {
                    if name.is_empty() {
                        return Err(invalid("parameter name is empty"));
                    }
                    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                        return Err(invalid("parameter names may only use [A-Za-z0-9_]"));
                    }
                    if segments.iter().any(|s| matches!(s, Segment::Param(n) if n == name)) {
                        return Err(invalid("duplicate parameter name"));
                    }
                    Segment::Param(name.to_owned())
                }
                None if part.contains(['{', '}']) => {
                    return Err(invalid("a parameter must span a whole segment"));
                }
                None => Segment::Literal(part.to_owned()),
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] { &self.segments }

    pub fn len(&self) -> usize { self.segments.len() }

    pub fn is_root(&self) -> bool { self.segments.is_empty() }

    pub fn param_count(&self) -> usize {
        self.segments.iter().filter(|s| matches!(s, Segment::Param(_))).count()
    }

    /// Whether both patterns match exactly the same set of paths: same
    /// literals in the same positions, parameters in the same positions.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(&other.segments).all(|pair| match pair {
                (Segment::Literal(a), Segment::Literal(b)) => a == b,
                (Segment::Param(_), Segment::Param(_)) => true,
                _ => false,
            })
    }

    /// `prefix` followed by `self`.
    pub(crate) fn prefixed(&self, prefix: &PathPattern) -> PathPattern {
        let mut segments = prefix.segments.clone();
        segments.extend(self.segments.iter().cloned());
        PathPattern { segments }
    }

    /// Binds `path` against this pattern, returning `(name, value)` pairs in
    /// pattern order, or `None` if any segment disagrees.
    pub(crate) fn bind<'p, 's>(&'p self, path: &'s [String]) -> Option<Vec<(&'p str, &'s str)>> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::with_capacity(self.param_count());
        for (segment, value) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(lit) if lit == value => {}
                Segment::Param(name) if !value.is_empty() => params.push((name.as_str(), value.as_str())),
                _ => return None,
            }
        }
        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => write!(f, "/{lit}")?,
                Segment::Param(name) => write!(f, "/{{{name}}}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        crate::request::split_path(p).unwrap()
    }

    #[test]
    fn parses_literals_and_params() {
        let p = PathPattern::parse("/hello/{name}").unwrap();
        assert_eq!(p.segments(), [Segment::Literal("hello".into()), Segment::Param("name".into())]);
        assert_eq!(p.param_count(), 1);
        assert_eq!(p.to_string(), "/hello/{name}");
    }

    #[test]
    fn slashes_are_normalized() {
        assert_eq!(PathPattern::parse("user/{id}/").unwrap(), PathPattern::parse("/user/{id}").unwrap());
        assert!(PathPattern::parse("/").unwrap().is_root());
        assert_eq!(PathPattern::parse("").unwrap().to_string(), "/");
    }

    #[test]
    fn rejects_malformed_patterns() {
        for bad in ["/a//b", "/user/{}", "/user/id{x}", "/a/{x}/{x}", "/a/{x-y}"] {
            assert!(
                matches!(PathPattern::parse(bad), Err(Error::InvalidPattern { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn shape_ignores_parameter_names() {
        let a = PathPattern::parse("/user/{id}").unwrap();
        let b = PathPattern::parse("/user/{name}").unwrap();
        let c = PathPattern::parse("/user/detail").unwrap();
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }

    #[test]
    fn bind_extracts_values() {
        let p = PathPattern::parse("/book/{id}/page/{page}").unwrap();
        let segs = path("/book/7/page/12");
        assert_eq!(p.bind(&segs), Some(vec![("id", "7"), ("page", "12")]));
        assert_eq!(p.bind(&path("/book/7/chapter/12")), None);
        assert_eq!(p.bind(&path("/book/7/page")), None);
    }

    #[test]
    fn parameter_does_not_bind_empty_segment() {
        let p = PathPattern::parse("/a/{x}/b").unwrap();
        assert_eq!(p.bind(&path("/a//b")), None);
    }
}
