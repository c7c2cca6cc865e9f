//! `application/x-www-form-urlencoded`.
//!
//! Decodes to a flat object of strings; the schema decoder coerces scalars
//! from there. Repeated keys keep the last value. Only flat objects of
//! scalars can be encoded. Bodies must decode to UTF-8.

use percent_encoding::percent_decode;
use serde_json::{Map, Value};

use super::{Codec, NegotiationError};

pub struct FormCodec;

impl Codec for FormCodec {
    fn media_type(&self) -> &'static str { "application/x-www-form-urlencoded" }

    fn decode(&self, body: &[u8]) -> Result<Value, NegotiationError> {
        let map: Map<String, Value> = parse_pairs(body)?
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Ok(Value::Object(map))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, NegotiationError> {
        let Value::Object(map) = value else {
            return Err(NegotiationError::Encode("form bodies must be objects".to_owned()));
        };
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        for (key, v) in map {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(NegotiationError::Encode(format!("field `{key}` is not a scalar")));
                }
            };
            out.append_pair(key, &text);
        }
        Ok(out.finish().into_bytes())
    }
}

/// Splits an urlencoded body into decoded pairs. A key without `=` has an
/// empty value. Fails if a key or value is not UTF-8 once decoded.
pub(crate) fn parse_pairs(body: &[u8]) -> Result<Vec<(String, String)>, NegotiationError> {
    body.split(|&b| b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = match pair.iter().position(|&b| b == b'=') {
                Some(at) => (&pair[..at], &pair[at + 1..]),
                None => (pair, &[][..]),
            };
            Ok((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(raw: &[u8]) -> Result<String, NegotiationError> {
    let spaced: Vec<u8> = raw.iter().map(|&b| if b == b'+' { b' ' } else { b }).collect();
    percent_decode(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| NegotiationError::Decode("form body is not UTF-8".to_owned()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::negotiate::{FieldType, Schema};

    #[test]
    fn decodes_into_strings() {
        let v = FormCodec.decode(b"user=jet&password=a%20b&user=spike").unwrap();
        assert_eq!(v, json!({"user": "spike", "password": "a b"}));
    }

    #[test]
    fn plus_and_bare_keys() {
        let pairs = parse_pairs(b"q=a+b%2Bc&flag&&x=").unwrap();
        assert_eq!(pairs, [("q".into(), "a b+c".into()), ("flag".into(), String::new()), ("x".into(), String::new())]);
    }

    #[test]
    fn non_utf8_bodies_are_decode_errors() {
        assert!(matches!(FormCodec.decode(b"user=%FF"), Err(NegotiationError::Decode(_))));
        assert!(matches!(FormCodec.decode(b"%C3=x"), Err(NegotiationError::Decode(_))));
        assert!(matches!(FormCodec.decode(&[b'a', b'=', 0xFF]), Err(NegotiationError::Decode(_))));
        assert_eq!(FormCodec.decode(b"name=caf%C3%A9").unwrap(), json!({"name": "café"}));
    }

    #[test]
    fn form_values_coerce_through_schema() {
        let schema = Arc::new(Schema::new("Login").field("user", FieldType::Str).field("remember", FieldType::Bool));
        let v = FormCodec.decode(b"user=jet&remember=true").unwrap();
        let p = schema.decode_value(&v).unwrap();
        assert_eq!(p.get_bool("remember"), Some(true));
    }

    #[test]
    fn encodes_flat_objects_only() {
        assert_eq!(FormCodec.encode(&json!({"id": 1, "title": "a b"})).unwrap(), b"id=1&title=a+b");
        assert!(FormCodec.encode(&json!({"tags": ["x"]})).is_err());
        assert!(FormCodec.encode(&json!([1])).is_err());
    }
}
