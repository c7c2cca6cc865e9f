//! Schemas and schema-typed payloads.
//!
//! A [`Schema`] is plain data declared at registration time: an ordered list
//! of named, typed fields. Decoding a body against it yields a
//! [`TypedPayload`] holding exactly those fields, in that order. Encoding a
//! payload emits exactly those fields again, so the two are inverses.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::NegotiationError;
use crate::response::{IntoResponse, Response};

/// Declared type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Str,
    List(Box<FieldType>),
    Object(Arc<Schema>),
}

impl FieldType {
    /// The empty/zero value emitted for an absent optional field.
    pub fn zero(&self) -> Value {
        match self {
            Self::Int => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Bool => Value::Bool(false),
            Self::Str => Value::String(String::new()),
            Self::List(_) => Value::Array(Vec::new()),
            Self::Object(schema) => schema.empty().to_value(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Int => "an integer",
            Self::Float => "a number",
            Self::Bool => "a boolean",
            Self::Str => "a string",
            Self::List(_) => "a list",
            Self::Object(_) => "an object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    ty: FieldType,
    required: bool,
    default: Option<Value>,
}

impl Field {
    pub fn name(&self) -> &str { &self.name }
    pub fn ty(&self) -> &FieldType { &self.ty }
    pub fn is_required(&self) -> bool { self.required }

    fn fallback(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.ty.zero())
    }
}

/// An ordered set of named, typed fields.
///
/// ```rust
/// use gatehouse::{FieldType, Schema};
///
/// let book = Schema::new("Book")
///     .field("id", FieldType::Int)
///     .field("title", FieldType::Str)
///     .optional_with("author", FieldType::Str, "anonymous");
/// assert_eq!(book.fields().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: Vec::new() }
    }

    /// Adds a required field. Redeclaring a name replaces the earlier
    /// declaration in place.
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.push(Field { name: name.into(), ty, required: true, default: None })
    }

    /// Adds an optional field that defaults to the type's zero value.
    pub fn optional(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.push(Field { name: name.into(), ty, required: false, default: None })
    }

    /// Adds an optional field with an explicit default. The default is
    /// coerced to the field type the way decoded values are (`1` into a
    /// Float field becomes `1.0`); one that cannot be is reported by
    /// [`Schema::check`] when the route is registered.
    pub fn optional_with(self, name: impl Into<String>, ty: FieldType, default: impl Into<Value>) -> Self {
        let name = name.into();
        let raw = default.into();
        let default = coerce(&ty, &raw, &name, Mode::Project).unwrap_or(raw);
        self.push(Field { name, ty, required: false, default: Some(default) })
    }

    /// Verifies that every declared default has its field's type, nested
    /// object schemas included.
    pub fn check(&self) -> Result<(), NegotiationError> {
        for field in &self.fields {
            if let Some(default) = &field.default {
                coerce(&field.ty, default, &field.name, Mode::Project)?;
            }
            check_type(&field.ty)?;
        }
        Ok(())
    }

    fn push(mut self, field: Field) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn fields(&self) -> &[Field] { &self.fields }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// A payload with every field set to its default.
    pub fn empty(self: &Arc<Self>) -> TypedPayload {
        TypedPayload {
            schema: Arc::clone(self),
            values: self.fields.iter().map(Field::fallback).collect(),
        }
    }

    /// Decodes a JSON body.
    pub fn decode_json(self: &Arc<Self>, body: &[u8]) -> Result<TypedPayload, NegotiationError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| NegotiationError::Decode(e.to_string()))?;
        self.decode_value(&value)
    }

    /// Decodes an already-parsed value. Unknown keys are dropped.
    pub fn decode_value(self: &Arc<Self>, value: &Value) -> Result<TypedPayload, NegotiationError> {
        let values = conform(self, value, "", Mode::Decode)?;
        Ok(TypedPayload { schema: Arc::clone(self), values })
    }

    /// Decodes string pairs such as path and query parameters. Scalars are
    /// coerced from their string form.
    pub fn decode_pairs<'a, I>(self: &Arc<Self>, pairs: I) -> Result<TypedPayload, NegotiationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let map: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
            .collect();
        self.decode_value(&Value::Object(map))
    }

    /// Projects any serializable value onto this schema: undeclared fields
    /// are dropped, absent ones take their default, and a value of the wrong
    /// type is an encode error.
    pub fn project<T: Serialize + ?Sized>(self: &Arc<Self>, value: &T) -> Result<TypedPayload, NegotiationError> {
        let value = serde_json::to_value(value).map_err(|e| NegotiationError::Encode(e.to_string()))?;
        self.project_value(&value)
    }

    pub fn project_value(self: &Arc<Self>, value: &Value) -> Result<TypedPayload, NegotiationError> {
        let values = conform(self, value, "", Mode::Project)?;
        Ok(TypedPayload { schema: Arc::clone(self), values })
    }
}

fn check_type(ty: &FieldType) -> Result<(), NegotiationError> {
    match ty {
        FieldType::Object(schema) => schema.check(),
        FieldType::List(inner) => check_type(inner),
        _ => Ok(()),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Decode,
    Project,
}

impl Mode {
    fn mismatch(self, message: String) -> NegotiationError {
        match self {
            Self::Decode => NegotiationError::Decode(message),
            Self::Project => NegotiationError::Encode(message),
        }
    }
}

fn conform(schema: &Schema, value: &Value, prefix: &str, mode: Mode) -> Result<Vec<Value>, NegotiationError> {
    let Value::Object(map) = value else {
        let at = if prefix.is_empty() { "body" } else { prefix };
        return Err(mode.mismatch(format!("{at}: expected an object for `{}`", schema.name)));
    };

    schema
        .fields
        .iter()
        .map(|field| {
            let path = if prefix.is_empty() { field.name.clone() } else { format!("{prefix}.{}", field.name) };
            match map.get(&field.name) {
                None | Some(Value::Null) if field.required && mode == Mode::Decode => {
                    Err(NegotiationError::Schema { field: path })
                }
                None | Some(Value::Null) => Ok(field.fallback()),
                Some(v) => coerce(&field.ty, v, &path, mode),
            }
        })
        .collect()
}

fn coerce(ty: &FieldType, value: &Value, path: &str, mode: Mode) -> Result<Value, NegotiationError> {
    let mismatch = || mode.mismatch(format!("{path}: expected {}, found {value}", ty.describe()));

    match (ty, value) {
        (FieldType::Int, Value::Number(n)) => n.as_i64().map(Value::from).ok_or_else(mismatch),
        (FieldType::Int, Value::String(s)) => s.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch()),

        (FieldType::Float, Value::Number(n)) => n.as_f64().map(Value::from).ok_or_else(mismatch),
        (FieldType::Float, Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::from(f)),
            _ => Err(mismatch()),
        },

        (FieldType::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
        (FieldType::Bool, Value::String(s)) => match s.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },

        (FieldType::Str, Value::String(s)) => Ok(Value::String(s.clone())),

        (FieldType::List(inner), Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| coerce(inner, item, &format!("{path}[{i}]"), mode))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),

        (FieldType::Object(schema), v @ Value::Object(_)) => {
            let values = conform(schema, v, path, mode)?;
            Ok(to_object(schema, &values))
        }

        _ => Err(mismatch()),
    }
}

fn to_object(schema: &Schema, values: &[Value]) -> Value {
    let map: Map<String, Value> = schema
        .fields
        .iter()
        .zip(values)
        .map(|(f, v)| (f.name.clone(), v.clone()))
        .collect();
    Value::Object(map)
}

// ── TypedPayload ──────────────────────────────────────────────────────────────

/// Values for every field of a [`Schema`], in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedPayload {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl TypedPayload {
    pub fn schema(&self) -> &Arc<Schema> { &self.schema }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> { self.get(name)?.as_i64() }
    pub fn get_f64(&self, name: &str) -> Option<f64> { self.get(name)?.as_f64() }
    pub fn get_bool(&self, name: &str) -> Option<bool> { self.get(name)?.as_bool() }
    pub fn get_str(&self, name: &str) -> Option<&str> { self.get(name)?.as_str() }

    /// Sets a declared field. The value must already have the field's type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), NegotiationError> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| NegotiationError::Encode(format!("`{}` has no field `{name}`", self.schema.name)))?;
        let field = &self.schema.fields[index];
        let value = value.into();
        let value = match value {
            Value::Null if !field.required => field.fallback(),
            v => coerce(&field.ty, &v, name, Mode::Project)?,
        };
        self.values[index] = value;
        Ok(())
    }

    /// The payload as an ordered JSON object.
    pub fn to_value(&self) -> Value {
        to_object(&self.schema, &self.values)
    }

    /// Encodes as JSON. Field order is schema order.
    pub fn to_json(&self) -> Vec<u8> {
        self.to_value().to_string().into_bytes()
    }

    /// Converts into a Rust type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, NegotiationError> {
        serde_json::from_value(self.to_value()).map_err(|e| NegotiationError::Decode(e.to_string()))
    }
}

impl IntoResponse for TypedPayload {
    fn into_response(self) -> Response {
        Response::negotiated(self.to_value())
    }
}
