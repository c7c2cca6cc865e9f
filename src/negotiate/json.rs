//! `application/json`.

use serde::Serialize;
use serde_json::Value;

use super::{Codec, NegotiationError};
use crate::response::{IntoResponse, Response};

/// The default codec.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn media_type(&self) -> &'static str { "application/json" }

    fn decode(&self, body: &[u8]) -> Result<Value, NegotiationError> {
        serde_json::from_slice(body).map_err(|e| NegotiationError::Decode(e.to_string()))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, NegotiationError> {
        serde_json::to_vec(value).map_err(|e| NegotiationError::Encode(e.to_string()))
    }
}

/// A serializable handler result that is always sent as JSON.
///
/// The value still passes through the route's output schema, if one is
/// declared, and the client must accept `application/json`.
///
/// ```rust
/// use gatehouse::{Context, Json};
///
/// #[derive(serde::Serialize)]
/// struct Greeting { text: String }
///
/// async fn greet(ctx: Context) -> Json<Greeting> {
///     let name = ctx.param("name").unwrap_or("world");
///     Json(Greeting { text: format!("Hello {name}!") })
/// }
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        let value = serde_json::to_value(&self.0).map_err(|e| NegotiationError::Encode(e.to_string()));
        Response::builder().pinned(JsonCodec.media_type(), value)
    }
}
