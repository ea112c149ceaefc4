//! Conversion between request/response payloads and [`ArrayLike`] values.
//!
//! Decoders exist for JSON, CSV, NPY and sparse NPZ payloads. Encoders exist for JSON,
//! CSV and NPY; there is no encoder for the sparse format.

use std::borrow::Cow;

use tracing::debug;

use crate::content_types::{self, CSV, JSON, NPY, NPZ};
use crate::error::{HandlerResult, InferenceError, UnsupportedFormatError};

pub mod array;
pub mod csv;
pub mod json;
pub mod npy;
pub mod npz;

pub use array::{ArrayLike, DType, OpaqueValue, SparseFormat, SparseMatrix, SparseValues};

/// Content types with an encoder, in no particular order.
pub const SUPPORTED_CONTENT_TYPES: [&str; 3] = [JSON, CSV, NPY];

/// Content types with a decoder.
pub const DECODABLE_CONTENT_TYPES: [&str; 4] = [JSON, CSV, NPY, NPZ];

/// Request body as handed to an `input_fn`.
///
/// Bodies of the UTF-8 content types arrive as `Text`, everything else as `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn text(&self) -> HandlerResult<Cow<'_, str>> {
        match self {
            Payload::Text(text) => Ok(Cow::Borrowed(text)),
            Payload::Bytes(bytes) => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|e| InferenceError::codec(format!("Payload is not valid UTF-8: {e}"))),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

/// Serialized response handed back to the model server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseBody {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ResponseBody::Text(text) => text.as_bytes(),
            ResponseBody::Bytes(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            ResponseBody::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ResponseBody::Text(text) => text.into_bytes(),
            ResponseBody::Bytes(bytes) => bytes,
        }
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        ResponseBody::Text(text.to_string())
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        ResponseBody::Bytes(bytes)
    }
}

pub fn is_supported(content_type: &str) -> bool {
    let essence = content_types::essence(content_type);
    SUPPORTED_CONTENT_TYPES.contains(&essence.as_str())
}

pub fn decode(payload: &Payload, content_type: &str) -> HandlerResult<ArrayLike> {
    decode_as(payload, content_type, None)
}

/// Decodes a payload and casts the result to `dtype` when one is given.
pub fn decode_as(
    payload: &Payload,
    content_type: &str,
    dtype: Option<DType>,
) -> HandlerResult<ArrayLike> {
    debug!(content_type, bytes = payload.as_bytes().len(), "decoding payload");
    let array = match content_types::essence(content_type).as_str() {
        JSON => return json::decode(&payload.text()?, dtype),
        CSV => return csv::decode(&payload.text()?, dtype),
        NPY => npy::decode(payload.as_bytes())?,
        NPZ => npz::decode(payload.as_bytes())?,
        _ => return Err(UnsupportedFormatError::new(content_type).into()),
    };
    match dtype {
        Some(dtype) => array.cast(dtype),
        None => Ok(array),
    }
}

pub fn encode(array: &ArrayLike, content_type: &str) -> HandlerResult<ResponseBody> {
    debug!(content_type, value = array.type_name(), "encoding response");
    match content_types::essence(content_type).as_str() {
        JSON => json::encode(array).map(ResponseBody::Text),
        CSV => csv::encode(array).map(ResponseBody::Text),
        NPY => npy::encode(array).map(ResponseBody::Bytes),
        _ => Err(UnsupportedFormatError::new(content_type).into()),
    }
}
