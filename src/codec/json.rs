use serde_json::Value;

use crate::codec::array::{ArrayLike, DType};
use crate::error::{HandlerResult, InferenceError};

pub fn decode(text: &str, dtype: Option<DType>) -> HandlerResult<ArrayLike> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| InferenceError::codec(format!("Invalid JSON payload: {e}")))?;
    let array = ArrayLike::from_value(value);
    match dtype {
        Some(dtype) => array.cast(dtype),
        None => Ok(array),
    }
}

/// Arrays are serialized as nested lists; sparse and opaque values are rejected.
pub fn encode(array: &ArrayLike) -> HandlerResult<String> {
    let value = array.to_value()?;
    serde_json::to_string(&value).map_err(|e| InferenceError::type_error(e.to_string()))
}
