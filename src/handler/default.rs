use std::path::Path;

use tracing::debug;

use crate::codec::{self, ArrayLike, Payload, SUPPORTED_CONTENT_TYPES};
use crate::content_types;
use crate::error::{HandlerResult, InferenceError, UnsupportedFormatError};
use crate::handler::module::{ModelHandle, ModelWarmupFn, PreModelFn, TransformOutput};
use crate::utils;

const MODEL_FN_GUIDANCE: &str = "Please provide a model_fn implementation.\n\
    A model_fn receives the model directory and returns the loaded model handle.";

const PREDICT_FN_GUIDANCE: &str = "Please provide a predict_fn implementation.\n\
    A predict_fn receives the decoded input and the loaded model and returns the prediction.";

/// Baseline capabilities used for every handler slot a user module leaves empty.
///
/// Implementations can override any subset. Model loading and prediction have no
/// sensible default and fail unless overridden.
pub trait InferenceHandler: Send + Sync {
    fn default_model_fn(&self, model_dir: &Path) -> HandlerResult<ModelHandle> {
        debug!(model_dir = %model_dir.display(), "no model_fn provided");
        Err(InferenceError::NotImplemented(MODEL_FN_GUIDANCE.to_string()))
    }

    fn default_input_fn(
        &self,
        input: &Payload,
        content_type: Option<&str>,
    ) -> HandlerResult<ArrayLike> {
        codec::decode(input, content_type.unwrap_or_default())
    }

    fn default_predict_fn(
        &self,
        _data: ArrayLike,
        _model: &ModelHandle,
    ) -> HandlerResult<ArrayLike> {
        Err(InferenceError::NotImplemented(PREDICT_FN_GUIDANCE.to_string()))
    }

    /// Encodes for the first type in `accept` that has an encoder and reports that type.
    fn default_output_fn(
        &self,
        prediction: &ArrayLike,
        accept: &str,
    ) -> HandlerResult<TransformOutput> {
        for content_type in utils::parse_accept(accept) {
            let essence = content_types::essence(content_type);
            if SUPPORTED_CONTENT_TYPES.contains(&essence.as_str()) {
                let body = codec::encode(prediction, content_type)?;
                return Ok(TransformOutput::WithContentType(body, content_type.to_string()));
            }
        }
        Err(UnsupportedFormatError::new(accept).into())
    }

    /// Hook run before the model is loaded, unless the user module brings its own.
    fn default_pre_model_fn(&self) -> Option<PreModelFn> {
        None
    }

    /// Hook run after the model is loaded, unless the user module brings its own.
    fn default_model_warmup_fn(&self) -> Option<ModelWarmupFn> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInferenceHandler;

impl InferenceHandler for DefaultInferenceHandler {}
