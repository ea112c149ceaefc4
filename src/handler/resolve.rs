use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::codec::{ArrayLike, Payload};
use crate::context::RequestContext;
use crate::error::{HandlerResult, InferenceError};
use crate::handler::default::InferenceHandler;
use crate::handler::function::HandlerFn;
use crate::handler::module::{
    HandlerModule, InputFn, ModelFn, ModelHandle, ModelWarmupFn, OutputFn, PreModelFn,
    PredictFn, TransformFn,
};

const EXCLUSIVE_TRANSFORM_FN: &str = "Cannot use transform_fn implementation in conjunction \
    with input_fn, predict_fn, and/or output_fn implementation";

/// The effective handler functions of a worker.
///
/// Each slot holds the user module's function when it defines one, otherwise the default
/// handler's capability. `transform_fn` is always present: without a user override it
/// chains `input_fn`, `predict_fn` and `output_fn`.
#[derive(Debug, Clone)]
pub struct ResolvedHandlers {
    pub model_fn: ModelFn,
    pub input_fn: InputFn,
    pub predict_fn: PredictFn,
    pub output_fn: OutputFn,
    pub transform_fn: TransformFn,
    pub pre_model_fn: Option<PreModelFn>,
    pub model_warmup_fn: Option<ModelWarmupFn>,
}

impl ResolvedHandlers {
    /// Fills the handler slots from `module`, falling back to `defaults`.
    ///
    /// Fails when the module defines `transform_fn` alongside any of the step-wise
    /// functions, before anything is loaded.
    pub fn resolve(
        module: Option<&HandlerModule>,
        defaults: Arc<dyn InferenceHandler>,
    ) -> HandlerResult<Self> {
        let empty = HandlerModule::default();
        let module = match module {
            Some(module) => {
                info!(module = %module.name, "resolving handlers from user module");
                module
            }
            None => {
                info!("no user module found, using default handlers");
                &empty
            }
        };

        if module.transform_fn.is_some() && module.has_pipeline_fns() {
            return Err(InferenceError::Config(EXCLUSIVE_TRANSFORM_FN.to_string()));
        }

        let model_fn = module
            .model_fn
            .clone()
            .unwrap_or_else(|| default_model_fn(&defaults));
        let input_fn = module
            .input_fn
            .clone()
            .unwrap_or_else(|| default_input_fn(&defaults));
        let predict_fn = module
            .predict_fn
            .clone()
            .unwrap_or_else(|| default_predict_fn(&defaults));
        let output_fn = module
            .output_fn
            .clone()
            .unwrap_or_else(|| default_output_fn(&defaults));
        let transform_fn = match &module.transform_fn {
            Some(transform_fn) => transform_fn.clone(),
            None => chained_transform_fn(&input_fn, &predict_fn, &output_fn),
        };
        let pre_model_fn = module
            .pre_model_fn
            .clone()
            .or_else(|| defaults.default_pre_model_fn());
        let model_warmup_fn = module
            .model_warmup_fn
            .clone()
            .or_else(|| defaults.default_model_warmup_fn());

        debug!(
            model_fn = model_fn.name(),
            transform_fn = transform_fn.name(),
            pre_model_fn = pre_model_fn.as_ref().map(HandlerFn::name),
            model_warmup_fn = model_warmup_fn.as_ref().map(HandlerFn::name),
            "handlers resolved"
        );

        Ok(ResolvedHandlers {
            model_fn,
            input_fn,
            predict_fn,
            output_fn,
            transform_fn,
            pre_model_fn,
            model_warmup_fn,
        })
    }
}

fn default_model_fn(defaults: &Arc<dyn InferenceHandler>) -> ModelFn {
    let defaults = Arc::clone(defaults);
    HandlerFn::new("default_model_fn", move |(model_dir,): (PathBuf,)| {
        defaults.default_model_fn(&model_dir)
    })
}

fn default_input_fn(defaults: &Arc<dyn InferenceHandler>) -> InputFn {
    let defaults = Arc::clone(defaults);
    HandlerFn::new(
        "default_input_fn",
        move |(input, content_type): (Payload, Option<String>)| {
            defaults.default_input_fn(&input, content_type.as_deref())
        },
    )
}

fn default_predict_fn(defaults: &Arc<dyn InferenceHandler>) -> PredictFn {
    let defaults = Arc::clone(defaults);
    HandlerFn::new("default_predict_fn", move |(data, model): (ArrayLike, ModelHandle)| {
        defaults.default_predict_fn(data, &model)
    })
}

fn default_output_fn(defaults: &Arc<dyn InferenceHandler>) -> OutputFn {
    let defaults = Arc::clone(defaults);
    HandlerFn::new("default_output_fn", move |(prediction, accept): (ArrayLike, String)| {
        defaults.default_output_fn(&prediction, &accept)
    })
}

/// `transform_fn` that runs the three step-wise functions in order and stops at the first
/// failure. Each step is invoked with the same context as the chain itself.
fn chained_transform_fn(
    input_fn: &InputFn,
    predict_fn: &PredictFn,
    output_fn: &OutputFn,
) -> TransformFn {
    let input_fn = input_fn.clone();
    let predict_fn = predict_fn.clone();
    let output_fn = output_fn.clone();
    HandlerFn::with_context(
        "default_transform_fn",
        move |(model, input, content_type, accept): (ModelHandle, Payload, Option<String>, String),
              context: Option<&dyn RequestContext>| {
            let data = input_fn.invoke((input, content_type), context)?;
            let prediction = predict_fn.invoke((data, model), context)?;
            output_fn.invoke((prediction, accept), context)
        },
    )
}
