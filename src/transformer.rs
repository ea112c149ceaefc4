//! Request execution for a model server worker.
//!
//! A [`Transformer`] resolves the handler functions once, loads the model through them and
//! then runs every request of a batch through `transform_fn`. Failures never escape
//! [`Transformer::transform`]: they become an error status on the context plus a single
//! response body holding the message and its trace.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use http::StatusCode;
use tracing::{debug, error, info};

use crate::codec::{Payload, ResponseBody};
use crate::config::Environment;
use crate::content_types;
use crate::context::{RequestContext, RequestRecord};
use crate::error::{HandlerResult, InferenceError, ToolkitError};
use crate::handler::default::{DefaultInferenceHandler, InferenceHandler};
use crate::handler::module::{ModelHandle, ModuleRegistry};
use crate::handler::resolve::ResolvedHandlers;
use crate::utils;

pub struct Transformer {
    default_handler: Arc<dyn InferenceHandler>,
    modules: ModuleRegistry,
    environment: Option<Environment>,
    handlers: Option<ResolvedHandlers>,
    model: Option<ModelHandle>,
    initialized: bool,
}

impl Default for Transformer {
    fn default() -> Self {
        Transformer::new(ModuleRegistry::default())
    }
}

impl Transformer {
    pub fn new(modules: ModuleRegistry) -> Self {
        Transformer {
            default_handler: Arc::new(DefaultInferenceHandler),
            modules,
            environment: None,
            handlers: None,
            model: None,
            initialized: false,
        }
    }

    /// Replaces the capabilities used for slots the user module leaves empty.
    pub fn with_default_handler(mut self, handler: impl InferenceHandler + 'static) -> Self {
        self.default_handler = Arc::new(handler);
        self
    }

    /// Uses `environment` instead of reading one from the process environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn handlers(&self) -> Option<&ResolvedHandlers> {
        self.handlers.as_ref()
    }

    pub fn model(&self) -> Option<&ModelHandle> {
        self.model.as_ref()
    }

    /// Resolves the handler functions and loads the model, once.
    ///
    /// Does nothing when already initialized. Errors are returned to the caller and leave
    /// the transformer uninitialized, so a later call starts over. Without `model_dir` the
    /// environment's model directory is used.
    #[tracing::instrument(level = "info", skip(self, context))]
    pub fn validate_and_initialize(
        &mut self,
        model_dir: Option<&Path>,
        context: Option<&dyn RequestContext>,
    ) -> HandlerResult<()> {
        if self.initialized {
            return Ok(());
        }

        let environment = match &self.environment {
            Some(environment) => environment.clone(),
            None => {
                let environment = Environment::from_env()?;
                self.environment = Some(environment.clone());
                environment
            }
        };
        let model_dir = model_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| environment.model_dir());

        let module = self.modules.get(environment.module_name());
        let handlers = ResolvedHandlers::resolve(module, Arc::clone(&self.default_handler))?;

        if let Some(pre_model_fn) = &handlers.pre_model_fn {
            pre_model_fn.invoke((model_dir.clone(),), context)?;
        }

        info!(model_dir = %model_dir.display(), "loading model");
        let model = handlers.model_fn.invoke((model_dir.clone(),), context)?;

        if let Some(model_warmup_fn) = &handlers.model_warmup_fn {
            model_warmup_fn.invoke((model_dir, model.clone()), context)?;
        }

        self.handlers = Some(handlers);
        self.model = Some(model);
        self.initialized = true;
        info!("transformer initialized");
        Ok(())
    }

    /// Runs every record of `batch` through `transform_fn`, in order.
    ///
    /// Returns one response body per record. On any failure, including a failed lazy
    /// initialization or a panicking handler, the response status is set on `context` and
    /// the result is a single body of the form `"{message}\n{trace}"`.
    #[tracing::instrument(level = "info", skip_all, fields(batch = batch.len()))]
    pub fn transform(
        &mut self,
        batch: &[RequestRecord],
        context: &mut dyn RequestContext,
    ) -> Vec<ResponseBody> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_transform(batch, context)));
        let failure = match outcome {
            Ok(Ok(responses)) => return responses,
            Ok(Err(failure)) => failure,
            Err(payload) => {
                Failure::from(InferenceError::Other(anyhow!(panic_message(payload.as_ref()))))
            }
        };
        vec![handle_error(context, failure)]
    }

    fn try_transform(
        &mut self,
        batch: &[RequestRecord],
        context: &mut dyn RequestContext,
    ) -> HandlerResult<Vec<ResponseBody>, Failure> {
        let model_dir = context.model_dir().map(Path::to_path_buf);
        self.validate_and_initialize(model_dir.as_deref(), Some(&*context))?;

        let (Some(handlers), Some(model), Some(environment)) =
            (&self.handlers, &self.model, &self.environment)
        else {
            return Err(InferenceError::Config(
                "Transformer marked initialized without handlers".to_string(),
            )
            .into());
        };

        let mut responses = Vec::with_capacity(batch.len());
        for (index, record) in batch.iter().enumerate() {
            let properties = context.request_properties(index);
            let content_type = utils::retrieve_content_type_header(&properties).map(str::to_string);
            let accept = match utils::retrieve_accept_header(&properties) {
                Some(accept) if !accept.is_empty() && accept != content_types::ANY => {
                    accept.to_string()
                }
                _ => environment.default_accept.clone(),
            };

            let input = match &content_type {
                Some(content_type) if content_types::is_utf8(content_type) => {
                    Payload::Text(
                        String::from_utf8(record.body.clone()).map_err(InferenceError::from)?,
                    )
                }
                _ => Payload::Bytes(record.body.clone()),
            };

            debug!(index, content_type = ?content_type, accept = %accept, "transforming request");
            let output = handlers.transform_fn.invoke(
                (model.clone(), input, content_type, accept.clone()),
                Some(&*context),
            )?;

            let (body, response_content_type) = output.into_parts(&accept);
            context.set_response_content_type(index, &response_content_type);
            responses.push(body);
        }
        Ok(responses)
    }
}

/// An error together with the stack captured where it surfaced.
struct Failure {
    error: InferenceError,
    trace: Backtrace,
}

impl From<InferenceError> for Failure {
    fn from(error: InferenceError) -> Self {
        Failure {
            error,
            trace: Backtrace::force_capture(),
        }
    }
}

impl Failure {
    /// The error chain followed by the captured stack.
    fn render_trace(&self) -> String {
        let chain: Vec<String> = match &self.error {
            InferenceError::Other(err) => err.chain().map(ToString::to_string).collect(),
            err => {
                let root: &(dyn std::error::Error + 'static) = err;
                std::iter::successors(Some(root), |e| e.source())
                    .map(ToString::to_string)
                    .collect()
            }
        };
        let mut trace = String::new();
        for (i, cause) in chain.iter().enumerate() {
            match i {
                0 => trace.push_str(cause),
                1 => trace.push_str(&format!("\n\nCaused by:\n    0: {cause}")),
                _ => trace.push_str(&format!("\n    {}: {cause}", i - 1)),
            }
        }
        trace.push_str(&format!("\n\nStack backtrace:\n{}", self.trace));
        trace
    }
}

/// Reports the failure on the context and renders the error response body.
fn handle_error(context: &mut dyn RequestContext, failure: Failure) -> ResponseBody {
    let err = &failure.error;
    let toolkit = match err.as_toolkit() {
        Some(toolkit) => toolkit.clone(),
        None => {
            ToolkitError::generic(StatusCode::INTERNAL_SERVER_ERROR, Some(err.to_string()), None)
        }
    };
    error!(status = %toolkit.status, error = %err, "inference request failed");

    context.set_response_status(toolkit.status, &utils::remove_crlf(&toolkit.phrase));
    ResponseBody::Text(format!("{}\n{}", toolkit.message, failure.render_trace()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
