//! Glue between a model server worker and user supplied inference code.
//!
//! User code registers a [`HandlerModule`] with any subset of `model_fn`, `input_fn`,
//! `predict_fn`, `output_fn`, `transform_fn`, `pre_model_fn` and `model_warmup_fn`. The
//! [`Transformer`] fills the missing slots from an [`InferenceHandler`], loads the model
//! once and turns every request batch into response bodies, converting failures into
//! error responses instead of returning them to the server.

pub mod codec;
pub mod config;
pub mod content_types;
pub mod context;
pub mod error;
pub mod handler;
pub mod service;
pub mod telemetry;
pub mod transformer;
pub mod utils;

pub use codec::{ArrayLike, DType, Payload, ResponseBody};
pub use config::Environment;
pub use context::{InvocationContext, RequestContext, RequestRecord};
pub use error::{HandlerResult, InferenceError, ToolkitError, UnsupportedFormatError};
pub use handler::default::{DefaultInferenceHandler, InferenceHandler};
pub use handler::function::HandlerFn;
pub use handler::module::{HandlerModule, ModelHandle, ModuleRegistry, TransformOutput};
pub use handler::resolve::ResolvedHandlers;
pub use service::HandlerService;
pub use transformer::Transformer;
