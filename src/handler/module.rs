//! User modules: named sets of optional handler functions.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::codec::{ArrayLike, Payload, ResponseBody};
use crate::handler::function::HandlerFn;

/// Loaded model, produced once by `model_fn` and shared read-only with every request.
#[derive(Clone)]
pub struct ModelHandle(Arc<dyn Any + Send + Sync>);

impl ModelHandle {
    pub fn new<T: Any + Send + Sync>(model: T) -> Self {
        ModelHandle(Arc::new(model))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModelHandle(..)")
    }
}

/// Result of a `transform_fn` or `output_fn`.
///
/// A bare body is answered with the request's accept type as content type. A body paired
/// with a content type overrides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    Body(ResponseBody),
    WithContentType(ResponseBody, String),
}

impl TransformOutput {
    pub fn into_parts(self, accept: &str) -> (ResponseBody, String) {
        match self {
            TransformOutput::Body(body) => (body, accept.to_string()),
            TransformOutput::WithContentType(body, content_type) => (body, content_type),
        }
    }
}

impl From<ResponseBody> for TransformOutput {
    fn from(body: ResponseBody) -> Self {
        TransformOutput::Body(body)
    }
}

impl From<String> for TransformOutput {
    fn from(body: String) -> Self {
        TransformOutput::Body(body.into())
    }
}

impl From<Vec<u8>> for TransformOutput {
    fn from(body: Vec<u8>) -> Self {
        TransformOutput::Body(body.into())
    }
}

impl<B: Into<ResponseBody>> From<(B, String)> for TransformOutput {
    fn from((body, content_type): (B, String)) -> Self {
        TransformOutput::WithContentType(body.into(), content_type)
    }
}

pub type ModelFn = HandlerFn<(PathBuf,), ModelHandle>;
pub type InputFn = HandlerFn<(Payload, Option<String>), ArrayLike>;
pub type PredictFn = HandlerFn<(ArrayLike, ModelHandle), ArrayLike>;
pub type OutputFn = HandlerFn<(ArrayLike, String), TransformOutput>;
pub type TransformFn = HandlerFn<(ModelHandle, Payload, Option<String>, String), TransformOutput>;
pub type PreModelFn = HandlerFn<(PathBuf,), ()>;
pub type ModelWarmupFn = HandlerFn<(PathBuf, ModelHandle), ()>;

/// Handler functions supplied by user code under a module name.
///
/// Every slot is optional. Missing slots fall back to the default inference handler when
/// the module is resolved.
#[derive(Debug, Clone, Default)]
pub struct HandlerModule {
    pub name: String,
    pub model_fn: Option<ModelFn>,
    pub input_fn: Option<InputFn>,
    pub predict_fn: Option<PredictFn>,
    pub output_fn: Option<OutputFn>,
    pub transform_fn: Option<TransformFn>,
    pub pre_model_fn: Option<PreModelFn>,
    pub model_warmup_fn: Option<ModelWarmupFn>,
}

impl HandlerModule {
    pub fn new(name: impl Into<String>) -> Self {
        HandlerModule {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_model_fn(mut self, f: ModelFn) -> Self {
        self.model_fn = Some(f);
        self
    }

    pub fn with_input_fn(mut self, f: InputFn) -> Self {
        self.input_fn = Some(f);
        self
    }

    pub fn with_predict_fn(mut self, f: PredictFn) -> Self {
        self.predict_fn = Some(f);
        self
    }

    pub fn with_output_fn(mut self, f: OutputFn) -> Self {
        self.output_fn = Some(f);
        self
    }

    pub fn with_transform_fn(mut self, f: TransformFn) -> Self {
        self.transform_fn = Some(f);
        self
    }

    pub fn with_pre_model_fn(mut self, f: PreModelFn) -> Self {
        self.pre_model_fn = Some(f);
        self
    }

    pub fn with_model_warmup_fn(mut self, f: ModelWarmupFn) -> Self {
        self.model_warmup_fn = Some(f);
        self
    }

    /// Whether any of the step-wise functions is present.
    pub fn has_pipeline_fns(&self) -> bool {
        self.input_fn.is_some() || self.predict_fn.is_some() || self.output_fn.is_some()
    }
}

/// User modules available to a worker, looked up by module name.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, HandlerModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any module already registered under the same name.
    pub fn register(&mut self, module: HandlerModule) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn with_module(mut self, module: HandlerModule) -> Self {
        self.register(module);
        self
    }

    pub fn get(&self, name: &str) -> Option<&HandlerModule> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_handle_downcasts() {
        let handle = ModelHandle::new(vec![1.0f64, 2.0]);
        assert!(handle.is::<Vec<f64>>());
        assert_eq!(handle.downcast_ref::<Vec<f64>>().map(Vec::len), Some(2));
        assert!(handle.downcast_ref::<String>().is_none());
    }

    #[test]
    fn output_parts() {
        let (body, ct) = TransformOutput::from("x".to_string()).into_parts("text/csv");
        assert_eq!((body.as_text(), ct.as_str()), (Some("x"), "text/csv"));

        let (_, ct) = TransformOutput::from(("x".to_string(), "application/json".to_string()))
            .into_parts("text/csv");
        assert_eq!(ct, "application/json");
    }

    #[test]
    fn registry_lookup() {
        let registry = ModuleRegistry::new()
            .with_module(HandlerModule::new("inference"))
            .with_module(HandlerModule::new("other"));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("inference"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn pipeline_presence() {
        let module = HandlerModule::new("inference").with_predict_fn(HandlerFn::new(
            "predict_fn",
            |(data, _model): (ArrayLike, ModelHandle)| Ok(data),
        ));
        assert!(module.has_pipeline_fns());
        assert!(!HandlerModule::new("inference").has_pipeline_fns());
    }
}
