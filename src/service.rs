use tracing::info;

use crate::codec::ResponseBody;
use crate::context::{RequestContext, RequestRecord};
use crate::error::HandlerResult;
use crate::handler::module::ModuleRegistry;
use crate::transformer::Transformer;

/// Entry points a model server calls on a worker.
///
/// `initialize` runs once at worker startup, `handle` for every batch. Both delegate to
/// the wrapped [`Transformer`].
#[derive(Default)]
pub struct HandlerService {
    transformer: Transformer,
}

impl HandlerService {
    pub fn new(transformer: Transformer) -> Self {
        HandlerService { transformer }
    }

    pub fn from_modules(modules: ModuleRegistry) -> Self {
        HandlerService::new(Transformer::new(modules))
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// Loads the model from the context's model directory.
    pub fn initialize(&mut self, context: &dyn RequestContext) -> HandlerResult<()> {
        info!(model_dir = ?context.model_dir(), "initializing handler service");
        self.transformer
            .validate_and_initialize(context.model_dir(), Some(context))
    }

    pub fn handle(
        &mut self,
        batch: &[RequestRecord],
        context: &mut dyn RequestContext,
    ) -> Vec<ResponseBody> {
        self.transformer.transform(batch, context)
    }
}
