use std::sync::Arc;

use dubflow_pipeline::{
    MediaSeparator, ModelClient, SegmenterConfig, TranslationWorkflow,
};
use dubflow_services::{ObjectStore, TaskStore, TranscriptStore};

/// Shared handles behind every route. Per-process state is limited to the
/// pooled clients and store handles; all per-job state lives in the workflow.
#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskStore>,
    pub transcripts: Arc<dyn TranscriptStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub separator: Arc<dyn MediaSeparator>,
    pub model: Arc<ModelClient>,
    pub segmenter_config: SegmenterConfig,
}

impl AppState {
    pub fn workflow(&self) -> TranslationWorkflow {
        TranslationWorkflow::new(
            self.tasks.clone(),
            self.transcripts.clone(),
            self.objects.clone(),
            self.separator.clone(),
            self.model.clone(),
            self.segmenter_config.clone(),
        )
    }
}
