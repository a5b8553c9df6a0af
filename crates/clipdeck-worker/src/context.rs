//! Shared dependencies of every job.

use std::sync::Arc;

use clipdeck_media::{CommandExecutor, MediaTools};
use clipdeck_models::ResourceId;
use clipdeck_source::MediaSource;
use clipdeck_store::Store;

use crate::config::PipelineConfig;
use crate::layout::ResourceLayout;

/// Explicitly constructed at startup and cloned into job tasks.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub store: Arc<dyn Store>,
    pub executor: Arc<dyn CommandExecutor>,
    pub source: Arc<dyn MediaSource>,
    pub tools: MediaTools,
}

impl PipelineContext {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn Store>,
        executor: Arc<dyn CommandExecutor>,
        source: Arc<dyn MediaSource>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            executor,
            source,
            tools: MediaTools::default(),
        }
    }

    pub fn with_tools(mut self, tools: MediaTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn layout(&self, resource_id: &ResourceId) -> ResourceLayout {
        ResourceLayout::new(&self.config.data_dir, resource_id)
    }
}
