use crate::content::ContentSource;
use crate::error::Result;
use crate::executor::StageExecutor;
use async_trait::async_trait;
use reelforge_core::{Run, Stage};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub struct ScrapeExecutor {
    source: Arc<dyn ContentSource>,
}

impl ScrapeExecutor {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl StageExecutor for ScrapeExecutor {
    async fn execute(&self, run: &Run, _stage: &Stage) -> Result<Value> {
        let page = self.source.fetch(&run.source_url).await?;
        info!(run_id = %run.id, words = page.word_count, "Page content extracted");
        Ok(serde_json::to_value(page).map_err(reelforge_core::Error::from)?)
    }
}
