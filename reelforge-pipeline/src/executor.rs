use crate::error::Result;
use async_trait::async_trait;
use reelforge_core::{Run, Stage};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Does the work of one stage. `run` carries the outputs of every stage
/// that completed before this one.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, run: &Run, stage: &Stage) -> Result<Value>;
}

/// Executors keyed by stage id.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StageExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage_id: impl Into<String>, executor: Arc<dyn StageExecutor>) {
        self.executors.insert(stage_id.into(), executor);
    }

    pub fn with(mut self, stage_id: impl Into<String>, executor: Arc<dyn StageExecutor>) -> Self {
        self.register(stage_id, executor);
        self
    }

    pub fn get(&self, stage_id: &str) -> Option<Arc<dyn StageExecutor>> {
        self.executors.get(stage_id).cloned()
    }

    pub fn contains(&self, stage_id: &str) -> bool {
        self.executors.contains_key(stage_id)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Read a string field of a completed stage's output.
pub fn output_str<'a>(run: &'a Run, stage_id: &str, field: &str) -> Option<&'a str> {
    run.completed_output(stage_id)
        .and_then(|o| o.get(field))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
