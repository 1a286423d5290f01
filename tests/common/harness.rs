//! Test harness wiring the engine to scripted providers.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use fabula::backend::MockBackend;
use fabula::config::EngineConfig;
use fabula::engine::PromptEngine;
use fabula::vector::{VectorHit, VectorSearchProvider};
use fabula::FabulaError;

/// Vector index answering from scripted routes: the first route whose
/// needle occurs in the query text wins. Unrouted queries return nothing.
#[derive(Default)]
pub struct ScriptedVectorIndex {
    routes: Vec<(String, Vec<VectorHit>)>,
}

impl ScriptedVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, needle: impl Into<String>, hits: Vec<VectorHit>) -> Self {
        self.routes.push((needle.into(), hits));
        self
    }
}

pub fn hit(id: &str, score: f32) -> VectorHit {
    VectorHit {
        id: id.to_string(),
        score,
    }
}

#[async_trait]
impl VectorSearchProvider for ScriptedVectorIndex {
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        exclude_ids: &HashSet<String>,
    ) -> Result<Vec<VectorHit>, FabulaError> {
        for (needle, hits) in &self.routes {
            if text.contains(needle.as_str()) {
                let mut matched: Vec<VectorHit> = hits
                    .iter()
                    .filter(|h| !exclude_ids.contains(&h.id))
                    .cloned()
                    .collect();
                matched.truncate(top_k);
                return Ok(matched);
            }
        }
        Ok(Vec::new())
    }
}

/// Engine fixture over a scripted backend and vector index.
pub struct EngineHarness {
    pub backend: Arc<MockBackend>,
    pub engine: PromptEngine,
}

impl EngineHarness {
    /// Harness with default configuration and an empty vector index.
    pub fn new() -> Self {
        Self::with_parts(EngineConfig::default(), ScriptedVectorIndex::new())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_parts(config, ScriptedVectorIndex::new())
    }

    pub fn with_index(index: ScriptedVectorIndex) -> Self {
        Self::with_parts(EngineConfig::default(), index)
    }

    pub fn with_parts(config: EngineConfig, index: ScriptedVectorIndex) -> Self {
        let backend = Arc::new(MockBackend::new());
        let engine = PromptEngine::new(config, backend.clone(), Arc::new(index))
            .expect("engine config is valid");
        Self { backend, engine }
    }
}
