//! Vector search seam.
//!
//! The engine consumes ranked similarity hits through a provider trait;
//! the backing index (remote service, embedded database, in-memory) is the
//! caller's choice. An in-memory cosine index over a pluggable embedding
//! provider ships for tests and small deployments.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::FabulaError;

pub use memory::{HashingEmbedder, InMemoryVectorIndex};

/// One ranked similarity hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Source id; resolves to a chronicle entry on the context.
    pub id: String,
    /// Similarity in [0, 1], higher is closer.
    pub score: f32,
}

/// Ranked vector similarity search.
#[async_trait]
pub trait VectorSearchProvider: Send + Sync {
    /// Return up to `top_k` hits for `text`, best first, skipping
    /// `exclude_ids`.
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        exclude_ids: &HashSet<String>,
    ) -> Result<Vec<VectorHit>, FabulaError>;
}

/// Text embedding provider behind the in-memory index.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, FabulaError>;

    fn dimensions(&self) -> usize;

    fn is_available(&self) -> bool;
}
