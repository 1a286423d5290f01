//! In-memory cosine index and a deterministic test embedder.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::utils::math::{cosine_similarity, vector_normalize};
use crate::vector::{EmbeddingProvider, VectorHit, VectorSearchProvider};
use crate::FabulaError;

/// Deterministic bag-of-words hashing embedder.
///
/// Each lowercased token hashes into a bucket; the count vector is
/// normalized to unit length. Overlapping vocabulary yields high cosine
/// similarity, which is exactly what retrieval tests need. Not a semantic
/// model; production callers plug a real embedding provider in.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            buckets[bucket] += 1.0;
        }
        vector_normalize(&buckets)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, FabulaError> {
        Ok(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Brute-force cosine index over embedded documents.
pub struct InMemoryVectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<(String, Vec<f32>)>>,
}

impl InMemoryVectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Embed and index a document. Re-inserting an id replaces it.
    pub async fn insert(&self, id: impl Into<String>, text: &str) -> Result<(), FabulaError> {
        let id = id.into();
        let embedding = self.embedder.embed_text(text).await?;
        let mut entries = self.entries.write().await;
        entries.retain(|(existing, _)| *existing != id);
        entries.push((id, embedding));
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorSearchProvider for InMemoryVectorIndex {
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        exclude_ids: &HashSet<String>,
    ) -> Result<Vec<VectorHit>, FabulaError> {
        if !self.embedder.is_available() {
            return Err(FabulaError::VectorSearch(
                "embedding provider unavailable".into(),
            ));
        }

        let query = self.embedder.embed_text(text).await?;
        let entries = self.entries.read().await;

        let mut hits: Vec<VectorHit> = entries
            .iter()
            .filter(|(id, _)| !exclude_ids.contains(id))
            .map(|(id, embedding)| VectorHit {
                id: id.clone(),
                score: cosine_similarity(&query, embedding),
            })
            .collect();

        // Sort by score descending, then by id ascending for stable order
        hits.sort_by(|a, b| match b.score.partial_cmp(&a.score) {
            Some(std::cmp::Ordering::Equal) | None => a.id.cmp(&b.id),
            Some(ordering) => ordering,
        });
        hits.truncate(top_k);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn index() -> InMemoryVectorIndex {
        let index = InMemoryVectorIndex::new(Arc::new(HashingEmbedder::default()));
        index
            .insert("chronicle:forge", "Aria promised the blacksmith a favor")
            .await
            .unwrap();
        index
            .insert("chronicle:gate", "Brin opened the northern gate at dawn")
            .await
            .unwrap();
        index
            .insert("chronicle:feast", "The harvest feast filled the great hall")
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_overlapping_vocabulary_ranks_first() {
        let index = index().await;
        let hits = index
            .search("what did Aria promise the blacksmith", 3, &HashSet::new())
            .await
            .unwrap();
        assert_eq!(hits[0].id, "chronicle:forge");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_exclusions_are_skipped() {
        let index = index().await;
        let excluded: HashSet<String> = ["chronicle:forge".to_string()].into();
        let hits = index
            .search("Aria promise blacksmith", 3, &excluded)
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.id != "chronicle:forge"));
    }

    #[tokio::test]
    async fn test_top_k_truncates() {
        let index = index().await;
        let hits = index.search("the", 1, &HashSet::new()).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_reinsert_replaces() {
        let index = index().await;
        index
            .insert("chronicle:forge", "completely different content now")
            .await
            .unwrap();
        assert_eq!(index.len().await, 3);
    }

    #[tokio::test]
    async fn test_deterministic_scores() {
        let index = index().await;
        let a = index
            .search("Aria blacksmith", 3, &HashSet::new())
            .await
            .unwrap();
        let b = index
            .search("Aria blacksmith", 3, &HashSet::new())
            .await
            .unwrap();
        assert_eq!(a, b);
    }
}
