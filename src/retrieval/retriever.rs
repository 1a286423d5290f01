//! Multi-query retrieval with Reciprocal Rank Fusion.
//!
//! Each sub-query searches the vector index independently; rankings merge
//! via RRF so sources ranked highly across several sub-queries beat one
//! strong single-query hit. A quality gate guards against generic
//! sub-queries silently replacing a better literal match: when the top
//! fused source's verified similarity is below threshold, the whole
//! multi-query result is discarded for a plain single-query search over
//! the raw directive.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::context::GenerationContext;
use crate::retrieval::intent::{RetrievalQuery, Temporal};
use crate::tokens::TokenCounter;
use crate::vector::{VectorHit, VectorSearchProvider};

/// Outcome of the retrieval pipeline, consumed by the retrieved-context
/// section and reported in diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    /// Budget-truncated text, one line per source, ready for the section.
    pub text: String,
    /// Verified similarity of the best source; what the gate compared.
    pub quality: f32,
    /// Chronicle ids included, in rendered order.
    pub sources: Vec<String>,
    /// Whether the single-query fallback produced this result.
    pub fallback_used: bool,
}

/// Merge ranked lists via Reciprocal Rank Fusion.
///
/// Each source's score becomes `sum(1 / (k + rank))` across the lists it
/// appears in. Returns (id, fused score) sorted by score descending, then
/// by id ascending for stability.
pub fn fuse_rankings(lists: &[Vec<VectorHit>], k: f32) -> Vec<(String, f32)> {
    let mut fused: HashMap<String, f32> = HashMap::new();

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            *fused.entry(hit.id.clone()).or_insert(0.0) += 1.0 / (k + (rank + 1) as f32);
        }
    }

    let mut merged: Vec<(String, f32)> = fused.into_iter().collect();
    merged.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
        Some(std::cmp::Ordering::Equal) | None => a.0.cmp(&b.0),
        Some(ordering) => ordering,
    });
    merged
}

/// Best raw similarity observed for `id` across all lists. This is the
/// "verified" score the quality gate compares: fused RRF scores live on a
/// ~1/k scale and are only meaningful relative to each other.
pub fn best_similarity(lists: &[Vec<VectorHit>], id: &str) -> f32 {
    lists
        .iter()
        .flatten()
        .filter(|hit| hit.id == id)
        .map(|hit| hit.score)
        .fold(0.0, f32::max)
}

/// Deterministic multi-query retriever.
pub struct MultiQueryRetriever {
    vector: Arc<dyn VectorSearchProvider>,
    counter: TokenCounter,
    config: RetrievalConfig,
}

impl MultiQueryRetriever {
    pub fn new(
        vector: Arc<dyn VectorSearchProvider>,
        counter: TokenCounter,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            vector,
            counter,
            config,
        }
    }

    /// Run the pipeline for a classified query. `None` means the retrieved
    /// section is omitted; no failure in here ever aborts the operation.
    pub async fn search(
        &self,
        query: &RetrievalQuery,
        directive: &str,
        budget: usize,
        ctx: &GenerationContext,
    ) -> Option<RetrievedContext> {
        let lists = self.search_sub_queries(&query.sub_queries, ctx).await;
        if lists.is_empty() {
            tracing::warn!("All sub-query searches failed; trying single-query fallback");
            return self.single_query(directive, budget, ctx).await;
        }

        let fused = fuse_rankings(&lists, self.config.rrf_k);
        let Some((top_id, top_fused)) = fused.first() else {
            return self.single_query(directive, budget, ctx).await;
        };

        let verified = best_similarity(&lists, top_id);
        if verified < self.config.quality_threshold {
            tracing::debug!(
                verified,
                threshold = self.config.quality_threshold,
                "Multi-query result below quality gate; using single-query fallback"
            );
            return self.single_query(directive, budget, ctx).await;
        }

        tracing::debug!(top_fused, verified, sources = fused.len(), "Fused retrieval accepted");

        let ordered = self.order_for_temporal(query, fused, ctx);
        self.build_context(&ordered, verified, false, budget, ctx)
    }

    /// Plain single-query search over the raw directive.
    pub async fn single_query(
        &self,
        directive: &str,
        budget: usize,
        ctx: &GenerationContext,
    ) -> Option<RetrievedContext> {
        let hits = self.search_one(directive, ctx).await?;
        let quality = hits.first().map(|h| h.score)?;
        let ordered: Vec<String> = hits.into_iter().map(|h| h.id).collect();
        self.build_context(&ordered, quality, true, budget, ctx)
    }

    /// Search every sub-query, dropping the ones that fail or time out.
    pub(crate) async fn search_sub_queries(
        &self,
        sub_queries: &[String],
        ctx: &GenerationContext,
    ) -> Vec<Vec<VectorHit>> {
        let mut lists = Vec::with_capacity(sub_queries.len());
        for sub_query in sub_queries {
            match self.search_one(sub_query, ctx).await {
                Some(hits) if !hits.is_empty() => lists.push(hits),
                _ => {}
            }
        }
        lists
    }

    async fn search_one(&self, text: &str, ctx: &GenerationContext) -> Option<Vec<VectorHit>> {
        let search = self
            .vector
            .search(text, self.config.top_k, &ctx.search.exclusions);
        match tokio::time::timeout(self.config.search_timeout(), search).await {
            Ok(Ok(hits)) => Some(hits),
            Ok(Err(e)) => {
                tracing::warn!("Vector search failed for {:?}: {}", text, e);
                None
            }
            Err(_) => {
                tracing::warn!("Vector search timed out for {:?}", text);
                None
            }
        }
    }

    /// Recall directives with an explicit temporal hint read in story
    /// order, not fused-rank order.
    pub(crate) fn order_for_temporal(
        &self,
        query: &RetrievalQuery,
        fused: Vec<(String, f32)>,
        ctx: &GenerationContext,
    ) -> Vec<String> {
        if !query.intent.needs_retrieval() || query.temporal == Temporal::Any {
            return fused.into_iter().map(|(id, _)| id).collect();
        }

        let mut with_sequence: Vec<(String, usize)> = fused
            .into_iter()
            .filter_map(|(id, _)| ctx.chronicle_entry(&id).map(|e| (id, e.sequence)))
            .collect();
        match query.temporal {
            Temporal::Earliest => with_sequence.sort_by_key(|(_, seq)| *seq),
            Temporal::Latest => with_sequence.sort_by_key(|(_, seq)| std::cmp::Reverse(*seq)),
            Temporal::Any => unreachable!("handled above"),
        }
        with_sequence.into_iter().map(|(id, _)| id).collect()
    }

    /// Resolve ids to chronicle text and truncate greedily in the given
    /// order to the token budget.
    pub(crate) fn build_context(
        &self,
        ordered: &[String],
        quality: f32,
        fallback_used: bool,
        budget: usize,
        ctx: &GenerationContext,
    ) -> Option<RetrievedContext> {
        let mut lines = Vec::new();
        let mut sources = Vec::new();
        let mut spent = 0;

        for id in ordered {
            let Some(entry) = ctx.chronicle_entry(id) else {
                tracing::debug!(id = %id, "Hit does not resolve to a chronicle entry; skipped");
                continue;
            };
            let line = format!("- {}", entry.text);
            let cost = self.counter.count(&line);
            if spent + cost > budget && !lines.is_empty() {
                break;
            }
            spent += cost;
            lines.push(line);
            sources.push(id.clone());
        }

        if lines.is_empty() {
            return None;
        }

        Some(RetrievedContext {
            text: lines.join("\n"),
            quality,
            sources,
            fallback_used,
        })
    }
}
