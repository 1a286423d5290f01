//! Iterative recall agent.
//!
//! For "recall" intent the agent may issue several rounds of searches,
//! chasing keywords the first round did not cover, before fusing what it
//! accumulated. It runs under an iteration cap and an overall timeout and
//! returns `None` on any failure; the deterministic multi-query retriever
//! is always the unconditional fallback, so the agent is never a single
//! point of failure.

use crate::context::GenerationContext;
use crate::retrieval::intent::RetrievalQuery;
use crate::retrieval::retriever::{best_similarity, fuse_rankings, MultiQueryRetriever, RetrievedContext};
use crate::vector::VectorHit;

pub struct RecallAgent<'a> {
    retriever: &'a MultiQueryRetriever,
    max_iterations: usize,
    timeout: std::time::Duration,
    rrf_k: f32,
    quality_threshold: f32,
}

impl<'a> RecallAgent<'a> {
    pub fn new(
        retriever: &'a MultiQueryRetriever,
        max_iterations: usize,
        timeout: std::time::Duration,
        rrf_k: f32,
        quality_threshold: f32,
    ) -> Self {
        Self {
            retriever,
            max_iterations,
            timeout,
            rrf_k,
            quality_threshold,
        }
    }

    /// Run the bounded retrieval loop. `None` on timeout, cap exhaustion
    /// without results, or a below-gate outcome.
    pub async fn run(
        &self,
        query: &RetrievalQuery,
        budget: usize,
        ctx: &GenerationContext,
    ) -> Option<RetrievedContext> {
        if !query.intent.needs_retrieval() {
            return None;
        }

        match tokio::time::timeout(self.timeout, self.run_inner(query, budget, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Recall agent timed out; deferring to deterministic retriever");
                None
            }
        }
    }

    async fn run_inner(
        &self,
        query: &RetrievalQuery,
        budget: usize,
        ctx: &GenerationContext,
    ) -> Option<RetrievedContext> {
        let mut lists: Vec<Vec<VectorHit>> = Vec::new();
        let mut attempted: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut pending: Vec<String> = query.sub_queries.clone();

        for iteration in 0..self.max_iterations {
            // Never re-issue a query; an uncoverable keyword stays
            // uncoverable.
            pending.retain(|q| attempted.insert(q.clone()));
            if pending.is_empty() {
                break;
            }
            let round = self
                .retriever
                .search_sub_queries(&std::mem::take(&mut pending), ctx)
                .await;
            lists.extend(round);

            pending = self.uncovered_keywords(query, &lists, ctx);
            tracing::debug!(
                iteration,
                accumulated = lists.len(),
                uncovered = pending.len(),
                "Recall agent round complete"
            );
        }

        if lists.is_empty() {
            return None;
        }

        let fused = fuse_rankings(&lists, self.rrf_k);
        let (top_id, _) = fused.first()?;
        let verified = best_similarity(&lists, top_id);
        if verified < self.quality_threshold {
            tracing::debug!(verified, "Recall agent result below quality gate");
            return None;
        }

        let ordered = self.retriever.order_for_temporal(query, fused, ctx);
        self.retriever
            .build_context(&ordered, verified, false, budget, ctx)
    }

    /// Keywords whose text appears in none of the resolved hits so far.
    /// These become the next round's queries.
    fn uncovered_keywords(
        &self,
        query: &RetrievalQuery,
        lists: &[Vec<VectorHit>],
        ctx: &GenerationContext,
    ) -> Vec<String> {
        if query.keywords.is_empty() {
            return Vec::new();
        }

        let covered_text: String = lists
            .iter()
            .flatten()
            .filter_map(|hit| ctx.chronicle_entry(&hit.id))
            .map(|entry| entry.text.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");

        query
            .keywords
            .iter()
            .filter(|keyword| !covered_text.contains(&keyword.to_lowercase()))
            .cloned()
            .collect()
    }
}
