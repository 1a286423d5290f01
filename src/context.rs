//! Per-operation generation context.
//!
//! One `GenerationContext` is created by the caller per top-level
//! operation, threaded through every sub-call, and discarded after. It is
//! never shared across concurrent operations.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::assembly::MessagePrefix;
use crate::models::{
    Chapter, Character, ChronicleEntry, ContradictionWarning, InteractionTurn, SceneUnit, Story,
};
use crate::retrieval::intent::RetrievalQuery;
use crate::retrieval::retriever::RetrievedContext;

/// Search state nested inside the context. Caches the classified query and
/// the retrieval outcome so sibling sub-calls of one operation never re-run
/// the pipeline.
#[derive(Debug, Default)]
pub struct SearchState {
    /// The reader directive driving this operation, if any.
    pub directive: Option<String>,
    /// Per-operation override of the retrieval token budget.
    pub token_budget: Option<usize>,
    /// Chronicle ids already shown to the backend in this operation.
    pub exclusions: HashSet<String>,
    /// Classified query, cached after the first classification.
    pub cached_query: Option<RetrievalQuery>,
    /// Retrieval outcome consumed by the retrieved-context section.
    pub retrieved: Option<RetrievedContext>,
    improved: bool,
}

impl SearchState {
    /// Mark retrieval as done for this operation. Once set, no further
    /// retrieval re-runs within the same top-level operation.
    pub fn mark_improved(&mut self) {
        self.improved = true;
    }

    pub fn is_improved(&self) -> bool {
        self.improved
    }
}

/// Mutable per-request bag of everything the assembler and retriever read.
#[derive(Debug)]
pub struct GenerationContext {
    /// Identifies the top-level operation for snapshot keying and logs.
    pub operation_id: String,
    pub story: Story,
    /// Character roster in stored order.
    pub roster: Vec<Character>,
    pub chapter: Option<Chapter>,
    /// Narrative units of the current chapter.
    pub units: Vec<SceneUnit>,
    /// Extracted events across the whole story; the retrieval corpus.
    pub chronicle: Vec<ChronicleEntry>,
    pub warnings: Vec<ContradictionWarning>,
    pub interactions: Vec<InteractionTurn>,
    pub search: SearchState,
    cached_prefix: Option<Arc<MessagePrefix>>,
}

impl GenerationContext {
    pub fn new(story: Story, roster: Vec<Character>) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            story,
            roster,
            chapter: None,
            units: Vec::new(),
            chronicle: Vec::new(),
            warnings: Vec::new(),
            interactions: Vec::new(),
            search: SearchState::default(),
            cached_prefix: None,
        }
    }

    /// Prefix built by an earlier sibling call of this operation, if any.
    pub fn cached_prefix(&self) -> Option<Arc<MessagePrefix>> {
        self.cached_prefix.clone()
    }

    /// Cache the assembled prefix for sibling reuse. The prefix is
    /// immutable from here on; siblings receive this exact reference.
    pub fn cache_prefix(&mut self, prefix: Arc<MessagePrefix>) {
        self.cached_prefix = Some(prefix);
    }

    /// Resolve a chronicle entry by id.
    pub fn chronicle_entry(&self, id: &str) -> Option<&ChronicleEntry> {
        self.chronicle.iter().find(|e| e.id == id)
    }
}
