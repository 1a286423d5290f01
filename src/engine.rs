//! Engine orchestration.
//!
//! One `PromptEngine` serves many concurrent operations; each operation
//! brings its own `GenerationContext` and runs classify → retrieve →
//! assemble → backend call sequentially. The engine owns the seams
//! (backends, vector index, snapshot store) and the resolved
//! configuration, and holds no per-operation state of its own.

use std::sync::Arc;

use crate::assembly::{
    Message, MessageAssembler, PrefixSnapshot, Section, SnapshotKey, SnapshotStore,
};
use crate::backend::{CompletionStream, GenerationBackend};
use crate::compose::{TaskComposer, TaskKind};
use crate::config::EngineConfig;
use crate::context::GenerationContext;
use crate::parse::ParserChain;
use crate::retrieval::intent::resolve_pronouns;
use crate::retrieval::{Intent, IntentClassifier, MultiQueryRetriever, RecallAgent};
use crate::tokens::TokenCounter;
use crate::vector::VectorSearchProvider;
use crate::FabulaError;

/// What one build did, for callers and logs.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub task: &'static str,
    /// Backend the messages were routed to.
    pub backend: String,
    pub intent: Option<Intent>,
    pub sub_queries: Vec<String>,
    /// Verified quality of the accepted retrieval result.
    pub fused_quality: Option<f32>,
    /// Whether the single-query fallback produced the retrieved section.
    pub retrieval_fallback: bool,
    /// Sections that rendered, in prefix order.
    pub included: Vec<Section>,
    pub omitted: Vec<Section>,
    pub token_estimate: usize,
    /// A sibling's in-process prefix was reused.
    pub prefix_reused: bool,
    /// A persisted snapshot was replayed instead of live assembly.
    pub snapshot_replayed: bool,
    /// The minimal two-message form was used (no prefix at all).
    pub minimal_form: bool,
    pub dropped_batches: usize,
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub diagnostics: Diagnostics,
}

/// The prompt-assembly and retrieval engine.
pub struct PromptEngine {
    config: EngineConfig,
    backend: Arc<dyn GenerationBackend>,
    secondary: Option<Arc<dyn GenerationBackend>>,
    assembler: MessageAssembler,
    classifier: IntentClassifier,
    retriever: MultiQueryRetriever,
    snapshots: SnapshotStore,
    chain: ParserChain,
}

impl PromptEngine {
    /// Wire the engine from resolved configuration and providers.
    /// Configuration problems surface here, immediately, and are never
    /// retried.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn GenerationBackend>,
        vector: Arc<dyn VectorSearchProvider>,
    ) -> Result<Self, FabulaError> {
        config.validate()?;

        let counter = match &config.assembly.tokenizer_path {
            Some(path) => TokenCounter::from_vocabulary(path),
            None => TokenCounter::heuristic(),
        };

        let assembler = MessageAssembler::new(config.assembly.clone(), counter.clone());
        let classifier = IntentClassifier::new(
            backend.clone(),
            config.retrieval.max_sub_queries,
            config.backend.utility_max_tokens,
            config.backend.timeout(),
        );
        let retriever =
            MultiQueryRetriever::new(vector, counter.clone(), config.retrieval.clone());
        let snapshots = SnapshotStore::new(
            config.assembly.snapshot_capacity,
            std::time::Duration::from_secs(config.assembly.snapshot_ttl_secs),
        );

        tracing::info!(
            backend = backend.name(),
            retrieval = config.retrieval.enabled,
            batch_size = config.assembly.batch_size,
            "Prompt engine ready"
        );

        Ok(Self {
            config,
            backend,
            secondary: None,
            assembler,
            classifier,
            retriever,
            snapshots,
            chain: ParserChain::standard(),
        })
    }

    /// Attach a secondary backend for routed extraction sub-tasks.
    pub fn with_secondary(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.secondary = Some(backend);
        self
    }

    /// The snapshot store, for caller-owned invalidation and persistence.
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Build the full message array for a task: prefix plus the final
    /// volatile task message. Also updates the context caches so sibling
    /// sub-calls of this operation reuse the classification and prefix.
    pub async fn build_messages(
        &self,
        task: TaskKind,
        ctx: &mut GenerationContext,
    ) -> (Vec<Message>, Diagnostics) {
        let mut diagnostics = Diagnostics {
            task: task.label(),
            backend: self.backend_for(task).name().to_string(),
            ..Diagnostics::default()
        };

        // Extraction can skip the prefix entirely: on another backend the
        // cached prefix state is worthless, and with reuse disabled it is
        // pure cost.
        if task.is_extraction() && !self.wants_prefix_for_extraction() {
            let messages = TaskComposer::compose_minimal(&task, ctx);
            diagnostics.minimal_form = true;
            diagnostics.token_estimate = messages.iter().map(|m| m.content.len() / 4).sum();
            return (messages, diagnostics);
        }

        // Snapshot replay, only for tasks where replaying a historical
        // prefix cannot change the meaning of the result.
        if self.config.assembly.prefix_reuse
            && task.replay_safe()
            && ctx.cached_prefix().is_none()
        {
            let key = SnapshotKey::new(ctx.story.id.clone());
            if let Some(snapshot) = self.snapshots.load(&key).await {
                tracing::debug!(
                    story = %ctx.story.id,
                    operation = %snapshot.operation_id,
                    "Replaying prefix snapshot"
                );
                ctx.cache_prefix(Arc::new(snapshot.prefix.clone()));
                diagnostics.snapshot_replayed = true;
            }
        }

        // Retrieval only feeds live assembly; a reused or replayed prefix
        // already carries whatever was retrieved for it.
        if ctx.cached_prefix().is_none() {
            self.run_retrieval(ctx, &mut diagnostics).await;
        } else {
            self.fill_cached_search_diagnostics(ctx, &mut diagnostics);
        }

        let (prefix, report) = self.assembler.assemble(ctx);
        diagnostics.prefix_reused = report.reused_cached && !diagnostics.snapshot_replayed;
        diagnostics.included = report.included;
        diagnostics.omitted = report.omitted;
        diagnostics.token_estimate = report.token_estimate;
        diagnostics.dropped_batches = report.dropped_batches;

        if !report.reused_cached && self.config.assembly.prefix_reuse {
            self.snapshots
                .save(PrefixSnapshot::new(
                    ctx.story.id.clone(),
                    ctx.operation_id.clone(),
                    (*prefix).clone(),
                ))
                .await;
        }

        let mut messages = prefix.messages();
        messages.push(TaskComposer::compose(&task, ctx));
        (messages, diagnostics)
    }

    /// Build and run one completion.
    pub async fn generate(
        &self,
        task: TaskKind,
        ctx: &mut GenerationContext,
    ) -> Result<Generation, FabulaError> {
        let (messages, diagnostics) = self.build_messages(task, ctx).await;
        let backend = self.backend_for(task);
        let timeout = self.config.backend.timeout();

        let text = match tokio::time::timeout(
            timeout,
            backend.complete(&messages, self.max_tokens_for(task)),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(FabulaError::BackendTimeout { timeout }),
        };

        Ok(Generation { text, diagnostics })
    }

    /// Build and open a streaming completion.
    pub async fn generate_stream(
        &self,
        task: TaskKind,
        ctx: &mut GenerationContext,
    ) -> Result<(CompletionStream, Diagnostics), FabulaError> {
        let (messages, diagnostics) = self.build_messages(task, ctx).await;
        let backend = self.backend_for(task);
        let timeout = self.config.backend.timeout();

        let stream = match tokio::time::timeout(
            timeout,
            backend.complete_stream(&messages, self.max_tokens_for(task)),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(FabulaError::BackendTimeout { timeout }),
        };

        Ok((stream, diagnostics))
    }

    /// Generate and decode a choice list.
    pub async fn generate_choices(
        &self,
        ctx: &mut GenerationContext,
    ) -> Result<(Vec<String>, Diagnostics), FabulaError> {
        let generation = self.generate(TaskKind::ChoiceList, ctx).await?;

        let Some((value, _)) = self.chain.parse(&generation.text) else {
            return Err(FabulaError::MalformedResponse(
                "choice list output had no decodable payload".into(),
            ));
        };
        let choices: Vec<String> = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if choices.is_empty() {
            return Err(FabulaError::MalformedResponse(
                "choice list output decoded to no choices".into(),
            ));
        }

        Ok((choices, generation.diagnostics))
    }

    fn wants_prefix_for_extraction(&self) -> bool {
        if !self.config.assembly.prefix_reuse {
            return false;
        }
        !(self.config.backend.route_extraction_to_secondary && self.secondary.is_some())
    }

    fn backend_for(&self, task: TaskKind) -> &Arc<dyn GenerationBackend> {
        if task.is_extraction() && self.config.backend.route_extraction_to_secondary {
            if let Some(secondary) = &self.secondary {
                return secondary;
            }
        }
        &self.backend
    }

    fn max_tokens_for(&self, task: TaskKind) -> usize {
        match task {
            TaskKind::ChoiceList | TaskKind::Extraction(_) => {
                self.config.backend.utility_max_tokens
            }
            _ => self.config.backend.max_tokens,
        }
    }

    /// Classify and retrieve for this operation, once. Later sibling
    /// sub-calls observe the cached outcome; nothing here is fatal.
    async fn run_retrieval(&self, ctx: &mut GenerationContext, diagnostics: &mut Diagnostics) {
        if !self.config.retrieval.enabled {
            return;
        }
        if ctx.search.is_improved() {
            self.fill_cached_search_diagnostics(ctx, diagnostics);
            return;
        }
        let Some(directive) = ctx.search.directive.clone() else {
            return;
        };

        let query = match ctx.search.cached_query.clone() {
            Some(query) => query,
            None => {
                let query = self.classifier.decompose(&directive, &ctx.roster).await;
                ctx.search.cached_query = Some(query.clone());
                query
            }
        };

        diagnostics.intent = Some(query.intent);
        diagnostics.sub_queries = query.sub_queries.clone();

        if !query.intent.needs_retrieval() {
            ctx.search.mark_improved();
            return;
        }

        let budget = ctx
            .search
            .token_budget
            .unwrap_or(self.config.retrieval.token_budget);
        let resolved = resolve_pronouns(&directive, &ctx.roster);

        let mut result = None;
        if self.config.retrieval.agent_enabled {
            let agent = RecallAgent::new(
                &self.retriever,
                self.config.retrieval.agent_max_iterations,
                self.config.retrieval.agent_timeout(),
                self.config.retrieval.rrf_k,
                self.config.retrieval.quality_threshold,
            );
            result = agent.run(&query, budget, ctx).await;
            if result.is_none() {
                tracing::debug!("Recall agent produced nothing; using deterministic retriever");
            }
        }
        if result.is_none() {
            result = self.retriever.search(&query, &resolved, budget, ctx).await;
        }

        if let Some(retrieved) = result {
            diagnostics.fused_quality = Some(retrieved.quality);
            diagnostics.retrieval_fallback = retrieved.fallback_used;
            ctx.search
                .exclusions
                .extend(retrieved.sources.iter().cloned());
            ctx.search.retrieved = Some(retrieved);
        } else {
            tracing::debug!("Retrieval produced nothing; section will be omitted");
        }

        ctx.search.mark_improved();
    }

    fn fill_cached_search_diagnostics(
        &self,
        ctx: &GenerationContext,
        diagnostics: &mut Diagnostics,
    ) {
        if let Some(query) = &ctx.search.cached_query {
            diagnostics.intent = Some(query.intent);
            diagnostics.sub_queries = query.sub_queries.clone();
        }
        if let Some(retrieved) = &ctx.search.retrieved {
            diagnostics.fused_quality = Some(retrieved.quality);
            diagnostics.retrieval_fallback = retrieved.fallback_used;
        }
    }
}
