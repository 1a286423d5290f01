//! Semantic retrieval pipeline.
//!
//! A directive is classified (does it reference past events at all?),
//! decomposed into focused sub-queries, searched per sub-query, merged by
//! Reciprocal Rank Fusion, gated on verified quality, and truncated to the
//! token budget. Every stage degrades: retrieval is an enhancement, never a
//! dependency.

pub mod agent;
pub mod intent;
pub mod retriever;

pub use agent::RecallAgent;
pub use intent::{Intent, IntentClassifier, RetrievalQuery, Temporal};
pub use retriever::{MultiQueryRetriever, RetrievedContext};
