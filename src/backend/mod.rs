//! Generative backend seam.
//!
//! The engine never speaks a provider wire protocol; it hands ordered
//! messages to this trait and receives text back. Streaming yields
//! incremental text plus an optional reasoning side-channel when the
//! provider exposes one.

pub mod mock;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::assembly::Message;
use crate::FabulaError;

pub use mock::MockBackend;

/// One streamed increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub text: String,
    /// Reasoning side-channel content, when the provider emits it.
    pub reasoning: Option<String>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reasoning: None,
        }
    }

    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            reasoning: Some(reasoning.into()),
        }
    }
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, FabulaError>> + Send>>;

/// A generative text backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Provider label for logs and diagnostics.
    fn name(&self) -> &str;

    /// Single-shot completion.
    async fn complete(
        &self,
        messages: &[Message],
        max_tokens: usize,
    ) -> Result<String, FabulaError>;

    /// Streaming completion.
    async fn complete_stream(
        &self,
        messages: &[Message],
        max_tokens: usize,
    ) -> Result<CompletionStream, FabulaError>;
}
