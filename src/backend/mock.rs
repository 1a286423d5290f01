//! Scripted backend for tests.
//!
//! Responses are queued ahead of time and returned in order; every call's
//! message array is recorded for assertions. An optional per-call delay
//! exercises timeout paths.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::assembly::Message;
use crate::backend::{CompletionStream, GenerationBackend, StreamChunk};
use crate::FabulaError;

#[derive(Default)]
pub struct MockBackend {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
    fail_next: Mutex<bool>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose every call takes `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Queue the next scripted response.
    pub async fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().await.push_back(response.into());
    }

    /// Make the next call fail with a backend error.
    pub async fn fail_next(&self) {
        *self.fail_next.lock().await = true;
    }

    /// Message arrays of every call so far, in call order.
    pub async fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().await.clone()
    }

    async fn next_response(&self, messages: &[Message]) -> Result<String, FabulaError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().await.push(messages.to_vec());
        if std::mem::take(&mut *self.fail_next.lock().await) {
            return Err(FabulaError::backend("scripted failure"));
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| FabulaError::backend("mock backend ran out of scripted responses"))
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        messages: &[Message],
        _max_tokens: usize,
    ) -> Result<String, FabulaError> {
        self.next_response(messages).await
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _max_tokens: usize,
    ) -> Result<CompletionStream, FabulaError> {
        let response = self.next_response(messages).await?;
        let stream = async_stream::stream! {
            // Split on whitespace boundaries to mimic token-wise delivery.
            for piece in response.split_inclusive(' ') {
                yield Ok(StreamChunk::text(piece));
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let backend = MockBackend::new();
        backend.push_response("first").await;
        backend.push_response("second").await;

        let messages = vec![Message::user("hello")];
        assert_eq!(backend.complete(&messages, 64).await.unwrap(), "first");
        assert_eq!(backend.complete(&messages, 64).await.unwrap(), "second");
        assert_eq!(backend.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let backend = MockBackend::new();
        let result = backend.complete(&[Message::user("hello")], 64).await;
        assert!(matches!(result, Err(FabulaError::Backend { .. })));
    }

    #[test]
    fn test_reasoning_chunk_carries_no_text() {
        let chunk = StreamChunk::reasoning("weighing the pacing");
        assert!(chunk.text.is_empty());
        assert_eq!(chunk.reasoning.as_deref(), Some("weighing the pacing"));
    }

    #[tokio::test]
    async fn test_stream_reassembles_to_response() {
        let backend = MockBackend::new();
        backend.push_response("a short streamed answer").await;

        let mut stream = backend
            .complete_stream(&[Message::user("go")], 64)
            .await
            .unwrap();
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.unwrap().text);
        }
        assert_eq!(collected, "a short streamed answer");
    }
}
