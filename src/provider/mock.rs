//! Mock provider for testing. No real API calls.

use super::traits::*;
use crate::types::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A scripted response for one step.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    ToolCalls(Vec<MockToolCall>),
    /// Text and tool calls in the same step.
    TextWithTools(String, Vec<MockToolCall>),
    Error(ProviderError),
    /// Panics inside the provider.
    Panic(String),
}

#[derive(Debug, Clone)]
pub struct MockToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

impl MockToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Mock LLM provider for tests. Supply a sequence of responses.
///
/// Once the script runs out, the fallback response repeats forever
/// (plain text unless built with [`MockProvider::looping`]).
pub struct MockProvider {
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    calls: AtomicUsize,
    requests: Mutex<Vec<StreamConfig>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            fallback: MockResponse::Text("(no more mock responses)".into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: provider that always returns the same text
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::Text(text.into())])
    }

    /// Convenience: sequence of text responses
    pub fn texts(texts: Vec<impl Into<String>>) -> Self {
        Self::new(
            texts
                .into_iter()
                .map(|t| MockResponse::Text(t.into()))
                .collect(),
        )
    }

    /// Provider that requests the same tool call on every step.
    pub fn looping(call: MockToolCall) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.fallback = MockResponse::ToolCalls(vec![call]);
        provider
    }

    /// Provider whose every call fails.
    pub fn failing(error: ProviderError) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.fallback = MockResponse::Error(error);
        provider
    }

    /// Number of `stream` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request this provider received, in order.
    pub fn requests(&self) -> Vec<StreamConfig> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamProvider for MockProvider {
    async fn stream(&self, config: StreamConfig) -> Result<Message, ProviderError> {
        let step = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(config);

        let response = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                self.fallback.clone()
            } else {
                responses.remove(0)
            }
        };

        let to_content = |calls: Vec<MockToolCall>| -> Vec<Content> {
            calls
                .into_iter()
                .enumerate()
                .map(|(i, call)| Content::ToolCall {
                    id: format!("mock-{}-{}", step, i),
                    name: call.name,
                    arguments: call.arguments,
                })
                .collect()
        };

        let (content, stop_reason) = match response {
            MockResponse::Text(text) => (vec![Content::Text { text }], StopReason::Stop),
            MockResponse::ToolCalls(calls) => (to_content(calls), StopReason::ToolUse),
            MockResponse::TextWithTools(text, calls) => {
                let mut content = vec![Content::Text { text }];
                content.extend(to_content(calls));
                (content, StopReason::ToolUse)
            }
            MockResponse::Error(e) => return Err(e),
            MockResponse::Panic(msg) => panic!("{}", msg),
        };

        Ok(Message::Assistant {
            content,
            stop_reason,
            model: "mock".into(),
            usage: Usage::default(),
            timestamp: now_ms(),
            error_message: None,
        })
    }
}
