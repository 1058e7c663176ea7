//! The streaming chat turn.
//!
//! [`ChatLoop::run`] drives the bounded tool-calling loop and pushes
//! [`ChatEvent`]s into a [`ChatSink`] as each step completes. Whatever
//! happens inside (provider errors, failing tools, panics), the stream ends
//! with exactly one [`ChatEvent::Done`].

use crate::registry::ToolRegistry;
use crate::step_loop::{GenerateRequest, ModelClient, StepResult};
use crate::types::Message;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

pub const DEFAULT_CHAT_STEPS: usize = 10;

/// One entry of the end-of-turn tool summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallSummary {
    pub tool_call_id: String,
    pub name: String,
    pub args: Value,
    pub result: Value,
}

/// A unit of streamed output.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Text produced by one step. Fragments concatenate.
    Text(String),
    ToolCalling { tool_call: String, args: Value },
    ToolCompleted { tool_call: String, result: Value },
    ToolSummary(Vec<ToolCallSummary>),
    Error(String),
    /// End of stream.
    Done,
}

impl ChatEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Wire shape of the event.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => json!({"text": text}),
            Self::ToolCalling { tool_call, args } => {
                json!({"toolCall": tool_call, "args": args, "status": "calling"})
            }
            Self::ToolCompleted { tool_call, result } => {
                json!({"toolCall": tool_call, "result": result, "status": "completed"})
            }
            Self::ToolSummary(calls) => json!({"toolCalls": calls}),
            Self::Error(error) => json!({"error": error}),
            Self::Done => json!({"done": true}),
        }
    }

    /// Server-sent-events frame: `data: <json>\n\n`, or `data: [DONE]\n\n`.
    pub fn to_sse(&self) -> String {
        match self {
            Self::Done => "data: [DONE]\n\n".to_string(),
            other => format!("data: {}\n\n", other.to_json()),
        }
    }
}

/// Write end of a chat stream. Closing consumes the sink, so the terminal
/// marker can only be sent once.
pub struct ChatSink {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl ChatSink {
    pub fn new(tx: mpsc::UnboundedSender<ChatEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            debug!("Chat receiver dropped, discarding event");
        }
    }

    pub fn close(self) {
        self.emit(ChatEvent::Done);
    }
}

fn emit_step(sink: &ChatSink, step: &StepResult) {
    if !step.text.is_empty() {
        sink.emit(ChatEvent::Text(step.text.clone()));
    }
    for call in &step.tool_calls {
        sink.emit(ChatEvent::ToolCalling {
            tool_call: call.name.clone(),
            args: call.arguments.clone(),
        });
    }
    for result in &step.tool_results {
        sink.emit(ChatEvent::ToolCompleted {
            tool_call: result.tool_name.clone(),
            result: result.result.clone(),
        });
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A configured chat turn runner: model, full tool set and system prompt.
#[derive(Clone)]
pub struct ChatLoop {
    model: ModelClient,
    tools: ToolRegistry,
    system_prompt: String,
    max_steps: usize,
}

impl ChatLoop {
    pub fn new(model: ModelClient, tools: ToolRegistry, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            tools,
            system_prompt: system_prompt.into(),
            max_steps: DEFAULT_CHAT_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn, streaming into `sink`, then close it.
    pub async fn run(&self, messages: Vec<Message>, sink: ChatSink) {
        let outcome = AssertUnwindSafe(self.drive(messages, &sink))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Chat turn failed: {}", e);
                sink.emit(ChatEvent::Error(e.to_string()));
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!("Chat turn panicked: {}", message);
                sink.emit(ChatEvent::Error(format!("Internal error: {}", message)));
            }
        }
        sink.close();
    }

    async fn drive(
        &self,
        messages: Vec<Message>,
        sink: &ChatSink,
    ) -> Result<(), crate::provider::ProviderError> {
        let mut last_flushed = String::new();
        let output = self
            .model
            .generate_with(
                GenerateRequest {
                    system_prompt: self.system_prompt.clone(),
                    messages,
                    tools: &self.tools,
                    max_steps: self.max_steps,
                },
                |step| {
                    emit_step(sink, step);
                    last_flushed.clone_from(&step.text);
                },
            )
            .await?;

        if !output.text.is_empty() && output.text != last_flushed {
            sink.emit(ChatEvent::Text(output.text.clone()));
        }

        if !output.tool_calls.is_empty() {
            let summary = output
                .tool_calls
                .iter()
                .map(|call| ToolCallSummary {
                    tool_call_id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                    result: output
                        .result_for(&call.id)
                        .map(|r| r.result.clone())
                        .unwrap_or(Value::Null),
                })
                .collect();
            sink.emit(ChatEvent::ToolSummary(summary));
        }

        debug!(
            "Chat turn finished after {} step(s), reason={}",
            output.steps.len(),
            output.finish_reason
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_frames() {
        assert_eq!(
            ChatEvent::Text("hi".into()).to_sse(),
            "data: {\"text\":\"hi\"}\n\n"
        );
        assert_eq!(ChatEvent::Done.to_sse(), "data: [DONE]\n\n");
    }

    #[test]
    fn tool_events_carry_status() {
        let calling = ChatEvent::ToolCalling {
            tool_call: "files_read".into(),
            args: json!({"path": "a"}),
        }
        .to_json();
        assert_eq!(calling["status"], "calling");
        assert_eq!(calling["toolCall"], "files_read");

        let completed = ChatEvent::ToolCompleted {
            tool_call: "files_read".into(),
            result: json!("ok"),
        }
        .to_json();
        assert_eq!(completed["status"], "completed");
        assert_eq!(completed["result"], "ok");
    }

    #[tokio::test]
    async fn closing_sends_one_done() {
        let (sink, mut rx) = ChatSink::channel();
        sink.emit(ChatEvent::Text("a".into()));
        sink.close();

        assert_eq!(rx.recv().await, Some(ChatEvent::Text("a".into())));
        assert_eq!(rx.recv().await, Some(ChatEvent::Done));
        assert_eq!(rx.recv().await, None);
    }
}
