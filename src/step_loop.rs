//! The bounded tool-calling loop: prompt → model step → tool execution → repeat.
//!
//! [`ModelClient::generate`] is the one entry point every higher layer uses
//! (single-agent executor, orchestrator planning pass, chat loop). Each step is
//! one provider call followed by sequential execution of the tool calls that
//! step requested. The loop ends when a step requests no tools, or when
//! `max_steps` steps have run; in the latter case the last step's own stop
//! reason is reported as the finish reason.

use crate::provider::{ProviderError, StreamConfig, StreamProvider};
use crate::registry::ToolRegistry;
use crate::retry::{self, RetryConfig};
use crate::types::*;
use std::sync::Arc;
use tracing::debug;

/// Model settings shared by every call a [`ModelClient`] makes.
#[derive(Debug, Clone, Default)]
pub struct ModelSettings {
    pub model: String,
    pub api_key: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Everything produced by one step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Zero-based step index.
    pub index: usize,
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolCallResult>,
    pub finish_reason: StopReason,
    pub usage: Usage,
}

/// Aggregate outcome of a [`ModelClient::generate`] call.
#[derive(Debug, Clone)]
pub struct GenerateOutput {
    /// Text of the final step.
    pub text: String,
    /// Every tool call across all steps, in order.
    pub tool_calls: Vec<ToolCall>,
    /// Every tool result across all steps, in order.
    pub tool_results: Vec<ToolCallResult>,
    pub steps: Vec<StepResult>,
    pub finish_reason: StopReason,
    pub usage: Usage,
}

impl GenerateOutput {
    /// Result matched to a tool call by invocation id.
    pub fn result_for(&self, tool_call_id: &str) -> Option<&ToolCallResult> {
        self.tool_results
            .iter()
            .find(|r| r.tool_call_id == tool_call_id)
    }
}

/// One generation request.
pub struct GenerateRequest<'a> {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: &'a ToolRegistry,
    pub max_steps: usize,
}

/// Binds a provider to model settings and a retry policy.
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn StreamProvider>,
    settings: ModelSettings,
    retry_config: RetryConfig,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn StreamProvider>, settings: ModelSettings) -> Self {
        Self {
            provider,
            settings,
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Run the loop without observing individual steps.
    pub async fn generate(
        &self,
        request: GenerateRequest<'_>,
    ) -> Result<GenerateOutput, ProviderError> {
        self.generate_with(request, |_| {}).await
    }

    /// Run the loop, calling `on_step` after each step completes (its tools included).
    pub async fn generate_with(
        &self,
        request: GenerateRequest<'_>,
        mut on_step: impl FnMut(&StepResult) + Send,
    ) -> Result<GenerateOutput, ProviderError> {
        let GenerateRequest {
            system_prompt,
            mut messages,
            tools,
            max_steps,
        } = request;

        let definitions = tools.definitions();
        let mut steps: Vec<StepResult> = Vec::new();
        let mut usage = Usage::default();

        for index in 0..max_steps {
            let config = StreamConfig {
                model: self.settings.model.clone(),
                system_prompt: system_prompt.clone(),
                messages: messages.clone(),
                tools: definitions.clone(),
                api_key: self.settings.api_key.clone(),
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
            };

            let message = self.stream_with_retry(config).await?;
            let (finish_reason, step_usage) = match &message {
                Message::Assistant {
                    stop_reason,
                    error_message,
                    usage,
                    ..
                } => {
                    if *stop_reason == StopReason::Error {
                        return Err(ProviderError::Api(
                            error_message
                                .clone()
                                .unwrap_or_else(|| "Unknown provider error".into()),
                        ));
                    }
                    (*stop_reason, usage.clone())
                }
                other => {
                    return Err(ProviderError::Malformed(format!(
                        "expected an assistant message, got '{}'",
                        other.role()
                    )))
                }
            };
            usage.add(&step_usage);

            let text = message.text();
            let tool_calls = message.tool_calls();
            messages.push(message);

            let mut tool_results = Vec::with_capacity(tool_calls.len());
            for call in &tool_calls {
                let result = tools.run_call(call).await;
                messages.push(result.to_message());
                tool_results.push(result);
            }

            let step = StepResult {
                index,
                text,
                tool_calls,
                tool_results,
                finish_reason,
                usage: step_usage,
            };
            debug!(
                "Step {}/{} finished: {} tool call(s), reason={}",
                index + 1,
                max_steps,
                step.tool_calls.len(),
                step.finish_reason
            );
            on_step(&step);

            let done = step.tool_calls.is_empty();
            steps.push(step);
            if done {
                break;
            }
        }

        let (text, finish_reason) = steps
            .last()
            .map(|s| (s.text.clone(), s.finish_reason))
            .unwrap_or((String::new(), StopReason::Stop));

        Ok(GenerateOutput {
            text,
            tool_calls: steps.iter().flat_map(|s| s.tool_calls.clone()).collect(),
            tool_results: steps.iter().flat_map(|s| s.tool_results.clone()).collect(),
            steps,
            finish_reason,
            usage,
        })
    }

    async fn stream_with_retry(&self, config: StreamConfig) -> Result<Message, ProviderError> {
        let retry = &self.retry_config;
        let mut attempt = 0;
        loop {
            match self.provider.stream(config.clone()).await {
                Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                    attempt += 1;
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| retry.delay_for_attempt(attempt));
                    retry::log_retry(attempt, retry.max_retries, &delay, &e);
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
