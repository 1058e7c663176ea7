//! OpenAI Chat Completions compatible provider.
//!
//! Works against OpenAI and any server that speaks the same streaming
//! protocol (vLLM, Ollama, OpenRouter, llama.cpp server, ...).

use super::traits::*;
use crate::types::*;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Error as SseError, Event, EventSource};
use serde::Deserialize;
use tracing::{debug, warn};

pub struct OpenAiCompatProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn openai() -> Self {
        Self::new("https://api.openai.com/v1")
    }
}

#[async_trait]
impl StreamProvider for OpenAiCompatProvider {
    async fn stream(&self, config: StreamConfig) -> Result<Message, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = build_request_body(&config);
        debug!("OpenAI compat request: model={} url={}", config.model, url);

        let request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", config.api_key))
            .json(&body);

        let mut es =
            EventSource::new(request).map_err(|e| ProviderError::Network(e.to_string()))?;

        let mut text = String::new();
        let mut usage = Usage::default();
        let mut stop_reason = StopReason::Stop;
        let mut tool_call_buffers: Vec<ToolCallBuffer> = Vec::new();

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    let chunk: OpenAiChunk = match serde_json::from_str(&msg.data) {
                        Ok(c) => c,
                        Err(e) => {
                            debug!("Failed to parse OpenAI chunk: {} data={}", e, &msg.data);
                            continue;
                        }
                    };

                    if let Some(u) = &chunk.usage {
                        usage.input = u.prompt_tokens;
                        usage.output = u.completion_tokens;
                        usage.total_tokens = u.total_tokens;
                    }

                    for choice in &chunk.choices {
                        if let Some(delta) = &choice.delta.content {
                            text.push_str(delta);
                        }

                        for tc in choice.delta.tool_calls.iter().flatten() {
                            let idx = tc.index as usize;
                            while tool_call_buffers.len() <= idx {
                                tool_call_buffers.push(ToolCallBuffer::default());
                            }
                            let buf = &mut tool_call_buffers[idx];
                            if let Some(id) = &tc.id {
                                buf.id.clone_from(id);
                            }
                            if let Some(f) = &tc.function {
                                if let Some(name) = &f.name {
                                    buf.name.clone_from(name);
                                }
                                if let Some(args) = &f.arguments {
                                    buf.arguments.push_str(args);
                                }
                            }
                        }

                        if let Some(reason) = &choice.finish_reason {
                            stop_reason = match reason.as_str() {
                                "length" => StopReason::Length,
                                "tool_calls" => StopReason::ToolUse,
                                _ => StopReason::Stop,
                            };
                        }
                    }
                }
                Err(SseError::StreamEnded) => break,
                Err(e) => {
                    es.close();
                    let err = classify_error(e).await;
                    warn!("OpenAI stream failed: {}", err);
                    return Err(err);
                }
            }
        }
        es.close();

        let mut content = Vec::new();
        if !text.is_empty() {
            content.push(Content::Text { text });
        }
        for buf in tool_call_buffers {
            // Unparsable arguments stay raw text; the registry rejects them
            // for this call only.
            let arguments = if buf.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&buf.arguments).unwrap_or_else(|e| {
                    warn!("Tool call '{}' has invalid JSON arguments: {}", buf.name, e);
                    serde_json::Value::String(buf.arguments.clone())
                })
            };
            // Some local servers omit call ids; results are matched by id.
            let id = if buf.id.is_empty() {
                format!("call_{}", uuid::Uuid::new_v4().simple())
            } else {
                buf.id
            };
            content.push(Content::ToolCall {
                id,
                name: buf.name,
                arguments,
            });
            stop_reason = StopReason::ToolUse;
        }

        Ok(Message::Assistant {
            content,
            stop_reason,
            model: config.model,
            usage,
            timestamp: now_ms(),
            error_message: None,
        })
    }
}

/// Arguments as the JSON text the API expects. Raw text is echoed back as sent.
fn raw_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

async fn classify_error(err: SseError) -> ProviderError {
    match err {
        SseError::InvalidStatusCode(status, response) => {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let body = response.text().await.unwrap_or_default();
            match status.as_u16() {
                401 | 403 => ProviderError::Auth(body),
                429 => ProviderError::RateLimited { retry_after_ms },
                s if s >= 500 => ProviderError::Network(format!("HTTP {}: {}", s, body)),
                s => ProviderError::Api(format!("HTTP {}: {}", s, body)),
            }
        }
        SseError::Transport(e) => ProviderError::Network(e.to_string()),
        other => ProviderError::Malformed(other.to_string()),
    }
}

#[derive(Default)]
struct ToolCallBuffer {
    id: String,
    name: String,
    arguments: String,
}

fn build_request_body(config: &StreamConfig) -> serde_json::Value {
    let mut messages: Vec<serde_json::Value> = Vec::new();

    if !config.system_prompt.is_empty() {
        messages.push(serde_json::json!({
            "role": "system",
            "content": config.system_prompt,
        }));
    }

    for msg in &config.messages {
        match msg {
            Message::User { content, .. } => {
                messages.push(serde_json::json!({
                    "role": "user",
                    "content": content_to_openai(content),
                }));
            }
            Message::Assistant { content, .. } => {
                let tool_calls: Vec<serde_json::Value> = msg
                    .tool_calls()
                    .into_iter()
                    .map(|tc| {
                        serde_json::json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {"name": tc.name, "arguments": raw_arguments(&tc.arguments)},
                        })
                    })
                    .collect();

                let mut msg_obj = serde_json::json!({"role": "assistant"});
                let text = msg.text();
                if !text.is_empty() || content.is_empty() {
                    msg_obj["content"] = serde_json::json!(text);
                }
                if !tool_calls.is_empty() {
                    msg_obj["tool_calls"] = serde_json::json!(tool_calls);
                }
                messages.push(msg_obj);
            }
            Message::ToolResult { tool_call_id, .. } => {
                messages.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": msg.text(),
                }));
            }
        }
    }

    let mut body = serde_json::json!({
        "model": config.model,
        "stream": true,
        "stream_options": {"include_usage": true},
        "messages": messages,
    });

    if let Some(max) = config.max_tokens {
        body["max_tokens"] = serde_json::json!(max);
    }

    if !config.tools.is_empty() {
        let tools: Vec<serde_json::Value> = config
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    if let Some(temp) = config.temperature {
        body["temperature"] = serde_json::json!(temp);
    }

    body
}

fn content_to_openai(content: &[Content]) -> serde_json::Value {
    if let [Content::Text { text }] = content {
        return serde_json::json!(text);
    }
    let parts: Vec<serde_json::Value> = content
        .iter()
        .filter_map(|c| match c {
            Content::Text { text } => Some(serde_json::json!({"type": "text", "text": text})),
            Content::Image { data, mime_type } => Some(serde_json::json!({
                "type": "image_url",
                "image_url": {"url": format!("data:{};base64,{}", mime_type, data)},
            })),
            Content::ToolCall { .. } => None,
        })
        .collect();
    serde_json::json!(parts)
}

// OpenAI streaming response types
#[derive(Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
