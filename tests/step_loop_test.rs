//! Tests for the bounded tool-calling loop using MockProvider.

use serde_json::{json, Value};
use std::sync::Arc;
use switchboard::provider::mock::*;
use switchboard::provider::{MockProvider, ProviderError};
use switchboard::*;

struct Ping;

#[async_trait::async_trait]
impl AgentTool for Ping {
    fn name(&self) -> &str {
        "ping"
    }
    fn description(&self) -> &str {
        "Answers pong"
    }
    fn parameters(&self) -> Schema {
        Schema::object()
    }
    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(json!("pong"))
    }
}

fn client(provider: &Arc<MockProvider>) -> ModelClient {
    ModelClient::new(
        provider.clone(),
        ModelSettings {
            model: "mock".into(),
            ..Default::default()
        },
    )
    .with_retry_config(RetryConfig::none())
}

async fn run_looping(max_steps: usize) -> (GenerateOutput, usize) {
    let provider = Arc::new(MockProvider::looping(MockToolCall::new("ping", json!({}))));
    let tools = ToolRegistry::new().with(Ping);
    let output = client(&provider)
        .generate(GenerateRequest {
            system_prompt: "loop forever".into(),
            messages: vec![Message::user("go")],
            tools: &tools,
            max_steps,
        })
        .await
        .unwrap();
    (output, provider.calls())
}

#[tokio::test]
async fn test_step_ceiling_is_respected() {
    for ceiling in [3, 5, 10] {
        let (output, calls) = run_looping(ceiling).await;
        assert_eq!(calls, ceiling);
        assert_eq!(output.steps.len(), ceiling);
        assert_eq!(output.tool_calls.len(), ceiling);
        // The provider's own stop reason is reported; there is no budget error.
        assert_eq!(output.finish_reason, StopReason::ToolUse);
    }
}

#[tokio::test]
async fn test_stops_when_no_tools_requested() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::TextWithTools("Checking.".into(), vec![MockToolCall::new("ping", json!({}))]),
        MockResponse::Text("All good.".into()),
    ]));
    let tools = ToolRegistry::new().with(Ping);
    let output = client(&provider)
        .generate(GenerateRequest {
            system_prompt: String::new(),
            messages: vec![Message::user("status?")],
            tools: &tools,
            max_steps: 10,
        })
        .await
        .unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(output.text, "All good.");
    assert_eq!(output.steps[0].text, "Checking.");
    assert_eq!(output.finish_reason, StopReason::Stop);

    let call = &output.tool_calls[0];
    assert_eq!(output.result_for(&call.id).unwrap().result, json!("pong"));

    // The second request carries the tool result back to the model.
    let second = &provider.requests()[1];
    assert_eq!(second.messages.len(), 3);
    assert_eq!(second.messages[2].role(), "toolResult");
    assert_eq!(second.tools[0].name, "ping");
}

#[tokio::test]
async fn test_unknown_tool_does_not_abort_loop() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::ToolCalls(vec![MockToolCall::new("missing", json!({}))]),
        MockResponse::Text("Carrying on.".into()),
    ]));
    let tools = ToolRegistry::new().with(Ping);
    let output = client(&provider)
        .generate(GenerateRequest {
            system_prompt: String::new(),
            messages: vec![Message::user("hi")],
            tools: &tools,
            max_steps: 10,
        })
        .await
        .unwrap();

    let result = &output.tool_results[0];
    assert!(result.is_error);
    assert_eq!(result.result["success"], false);
    assert_eq!(result.result["available"], json!(["ping"]));
    assert_eq!(output.text, "Carrying on.");
}

#[tokio::test]
async fn test_provider_error_is_returned() {
    let provider = Arc::new(MockProvider::failing(ProviderError::Auth("bad key".into())));
    let tools = ToolRegistry::new();
    let err = client(&provider)
        .generate(GenerateRequest {
            system_prompt: String::new(),
            messages: vec![Message::user("hi")],
            tools: &tools,
            max_steps: 3,
        })
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::Auth("bad key".into()));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::Error(ProviderError::Network("reset".into())),
        MockResponse::Error(ProviderError::RateLimited {
            retry_after_ms: Some(1),
        }),
        MockResponse::Text("Recovered.".into()),
    ]));
    let model = ModelClient::new(provider.clone(), ModelSettings::default()).with_retry_config(
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            backoff_multiplier: 1.0,
            max_delay_ms: 5,
        },
    );
    let tools = ToolRegistry::new();
    let output = model
        .generate(GenerateRequest {
            system_prompt: String::new(),
            messages: vec![Message::user("hi")],
            tools: &tools,
            max_steps: 1,
        })
        .await
        .unwrap();
    assert_eq!(output.text, "Recovered.");
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_on_step_sees_every_step_in_order() {
    let provider = Arc::new(MockProvider::new(vec![
        MockResponse::ToolCalls(vec![MockToolCall::new("ping", json!({}))]),
        MockResponse::ToolCalls(vec![MockToolCall::new("ping", json!({}))]),
        MockResponse::Text("done".into()),
    ]));
    let tools = ToolRegistry::new().with(Ping);
    let mut seen = Vec::new();
    client(&provider)
        .generate_with(
            GenerateRequest {
                system_prompt: String::new(),
                messages: vec![Message::user("hi")],
                tools: &tools,
                max_steps: 10,
            },
            |step| seen.push((step.index, step.tool_results.len())),
        )
        .await
        .unwrap();
    assert_eq!(seen, vec![(0, 1), (1, 1), (2, 0)]);
}
