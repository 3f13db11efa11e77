//! OpenAI-compatible LLM Provider
//!
//! Implementation of `LlmProvider` for any `/chat/completions` endpoint:
//! OpenAI itself, Ollama's `/v1` API, vLLM, OpenRouter and the like.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, Reply, TokenUsage},
    tool::{ToolCall, ToolSchema},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API base URL, without the `/chat/completions` suffix
    pub api_base: String,

    /// Bearer token; omitted from requests when `None`
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".into(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    /// Local Ollama through its OpenAI-compatible API
    pub fn ollama() -> Self {
        Self {
            api_base: "http://localhost:11434/v1".into(),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// Reads `OPENAI_API_BASE` (falling back to `OPENAI_BASE_URL`) and
    /// `OPENAI_API_KEY`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let api_base = var("OPENAI_API_BASE")
            .or_else(|| var("OPENAI_BASE_URL"))
            .unwrap_or_else(|| Self::default().api_base);

        Self {
            api_base,
            api_key: var("OPENAI_API_KEY"),
            ..Default::default()
        }
    }
}

/// OpenAI-compatible chat completions provider
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env())
    }

    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Convert agent messages to the wire format
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
        messages
            .iter()
            .map(|m| {
                let tool_calls: Vec<WireToolCall<'_>> = m
                    .tool_calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: &c.id,
                        kind: "function",
                        function: WireFunction {
                            name: &c.name,
                            arguments: &c.arguments,
                        },
                    })
                    .collect();

                // assistant turns that only carry tool calls send null content
                let content = if m.content.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(m.content.as_str())
                };

                WireMessage {
                    role: m.role,
                    content,
                    name: m.name.as_deref(),
                    tool_calls,
                    tool_call_id: if m.role == Role::Tool { m.tool_call_id() } else { None },
                }
            })
            .collect()
    }

    fn build_request<'a>(
        messages: &'a [Message],
        tools: &[ToolSchema],
        opts: &'a GenerationOptions,
    ) -> ChatRequest<'a> {
        let tools: Vec<Value> = tools.iter().map(ToolSchema::to_function_definition).collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");

        ChatRequest {
            model: &opts.model,
            messages: Self::convert_messages(messages),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            top_p: opts.top_p,
            stop: opts.stop_sequences.iter().map(String::as_str).collect(),
            tools,
            tool_choice,
        }
    }

    /// Convert a wire response to an agent completion
    fn convert_completion(response: ChatResponse, requested_model: &str) -> Result<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Parse("no choices in response".into()))?;

        let calls = parse_tool_calls(choice.message.tool_calls);
        let finish_reason = choice.finish_reason.as_deref().and_then(|reason| match reason {
            "stop" => Some(FinishReason::Stop),
            "length" => Some(FinishReason::Length),
            "tool_calls" | "function_call" => Some(FinishReason::ToolUse),
            "content_filter" => Some(FinishReason::ContentFilter),
            _ => None,
        });

        Ok(Completion {
            reply: Reply::from_parts(choice.message.content, calls),
            model: response.model.unwrap_or_else(|| requested_model.to_string()),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason,
        })
    }

    fn status_error(status: StatusCode, body: String) -> AgentError {
        let detail = format!("{status}: {body}");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
            StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
            s if s.is_server_error() => AgentError::ProviderUnavailable(detail),
            _ => AgentError::Provider(detail),
        }
    }
}

/// Read the `tool_calls` field leniently.
///
/// Absent, null or malformed means "no tool calls"; the reply then counts as
/// plain text. Calls without an id get a generated one so results can still
/// be matched.
fn parse_tool_calls(raw: Option<Value>) -> Vec<ToolCall> {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return Vec::new();
    };

    match serde_json::from_value::<Vec<RawToolCall>>(raw) {
        Ok(calls) => calls
            .into_iter()
            .map(|c| {
                let arguments = match c.function.arguments {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                ToolCall {
                    id: c.id.unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                    name: c.function.name,
                    arguments,
                }
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, "Malformed tool_calls in response, ignoring");
            Vec::new()
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self.authorize(self.client.get(self.endpoint("models")));
        match request.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Provider health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let body = Self::build_request(messages, tools, options);

        debug!(
            model = %options.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat completion"
        );

        let response = self
            .authorize(self.client.post(self.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".into());
            return Err(Self::status_error(status, text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        let completion = Self::convert_completion(parsed, &options.model)?;
        debug!(
            tool_calls = completion.reply.tool_calls().len(),
            finish_reason = ?completion.finish_reason,
            "Chat completion received"
        );
        Ok(completion)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: Option<String>,
    function: RawFunction,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use agent_core::{AgentBuilder, ParameterSchema};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig {
            api_base: format!("{}/v1", server.uri()),
            api_key: Some("test-key".into()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn text_body(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12 }
        })
    }

    async fn sent_bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::default();
        assert_eq!(config.api_base, "https://api.openai.com/v1");
        assert!(config.api_key.is_none());
        assert_eq!(OpenAiConfig::ollama().api_base, "http://localhost:11434/v1");
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_BASE_URL", "http://proxy.local/v1"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);
        let config = OpenAiConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.api_base, "http://proxy.local/v1");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));

        let config = OpenAiConfig::from_lookup(|k| (k == "OPENAI_API_KEY").then(|| " ".into()));
        assert!(config.api_key.is_none());
        assert_eq!(config.api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_base: "http://host/v1/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.endpoint("chat/completions"), "http://host/v1/chat/completions");
    }

    #[test]
    fn test_message_conversion() {
        let call = ToolCall::new("call_1", "add", r#"{"a":1}"#);
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
            Message::assistant("").with_tool_calls(vec![call]),
            Message::tool("1", "call_1", "add"),
        ];

        let wire = serde_json::to_value(OpenAiProvider::convert_messages(&messages)).unwrap();
        assert_eq!(wire[0], json!({"role": "system", "content": "You are helpful."}));
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], r#"{"a":1}"#);
        assert_eq!(
            wire[3],
            json!({"role": "tool", "content": "1", "name": "add", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn test_parse_tool_calls_is_lenient() {
        assert!(parse_tool_calls(None).is_empty());
        assert!(parse_tool_calls(Some(Value::Null)).is_empty());
        assert!(parse_tool_calls(Some(json!("oops"))).is_empty());
        assert!(parse_tool_calls(Some(json!([{"id": "x"}]))).is_empty());

        let calls = parse_tool_calls(Some(json!([
            {"function": {"name": "now"}},
            {"id": "c2", "function": {"name": "add", "arguments": {"a": 1}}}
        ])));
        assert_eq!(calls.len(), 2);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].arguments, "");
        assert_eq!(calls[1].arguments, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_complete_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("Hello!")))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let completion = provider
            .complete(&[Message::user("Hi")], &[], &GenerationOptions::new("gpt-4o-mini"))
            .await
            .unwrap();

        assert_eq!(completion.reply, Reply::Text("Hello!".into()));
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(12));

        let bodies = sent_bodies(&server).await;
        assert!(bodies[0].get("tools").is_none());
        assert!(bodies[0].get("tool_choice").is_none());
    }

    #[tokio::test]
    async fn test_complete_with_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": { "name": "add", "arguments": "{\"a\":1,\"b\":2}" }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let schema = vec![ToolSchema::new("add", "Add").param(ParameterSchema::required(
            "a", "integer", "left",
        ))];
        let completion = provider_for(&server)
            .complete(&[Message::user("1+2")], &schema, &GenerationOptions::new("m"))
            .await
            .unwrap();

        assert_eq!(completion.model, "m");
        assert_eq!(completion.finish_reason, Some(FinishReason::ToolUse));
        assert_eq!(
            completion.reply.tool_calls(),
            &[ToolCall::new("call_abc", "add", r#"{"a":1,"b":2}"#)]
        );

        let bodies = sent_bodies(&server).await;
        assert_eq!(bodies[0]["tool_choice"], "auto");
        assert_eq!(bodies[0]["tools"][0]["function"]["name"], "add");
    }

    #[tokio::test]
    async fn test_malformed_tool_calls_become_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "content": "just text", "tool_calls": {"bad": true} }
                }]
            })))
            .mount(&server)
            .await;

        let completion = provider_for(&server)
            .complete(&[Message::user("x")], &[], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.reply, Reply::Text("just text".into()));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases: [(u16, fn(&AgentError) -> bool); 4] = [
            (401, |e| matches!(e, AgentError::Auth(_))),
            (429, |e| matches!(e, AgentError::RateLimited(_))),
            (503, |e| matches!(e, AgentError::ProviderUnavailable(_))),
            (400, |e| matches!(e, AgentError::Provider(_))),
        ];
        for (status, check) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = provider_for(&server)
                .complete(&[Message::user("x")], &[], &GenerationOptions::default())
                .await
                .unwrap_err();
            assert!(check(&err), "status {status} mapped to {err:?}");
            assert!(err.to_string().contains("nope"));
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .complete(&[Message::user("x")], &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
    }

    #[tokio::test]
    async fn test_network_error_is_unavailable() {
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_base: "http://127.0.0.1:1".into(),
            api_key: None,
            timeout_secs: 2,
        })
        .unwrap();

        let err = provider
            .complete(&[Message::user("x")], &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!provider.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        assert!(provider_for(&server).health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_agent_round_trip_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": "",
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "add", "arguments": "{\"a\":1,\"b\":2}" }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("done")))
            .mount(&server)
            .await;

        let mut agent = AgentBuilder::new("http-agent")
            .provider(Arc::new(provider_for(&server)))
            .model("gpt-4o-mini")
            .system_prompt("You add numbers.")
            .tool_fn(ToolSchema::new("add", "Add two integers"), |args| {
                let sum: i64 = args.values().filter_map(Value::as_i64).sum();
                Ok(sum.to_string())
            })
            .build()
            .unwrap();

        assert_eq!(agent.invoke("compute").await.unwrap(), "done");

        let bodies = sent_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        let second = bodies[1]["messages"].as_array().unwrap();
        assert_eq!(second.len(), 4);
        assert_eq!(second[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            second[3],
            json!({"role": "tool", "content": "3", "name": "add", "tool_call_id": "call_1"})
        );
    }
}
