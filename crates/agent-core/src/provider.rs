//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for remote completion providers so the agent
//! works with any backend without code changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{GenerationOptions, LlmProvider};
//!
//! let completion = provider.complete(messages, &schema, &options).await?;
//! match completion.reply {
//!     Reply::Text(text) => println!("{text}"),
//!     Reply::ToolRequests { calls, .. } => run(calls),
//! }
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::tool::{ToolCall, ToolSchema};

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier, opaque to the agent (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Top-p nucleus sampling
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_temperature() -> f32 {
    0.1
}

impl GenerationOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            max_tokens: None,
            top_p: None,
            stop_sequences: Vec::new(),
        }
    }
}

/// What the provider answered with
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// Plain text, no tools requested
    Text(String),

    /// One or more tool invocations, in the order they must run
    ToolRequests {
        /// Text the model sent alongside the requests (often empty)
        content: String,
        calls: Vec<ToolCall>,
    },
}

impl Reply {
    /// Build a reply from the loose shape most wire formats use.
    ///
    /// An empty request list is a plain text reply.
    pub fn from_parts(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        let content = content.unwrap_or_default();
        if calls.is_empty() {
            Self::Text(content)
        } else {
            Self::ToolRequests { content, calls }
        }
    }

    /// Text content of the reply
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::ToolRequests { content: text, .. } => text,
        }
    }

    /// Requested tool calls (empty for text replies)
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Text(_) => &[],
            Self::ToolRequests { calls, .. } => calls.as_slice(),
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// Text or tool requests
    pub reply: Reply,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// A text-only completion
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            reply: Reply::Text(content.into()),
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        }
    }

    /// A completion requesting tools
    pub fn tool_requests(model: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            reply: Reply::from_parts(None, calls),
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::ToolUse),
        }
    }

    /// The assistant turn to append to the conversation
    pub fn to_message(&self) -> Message {
        Message::assistant(self.reply.text())
            .with_tool_calls(self.reply.tool_calls().to_vec())
            .with_model(&self.model)
    }
}

/// Token usage statistics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Generate a completion from the conversation.
    ///
    /// `tools` is the declared schema; an empty slice means no tools are
    /// offered to the model.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion>;
}

/// Deterministic provider replaying a fixed script of completions.
///
/// Every request's message list is recorded so callers can assert on what
/// the model would have seen.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(script: impl IntoIterator<Item = Completion>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another completion
    pub async fn push(&self, completion: Completion) {
        self.script.lock().await.push_back(completion);
    }

    /// Message lists received so far, one entry per `complete` call
    pub async fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().await.clone()
    }

    /// Completions not yet consumed
    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _options: &GenerationOptions,
    ) -> Result<Completion> {
        self.requests.lock().await.push(messages.to_vec());
        self.script
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))
    }
}
