//! Tool Dispatch Loop
//!
//! One `invoke` sends the conversation to the provider, runs whatever tools it
//! asks for, feeds the results back and repeats until the provider answers
//! with plain text:
//!
//! ```text
//! IDLE → SENT_REQUEST → (TOOLS_REQUESTED → EXECUTING_TOOLS → SENT_REQUEST)* → DONE → IDLE
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider, Reply};
use crate::session::Session;
use crate::tool::{Tool, ToolArguments, ToolCall, ToolRegistry, ToolResult, ToolSchema};

/// What to do when the model asks for a tool that is not registered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownToolPolicy {
    /// Fail the invoke with [`AgentError::ToolNotFound`]
    #[default]
    Abort,
    /// Answer the request with an error tool result and let the model retry
    ReportToModel,
}

/// Agent configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt; empty means no system turn
    #[serde(default)]
    pub system_prompt: String,

    /// Maximum provider round-trips per invoke
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Generation options
    #[serde(default)]
    pub generation: GenerationOptions,

    /// Handling of unregistered tool names
    #[serde(default)]
    pub unknown_tool: UnknownToolPolicy,
}

const fn default_max_rounds() -> usize {
    10
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            generation: GenerationOptions::new(model),
            ..Self::default()
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            max_rounds: default_max_rounds(),
            generation: GenerationOptions::default(),
            unknown_tool: UnknownToolPolicy::default(),
        }
    }
}

/// A named agent driving one provider and a set of local tools
pub struct Agent {
    name: String,
    provider: Arc<dyn LlmProvider>,
    schema: Vec<ToolSchema>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    session: Session,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create a new agent
    ///
    /// Fails with [`AgentError::Config`] when `config.max_rounds` is zero.
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        schema: Vec<ToolSchema>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Result<Self> {
        if config.max_rounds == 0 {
            return Err(AgentError::Config("max_rounds must be at least 1".into()));
        }

        let session = Session::new(config.system_prompt.clone());
        Ok(Self {
            name: name.into(),
            provider,
            schema,
            tools,
            config,
            session,
        })
    }

    /// Agent without tools or system prompt
    pub fn with_defaults(
        name: impl Into<String>,
        model: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        Self::new(
            name,
            provider,
            Vec::new(),
            Arc::new(ToolRegistry::new()),
            AgentConfig::new(model),
        )
    }

    /// Send `message` and drive the tool loop to a final text answer.
    ///
    /// The session is reset afterwards whatever the outcome; the full
    /// conversation stays readable through [`Agent::last_transcript`].
    pub async fn invoke(&mut self, message: &str) -> Result<String> {
        info!(agent = %self.name, "Calling agent");

        let Self {
            name,
            provider,
            schema,
            tools,
            config,
            session,
        } = self;

        let mut turn = session.begin();
        turn.push(Message::user(message));

        let dispatcher = Dispatcher {
            agent: name,
            provider: Arc::as_ref(provider),
            schema,
            tools,
            config,
        };
        dispatcher.run(&mut turn).await
    }

    /// Clear the conversation and reseed the system turn
    pub fn reset(&mut self) {
        self.session.reset();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.config.generation.model
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Declared tool schema, in the order sent to the provider
    pub fn schema(&self) -> &[ToolSchema] {
        &self.schema
    }

    /// Current conversation (the seed, between invokes)
    pub fn session(&self) -> &Conversation {
        self.session.conversation()
    }

    /// Conversation of the most recent invoke, captured before reset
    pub fn last_transcript(&self) -> Option<&Conversation> {
        self.session.last_transcript()
    }
}

/// Borrowed view of an agent for the duration of one invoke
struct Dispatcher<'a> {
    agent: &'a str,
    provider: &'a dyn LlmProvider,
    schema: &'a [ToolSchema],
    tools: &'a ToolRegistry,
    config: &'a AgentConfig,
}

/// A request whose payload decoded cleanly
struct PreparedCall<'c> {
    call: &'c ToolCall,
    arguments: ToolArguments,
}

impl Dispatcher<'_> {
    async fn run(&self, conversation: &mut Conversation) -> Result<String> {
        for round in 1..=self.config.max_rounds {
            debug!(
                agent = %self.agent,
                provider = %self.provider.name(),
                round,
                messages = conversation.len(),
                "LLM call"
            );

            let completion = self
                .provider
                .complete(conversation.messages(), self.schema, &self.config.generation)
                .await?;
            conversation.push(completion.to_message());

            let Some(prepared) = self.inspect(&completion.reply) else {
                return Ok(completion.reply.text().to_owned());
            };

            // no round left to send results back in
            if round == self.config.max_rounds {
                warn!(agent = %self.agent, round, "Round limit reached with tools pending");
                break;
            }

            for PreparedCall { call, arguments } in prepared {
                let result = self.dispatch(call, arguments).await?;
                conversation.push(Message::tool(result.output, result.id, result.name));
            }
        }

        Err(AgentError::MaxIterations(self.config.max_rounds))
    }

    /// Decide whether a reply asks for tools. Any payload that fails to
    /// decode makes the whole reply count as plain text.
    fn inspect<'c>(&self, reply: &'c Reply) -> Option<Vec<PreparedCall<'c>>> {
        let Reply::ToolRequests { calls, .. } = reply else {
            debug!(agent = %self.agent, "No tool call to process");
            return None;
        };

        let mut prepared = Vec::with_capacity(calls.len());
        for call in calls {
            match call.parse_arguments() {
                Ok(arguments) => prepared.push(PreparedCall { call, arguments }),
                Err(e) => {
                    warn!(
                        agent = %self.agent,
                        tool = %call.name,
                        call_id = %call.id,
                        error = %e,
                        "Unreadable tool call, treating reply as text"
                    );
                    return None;
                }
            }
        }

        if prepared.is_empty() { None } else { Some(prepared) }
    }

    async fn dispatch(&self, call: &ToolCall, arguments: ToolArguments) -> Result<ToolResult> {
        let Some(tool) = self.tools.get(&call.name) else {
            return match self.config.unknown_tool {
                UnknownToolPolicy::Abort => Err(AgentError::ToolNotFound(call.name.clone())),
                UnknownToolPolicy::ReportToModel => {
                    warn!(agent = %self.agent, tool = %call.name, "Unknown tool requested");
                    Ok(ToolResult::new(
                        call,
                        format!("Error: tool '{}' is not available", call.name),
                    ))
                }
            };
        };

        info!(
            agent = %self.agent,
            tool = %call.name,
            arguments = %serde_json::Value::Object(arguments.clone()),
            "Calling tool"
        );

        let output = tool
            .call(arguments)
            .await
            .map_err(|e| AgentError::ToolExecution {
                name: call.name.clone(),
                message: format!("{e:#}"),
            })?;

        Ok(ToolResult::new(call, output))
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    name: String,
    provider: Option<Arc<dyn LlmProvider>>,
    schema: Vec<ToolSchema>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: None,
            schema: Vec::new(),
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Declare a tool and register its implementation under the schema's name
    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, schema: ToolSchema, tool: T) -> Self {
        self.tools.register(schema.name.clone(), tool);
        self.schema.push(schema);
        self
    }

    /// Declare a tool backed by a closure
    #[must_use]
    pub fn tool_fn<F>(mut self, schema: ToolSchema, f: F) -> Self
    where
        F: Fn(ToolArguments) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.tools.register_fn(schema.name.clone(), f);
        self.schema.push(schema);
        self
    }

    /// Replace the declared schema
    #[must_use]
    pub fn schema(mut self, schema: Vec<ToolSchema>) -> Self {
        self.schema = schema;
        self
    }

    /// Replace the tool registry
    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub const fn max_tokens(mut self, max: u32) -> Self {
        self.config.generation.max_tokens = Some(max);
        self
    }

    #[must_use]
    pub const fn max_rounds(mut self, max: usize) -> Self {
        self.config.max_rounds = max;
        self
    }

    #[must_use]
    pub const fn unknown_tool_policy(mut self, policy: UnknownToolPolicy) -> Self {
        self.config.unknown_tool = policy;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Agent::new(
            self.name,
            provider,
            self.schema,
            Arc::new(self.tools),
            self.config,
        )
    }
}
