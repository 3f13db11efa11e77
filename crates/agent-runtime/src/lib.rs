//! # agent-runtime
//!
//! Runtime pieces for `agent-core`.
//!
//! ## Providers
//!
//! - **OpenAI-compatible** (default): any `/chat/completions` endpoint,
//!   including a local Ollama through `OpenAiConfig::ollama()`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{AgentBuilder, OpenAiProvider, Startup};
//!
//! Startup::new().init()?;
//! let mut agent = AgentBuilder::new("assistant")
//!     .provider(Arc::new(OpenAiProvider::from_env()?))
//!     .model("gpt-4o-mini")
//!     .build()?;
//! let answer = agent.invoke("What is 2 + 2?").await?;
//! ```

pub mod openai;
pub mod startup;

pub use openai::{OpenAiConfig, OpenAiProvider};
pub use startup::{Startup, StartupError, StartupReport};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentBuilder, AgentError, LlmProvider, Message, Result, Role, Session, Tool,
    ToolRegistry, ToolSchema,
};
