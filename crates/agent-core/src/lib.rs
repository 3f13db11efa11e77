//! # agent-core
//!
//! A named agent over a remote completion provider, with a turn-based
//! conversation buffer and a tool dispatch loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Dispatch   │  │    Tool     │  │   LlmProvider       │  │
//! │  │    Loop     │──│  Registry   │──│   (Strategy)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │         │                                                    │
//! │  ┌─────────────┐                                             │
//! │  │   Session   │  seed → user → assistant → tool* → ...      │
//! │  └─────────────┘                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the agent independent of the backend; see
//! `agent-runtime` for an HTTP implementation.

pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider, Reply, ScriptedProvider};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, UnknownToolPolicy};
pub use session::Session;
pub use tool::{
    FnTool, ParameterSchema, Tool, ToolArguments, ToolCall, ToolRegistry, ToolResult, ToolSchema,
};
