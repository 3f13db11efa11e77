//! Tool System
//!
//! Two halves, supplied separately by the caller:
//!
//! - [`ToolSchema`]: the declarative description sent to the provider so it
//!   knows what it may request.
//! - [`ToolRegistry`]: the local name → callable map the dispatch loop uses to
//!   run what the provider requested.
//!
//! Tools are opaque. They receive decoded keyword arguments and return a string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Decoded keyword arguments for a tool call
pub type ToolArguments = Map<String, Value>;

/// Tool invocation request produced by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call ID, echoed back on the tool result
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Serialized JSON argument payload, kept verbatim
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decode the argument payload into keyword arguments.
    ///
    /// A blank payload means "no arguments". Anything that is not a JSON
    /// object is rejected.
    pub fn parse_arguments(&self) -> Result<ToolArguments> {
        let raw = self.arguments.trim();
        if raw.is_empty() {
            return Ok(ToolArguments::new());
        }

        match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(ToolArguments::new()),
            other => Err(AgentError::Parse(format!(
                "arguments for '{}' must be a JSON object, got {}",
                self.name, other
            ))),
        }
    }
}

/// Result of one tool execution, as appended to the conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Call ID of the request this answers
    pub id: String,

    /// Tool that was called
    pub name: String,

    /// Returned content
    pub output: String,
}

impl ToolResult {
    pub fn new(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            output: output.into(),
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    /// A required parameter
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    /// An optional parameter
    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParameterSchema) -> Self {
        self.parameters.push(param);
        self
    }

    /// JSON Schema object describing the parameters
    pub fn parameters_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::String(param.param_type.clone()));
            prop.insert("description".into(), Value::String(param.description.clone()));
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), Value::Array(values.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(prop));

            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Function definition in the chat-completions `tools` format
    pub fn to_function_definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_json(),
            }
        })
    }
}

/// A locally invocable tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Run the tool with decoded keyword arguments.
    ///
    /// Errors are fatal to the current `invoke`; they are not turned into
    /// tool-result turns.
    async fn call(&self, arguments: ToolArguments) -> anyhow::Result<String>;
}

/// Adapter turning a plain closure into a [`Tool`]
pub struct FnTool<F>(F);

impl<F> FnTool<F>
where
    F: Fn(ToolArguments) -> anyhow::Result<String> + Send + Sync,
{
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(ToolArguments) -> anyhow::Result<String> + Send + Sync,
{
    async fn call(&self, arguments: ToolArguments) -> anyhow::Result<String> {
        (self.0)(arguments)
    }
}

/// Registry mapping tool names to callables
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under `name`, replacing any previous entry
    pub fn register<T: Tool + 'static>(&mut self, name: impl Into<String>, tool: T) {
        self.tools.insert(name.into(), Arc::new(tool));
    }

    /// Register a closure
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(ToolArguments) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.register(name, FnTool::new(f));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
