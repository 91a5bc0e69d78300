//! Tool call types exchanged between the streaming model and local handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A function invocation requested by the streaming model.
///
/// The identifier is assigned by the caller and is unique per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// Returns a string argument, if present and actually a string.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// Best-effort description of what the call asks for, used when the
    /// call is handed to the remote agent.
    ///
    /// Prefers an argument named `task`; otherwise falls back to a dump of
    /// every argument.
    pub fn task_description(&self) -> String {
        if let Some(task) = self.str_arg("task") {
            return task.to_string();
        }
        let mut parts: Vec<String> = self
            .args
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}: {s}"),
                other => format!("{key}: {other}"),
            })
            .collect();
        parts.sort();
        parts.join(", ")
    }
}

/// The outcome of executing a tool call.
///
/// A handler that declines a call returns `None` instead of a `ToolResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResult {
    Success(String),
    Error(String),
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        ToolResult::Success(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolResult::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ToolResult::Success(msg) | ToolResult::Error(msg) => msg,
        }
    }
}

/// Response envelope sent back to the model transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub result: ToolResult,
}

impl ToolResponse {
    pub fn new(call: &ToolCall, result: ToolResult) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            result,
        }
    }
}

/// A function declaration advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    /// Builds a declaration whose parameters are derived from a typed
    /// argument struct.
    pub fn for_args<T: schemars::JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::to_value(&schema).unwrap_or(Value::Null),
        }
    }
}
