//! Tool registry and tool contract.
//!
//! A [`Tool`] is a named async capability with a declared parameter schema
//! and a timeout. The [`ToolRegistry`] validates parameters against the
//! schema, runs the tool under its timeout, and always reports a structured
//! [`ToolOutcome`]: tool failures never unwind the caller.

pub mod builtin;
pub mod registry;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;

pub use builtin::{CalculatorTool, CurrentTimeTool};
pub use registry::ToolRegistry;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string.
    String,
    /// Any JSON number.
    Number,
    /// Integral JSON number.
    Integer,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ParamType {
    /// Returns `true` if `value` has this type.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// Declared schema for one tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Expected JSON type.
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Whether the caller must supply it.
    #[serde(default)]
    pub required: bool,
    /// Value used when an optional parameter is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    /// A required parameter.
    #[must_use]
    pub const fn required(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: true,
            default: None,
            description: None,
        }
    }

    /// An optional parameter with a default value.
    #[must_use]
    pub const fn optional(param_type: ParamType, default: Value) -> Self {
        Self {
            param_type,
            required: false,
            default: Some(default),
            description: None,
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Serializable description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// Parameter schema, keyed by parameter name.
    pub parameters: BTreeMap<String, ParamSpec>,
    /// Effective timeout in seconds.
    pub timeout_secs: u64,
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Description shown to the planner.
    fn description(&self) -> &str;

    /// Parameter schema.
    fn parameters(&self) -> BTreeMap<String, ParamSpec>;

    /// Per-tool timeout. `None` uses the registry default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Runs the tool with validated parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolExecution`] when the tool cannot produce a result.
    async fn execute(&self, params: &Map<String, Value>) -> Result<Value, AgentError>;
}

/// A tool invocation chosen by the planner or by the keyword rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Registered tool name.
    pub tool_name: String,
    /// Arguments, keyed by parameter name.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Why the tool was chosen.
    #[serde(default)]
    pub reason: String,
}

/// Structured result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Tool that ran.
    pub tool_name: String,
    /// Whether it produced a result.
    pub success: bool,
    /// Result value on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// User-legible error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn ok(tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failed(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}
