//! Tool registry: lookup, parameter validation and timed execution.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Tool, ToolOutcome, ToolSpec};
use crate::error::AgentError;

/// Registered tools keyed by name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    default_timeout: Duration,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new(default_timeout: Duration) -> Self {
        Self {
            tools: BTreeMap::new(),
            default_timeout,
        }
    }

    /// Registry preloaded with the built-in tools.
    #[must_use]
    pub fn with_builtins(default_timeout: Duration) -> Self {
        let mut registry = Self::new(default_timeout);
        registry.register(Arc::new(super::CalculatorTool));
        registry.register(Arc::new(super::CurrentTimeTool));
        registry
    }

    /// Adds or replaces a tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Returns `true` if a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Effective timeout for a tool.
    #[must_use]
    pub fn timeout_for(&self, tool: &dyn Tool) -> Duration {
        tool.timeout().unwrap_or(self.default_timeout)
    }

    /// Serializable descriptions of every tool, in name order.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
                timeout_secs: self.timeout_for(tool.as_ref()).as_secs(),
            })
            .collect()
    }

    /// Validates parameters against the tool's schema and fills defaults.
    ///
    /// Unknown parameters are passed through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolValidation`] when a required parameter is
    /// missing or a supplied value has the wrong JSON type.
    pub fn validate(
        tool: &dyn Tool,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, AgentError> {
        let mut resolved = params.clone();
        for (name, spec) in tool.parameters() {
            match params.get(&name) {
                Some(value) if !value.is_null() => {
                    if !spec.param_type.matches(value) {
                        return Err(AgentError::ToolValidation {
                            name: tool.name().to_string(),
                            message: format!("参数 {name} 类型错误，应为 {:?}", spec.param_type),
                        });
                    }
                }
                _ if spec.required => {
                    return Err(AgentError::ToolValidation {
                        name: tool.name().to_string(),
                        message: format!("缺少必需参数: {name}"),
                    });
                }
                _ => {
                    if let Some(default) = spec.default {
                        resolved.insert(name, default);
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// Executes one tool call, never failing.
    ///
    /// Unknown tools, validation errors, tool errors, timeouts and
    /// cancellation all become a `success: false` outcome.
    pub async fn execute(
        &self,
        name: &str,
        params: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let Some(tool) = self.get(name) else {
            return ToolOutcome::failed(name, format!("未知工具: {name}"));
        };

        let params = match Self::validate(tool.as_ref(), params) {
            Ok(params) => params,
            Err(e) => return ToolOutcome::failed(name, failure_message(&e)),
        };

        let timeout = self.timeout_for(tool.as_ref());
        debug!(tool = name, timeout_ms = timeout.as_millis(), "executing tool");

        let run = tokio::time::timeout(timeout, tool.execute(&params));
        let result = tokio::select! {
            () = cancel.cancelled() => Err(AgentError::Cancelled),
            outcome = run => outcome.unwrap_or_else(|_| Err(AgentError::ToolTimeout {
                name: name.to_string(),
                timeout,
            })),
        };

        match result {
            Ok(value) => ToolOutcome::ok(name, value),
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                ToolOutcome::failed(name, failure_message(&e))
            }
        }
    }
}

/// User-legible failure text for a tool error.
fn failure_message(error: &AgentError) -> String {
    match error {
        AgentError::ToolTimeout { timeout, .. } => {
            format!("工具执行超时（{}）", humanize(*timeout))
        }
        AgentError::ToolValidation { message, .. } | AgentError::ToolExecution { message, .. } => {
            message.clone()
        }
        AgentError::Cancelled => "请求已取消".to_string(),
        other => format!("工具执行失败（{}）", other.category()),
    }
}

fn humanize(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}秒", duration.as_secs())
    } else {
        format!("{}毫秒", duration.as_millis())
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
