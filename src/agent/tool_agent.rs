//! Tool agent: detects tool requests, plans calls and summarizes results.
//!
//! Planning prefers the LLM (a JSON array of `{tool_name, parameters,
//! reason}`) and falls back to keyword rules when the LLM is missing or
//! returns something unparsable. Calls run sequentially, each under its
//! own timeout; one failing call never aborts the rest.

use std::fmt::Write;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::{ChatRequest, system_message, user_message};
use super::prompt::{PromptSet, build_tool_planner_prompt, build_tool_summary_prompt};
use super::provider::LlmProvider;
use super::reply::Reply;
use super::stats::AgentStats;
use super::traits::Agent;
use super::AgentKind;
use crate::context::RequestContext;
use crate::error::AgentError;
use crate::tools::{ToolInvocation, ToolOutcome, ToolRegistry};

/// Confidence contributed by each keyword hit.
const CONFIDENCE_PER_HIT: f32 = 0.2;

/// Reply when the message does not ask for a tool.
pub const NO_TOOL_NEEDED: &str = "当前请求无需调用工具。";
/// Reply when a tool was requested but no call could be identified.
pub const NO_TOOL_IDENTIFIED: &str = "抱歉，我没能确定需要调用的工具，请换一种方式描述您的需求。";

/// Keyword categories for need detection.
const CATEGORIES: &[(ToolCategory, &[&str])] = &[
    (
        ToolCategory::Calculation,
        &["计算", "算一下", "等于", "加上", "减去", "乘以", "除以", "calculate", "+", "×", "÷", "*"],
    ),
    (
        ToolCategory::Time,
        &["时间", "几点", "日期", "今天", "星期", "现在", "time", "date"],
    ),
    (ToolCategory::Search, &["搜索", "查找", "查询", "search"]),
    (ToolCategory::Weather, &["天气", "气温", "下雨", "weather"]),
    (ToolCategory::Translation, &["翻译", "translate"]),
];

/// Arithmetic expression embedded in free text.
static EXPRESSION: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"[-+*/×÷().（）\d\s]*\d[-+*/×÷().（）\d\s]*"));

/// Families of tool requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Arithmetic.
    Calculation,
    /// Clock and calendar.
    Time,
    /// Lookup.
    Search,
    /// Weather.
    Weather,
    /// Translation.
    Translation,
}

/// Result of rule-based need detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolNeed {
    /// Whether any tool cue was found.
    pub needs_tools: bool,
    /// `min(hits × 0.2, 1.0)`.
    pub confidence: f32,
    /// Categories with at least one hit, in fixed order.
    pub categories: Vec<ToolCategory>,
}

impl ToolNeed {
    /// Counts keyword hits across all categories.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn detect(message: &str) -> Self {
        let lowered = message.to_lowercase();
        let mut hits = 0usize;
        let mut categories = Vec::new();
        for (category, cues) in CATEGORIES {
            let matched = cues.iter().filter(|cue| lowered.contains(*cue)).count();
            if matched > 0 {
                hits += matched;
                categories.push(*category);
            }
        }
        Self {
            needs_tools: hits > 0,
            confidence: (hits as f32 * CONFIDENCE_PER_HIT).min(1.0),
            categories,
        }
    }
}

/// Parses an LLM tool plan, tolerating markdown fences and a wrapping object.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] if the content is not a plan.
pub fn parse_plan(content: &str) -> Result<Vec<ToolInvocation>, AgentError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Plan {
        List(Vec<ToolInvocation>),
        Wrapped { tool_calls: Vec<ToolInvocation> },
    }

    let trimmed = content.trim();

    // Handle markdown code blocks
    let json_str = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    match serde_json::from_str::<Plan>(json_str) {
        Ok(Plan::List(calls) | Plan::Wrapped { tool_calls: calls }) => Ok(calls),
        Err(e) => Err(AgentError::ResponseParse {
            message: format!("Failed to parse tool plan: {e}"),
            content: content.to_string(),
        }),
    }
}

/// Keyword-rule fallback for tool identification.
#[must_use]
pub fn rule_based_calls(message: &str, need: &ToolNeed, registry: &ToolRegistry) -> Vec<ToolInvocation> {
    let mut calls = Vec::new();
    for category in &need.categories {
        match category {
            ToolCategory::Calculation if registry.contains("calculator") => {
                if let Some(expression) = extract_expression(message) {
                    let mut parameters = Map::new();
                    parameters.insert("expression".to_string(), Value::String(expression));
                    calls.push(ToolInvocation {
                        tool_name: "calculator".to_string(),
                        parameters,
                        reason: "消息中包含算式".to_string(),
                    });
                }
            }
            ToolCategory::Time if registry.contains("current_time") => {
                calls.push(ToolInvocation {
                    tool_name: "current_time".to_string(),
                    parameters: Map::new(),
                    reason: "询问当前时间".to_string(),
                });
            }
            _ => {}
        }
    }
    calls
}

/// Longest arithmetic-looking span that contains an operator.
fn extract_expression(message: &str) -> Option<String> {
    let regex = EXPRESSION.as_ref().ok()?;
    regex
        .find_iter(message)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s.chars().any(|c| "+-*/×÷".contains(c)))
        .max_by_key(|s| s.chars().count())
}

/// Plain-text summary of tool outcomes.
#[must_use]
pub fn summarize_outcomes(outcomes: &[ToolOutcome]) -> String {
    let mut summary = String::from("工具执行结果：");
    for outcome in outcomes {
        if outcome.success {
            let result = outcome
                .result
                .as_ref()
                .map_or_else(String::new, render_result);
            let _ = write!(summary, "\n- {}: 成功，结果: {result}", outcome.tool_name);
        } else {
            let error = outcome.error.as_deref().unwrap_or("未知错误");
            let _ = write!(summary, "\n- {}: 失败，原因: {error}", outcome.tool_name);
        }
    }
    summary
}

fn render_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The tool-using agent.
pub struct ToolAgent {
    stats: AgentStats,
    registry: Arc<ToolRegistry>,
    llm: Option<Arc<dyn LlmProvider>>,
    model: String,
    max_tool_calls: usize,
    planner_prompt: String,
    summary_prompt: String,
}

impl ToolAgent {
    /// Creates a tool agent over a registry.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        prompts: &PromptSet,
        registry: Arc<ToolRegistry>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            stats: AgentStats::new(),
            registry,
            llm,
            model: config.chat_model.clone(),
            max_tool_calls: config.max_tool_calls,
            planner_prompt: prompts.tool_planner.clone(),
            summary_prompt: prompts.tool_summary.clone(),
        }
    }

    /// The tool registry.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Identifies calls: LLM plan first, keyword rules as fallback.
    ///
    /// Unknown tools are dropped and the list is capped at `max_tool_calls`.
    pub async fn identify_tool_calls(&self, message: &str, need: &ToolNeed) -> Vec<ToolInvocation> {
        let planned = match self.plan_with_llm(message).await {
            Some(calls) if !calls.is_empty() => calls,
            _ => rule_based_calls(message, need, &self.registry),
        };
        planned
            .into_iter()
            .filter(|call| {
                let known = self.registry.contains(&call.tool_name);
                if !known {
                    debug!(tool = %call.tool_name, "dropping unknown tool from plan");
                }
                known
            })
            .take(self.max_tool_calls)
            .collect()
    }

    async fn plan_with_llm(&self, message: &str) -> Option<Vec<ToolInvocation>> {
        let llm = self.llm.as_ref()?;
        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                system_message(&self.planner_prompt),
                user_message(&build_tool_planner_prompt(
                    message,
                    &self.registry.specs(),
                    self.max_tool_calls,
                )),
            ],
        )
        .with_temperature(0.0);

        let response = match llm.chat(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "tool planning failed, using rules");
                return None;
            }
        };
        match parse_plan(&response.content) {
            Ok(calls) => Some(calls),
            Err(e) => {
                warn!(error = %e, "unparsable tool plan, using rules");
                None
            }
        }
    }

    /// Runs calls in order; stops early only on cancellation.
    pub async fn execute_tool_calls(
        &self,
        calls: &[ToolInvocation],
        cancel: &CancellationToken,
    ) -> Vec<ToolOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                break;
            }
            debug!(tool = %call.tool_name, reason = %call.reason, "calling tool");
            outcomes.push(
                self.registry
                    .execute(&call.tool_name, &call.parameters, cancel)
                    .await,
            );
        }
        outcomes
    }

    async fn rewrite(&self, message: &str, summary: &str) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                system_message(&self.summary_prompt),
                user_message(&build_tool_summary_prompt(message, summary)),
            ],
        );
        match llm.chat(&request).await {
            Ok(response) if !response.content.trim().is_empty() => Some(response.content),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "tool summary rewrite failed");
                None
            }
        }
    }
}

#[async_trait]
impl Agent for ToolAgent {
    fn name(&self) -> &'static str {
        "tool_agent"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Tool
    }

    fn stats(&self) -> &AgentStats {
        &self.stats
    }

    async fn handle(
        &self,
        message: &str,
        _ctx: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Reply, AgentError> {
        let need = ToolNeed::detect(message);
        debug!(confidence = need.confidence, categories = ?need.categories, "tool need detected");
        if !need.needs_tools {
            return Ok(Reply::notice(NO_TOOL_NEEDED));
        }

        let calls = self.identify_tool_calls(message, &need).await;
        if calls.is_empty() {
            return Ok(Reply::notice(NO_TOOL_IDENTIFIED));
        }

        let outcomes = self.execute_tool_calls(&calls, cancel).await;
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let summary = summarize_outcomes(&outcomes);
        Ok(Reply::Answer(self.rewrite(message, &summary).await.unwrap_or(summary)))
    }
}

impl std::fmt::Debug for ToolAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAgent")
            .field("registry", &self.registry)
            .field("llm", &self.llm.as_ref().map(|l| l.name()))
            .field("max_tool_calls", &self.max_tool_calls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn agent() -> ToolAgent {
        let config = AgentConfig::default();
        ToolAgent::new(
            &config,
            &PromptSet::defaults(),
            Arc::new(ToolRegistry::with_builtins(Duration::from_secs(30))),
            None,
        )
    }

    #[test]
    fn test_detect_confidence() {
        let need = ToolNeed::detect("帮我计算 3*7 等于多少");
        assert!(need.needs_tools);
        assert_eq!(need.categories, vec![ToolCategory::Calculation]);
        assert!((need.confidence - 0.6).abs() < 1e-6);

        let need = ToolNeed::detect("你好");
        assert!(!need.needs_tools);
        assert!(need.confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn test_confidence_capped() {
        let need = ToolNeed::detect("计算 算一下 等于 加上 减去 乘以 现在 时间");
        assert!((need.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_plan_variants() {
        let fenced = "```json\n[{\"tool_name\": \"calculator\", \"parameters\": {\"expression\": \"1+1\"}, \"reason\": \"math\"}]\n```";
        let calls = parse_plan(fenced).unwrap_or_default();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "calculator");

        let wrapped = r#"{"tool_calls": [{"tool_name": "current_time"}]}"#;
        let calls = parse_plan(wrapped).unwrap_or_default();
        assert_eq!(calls[0].tool_name, "current_time");
        assert!(calls[0].parameters.is_empty());

        assert!(parse_plan("I think you need a calculator").is_err());
    }

    #[test]
    fn test_extract_expression() {
        assert_eq!(extract_expression("帮我算一下 (12+3)*4 是多少").as_deref(), Some("(12+3)*4"));
        assert_eq!(extract_expression("订单 12345"), None);
    }

    #[tokio::test]
    async fn test_rule_fallback_runs_calculator() {
        let reply = agent()
            .process("帮我计算 6*7", &RequestContext::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(reply.is_answer());
        let reply = reply.into_text();
        assert!(reply.contains("calculator"));
        assert!(reply.contains("42"));
    }

    #[tokio::test]
    async fn test_no_tool_needed() {
        let reply = agent()
            .process("你好", &RequestContext::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(reply, Reply::notice(NO_TOOL_NEEDED));
    }

    #[tokio::test]
    async fn test_failures_are_captured_per_call() {
        let agent = agent();
        let calls = vec![
            ToolInvocation {
                tool_name: "calculator".to_string(),
                parameters: Map::new(),
                reason: String::new(),
            },
            ToolInvocation {
                tool_name: "current_time".to_string(),
                parameters: Map::new(),
                reason: String::new(),
            },
        ];
        let outcomes = agent
            .execute_tool_calls(&calls, &CancellationToken::new())
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[1].success);
        let summary = summarize_outcomes(&outcomes);
        assert!(summary.contains("calculator: 失败"));
        assert!(summary.contains("current_time: 成功"));
    }

    /// Tool that never answers within its one-second timeout.
    struct StalledLookup;

    #[async_trait]
    impl crate::tools::Tool for StalledLookup {
        fn name(&self) -> &'static str {
            "order_lookup"
        }

        fn description(&self) -> &'static str {
            "looks up an order"
        }

        fn parameters(&self) -> std::collections::BTreeMap<String, crate::tools::ParamSpec> {
            std::collections::BTreeMap::new()
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_secs(1))
        }

        async fn execute(&self, _params: &Map<String, Value>) -> Result<Value, AgentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_call_does_not_stop_the_next() {
        let mut registry = ToolRegistry::with_builtins(Duration::from_secs(30));
        registry.register(Arc::new(StalledLookup));
        let agent = ToolAgent::new(
            &AgentConfig::default(),
            &PromptSet::defaults(),
            Arc::new(registry),
            None,
        );
        let mut expression = Map::new();
        expression.insert("expression".to_string(), Value::String("2+3".to_string()));
        let calls = vec![
            ToolInvocation {
                tool_name: "order_lookup".to_string(),
                parameters: Map::new(),
                reason: String::new(),
            },
            ToolInvocation {
                tool_name: "calculator".to_string(),
                parameters: expression,
                reason: String::new(),
            },
        ];

        let outcomes = agent
            .execute_tool_calls(&calls, &CancellationToken::new())
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.as_deref().unwrap_or_default().contains("超时"));
        assert!(outcomes[1].success);
        assert!(summarize_outcomes(&outcomes).contains("order_lookup: 失败"));
    }
}
