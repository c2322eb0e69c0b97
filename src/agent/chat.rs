//! Chat agent: intent routing, per-user history and plain chat completion.
//!
//! The chat agent is the terminal step of every default workflow. It
//! classifies the message, reuses or requests a result from the matching
//! specialist agent, and otherwise answers through the LLM with the
//! conversation history and any upstream results as context.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::future::ready;
use futures_util::stream;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::{ChatMessage, ChatRequest, assistant_message, system_message, user_message};
use super::prompt::build_chat_system_prompt;
use super::provider::{LlmProvider, TextStream};
use super::reply::Reply;
use super::stats::AgentStats;
use super::traits::Agent;
use super::AgentKind;
use crate::context::RequestContext;
use crate::error::AgentError;

/// Cues that route a message to the knowledge agent.
const KNOWLEDGE_CUES: &[&str] = &[
    "什么是", "是什么", "如何", "怎么", "怎样", "为什么", "政策", "规定", "流程", "说明",
    "介绍", "区别", "退货", "退款", "保修", "售后", "会员", "what is", "how to", "how do",
    "policy", "explain",
];
/// Cues that route a message to the tool agent.
const TOOL_CUES: &[&str] = &[
    "计算", "算一下", "等于", "几点", "时间", "日期", "今天", "星期", "天气", "翻译", "搜索",
    "查询", "calculate", "time", "weather", "translate",
];

/// Reply used for plain chat when no LLM is configured.
const OFFLINE_REPLY: &str =
    "您好！我是智能客服助手。当前语言模型服务不可用，我可以帮您查询知识库或执行计算、时间查询等工具操作。";

/// Routing decision for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatIntent {
    /// Knowledge-backed answer.
    Knowledge,
    /// Tool-backed answer.
    Tool,
    /// Attachment analysis.
    Multimodal,
    /// Plain chat completion.
    General,
}

impl ChatIntent {
    /// Classifies a message by keyword membership, in fixed order.
    ///
    /// Knowledge and tool routes respect the context's enable flags.
    #[must_use]
    pub fn classify(message: &str, ctx: &RequestContext) -> Self {
        let lowered = message.to_lowercase();
        let hit = |cues: &[&str]| cues.iter().any(|cue| lowered.contains(cue));
        if ctx.enable_knowledge && hit(KNOWLEDGE_CUES) {
            Self::Knowledge
        } else if ctx.enable_tools && hit(TOOL_CUES) {
            Self::Tool
        } else if ctx.has_multimodal() {
            Self::Multimodal
        } else {
            Self::General
        }
    }

    /// Specialist kind serving this intent.
    #[must_use]
    pub const fn delegate(self) -> Option<AgentKind> {
        match self {
            Self::Knowledge => Some(AgentKind::Knowledge),
            Self::Tool => Some(AgentKind::Tool),
            Self::Multimodal => Some(AgentKind::Multimodal),
            Self::General => None,
        }
    }
}

/// Bounded conversation history, one buffer per session.
///
/// Holds at most `max_sessions` buffers; the least recently used session is
/// evicted first. Clones share the same buffers.
#[derive(Clone)]
pub struct ConversationHistory {
    max_turns: usize,
    sessions: Cache<String, Arc<Mutex<Vec<ChatMessage>>>>,
}

impl ConversationHistory {
    /// Keeps at most `max_turns` user/assistant pairs for each of at most
    /// `max_sessions` sessions.
    #[must_use]
    pub fn new(max_turns: usize, max_sessions: u64) -> Self {
        Self {
            max_turns,
            sessions: Cache::builder()
                .max_capacity(max_sessions)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    /// Appends one exchange, dropping the oldest entries past `2 × max_turns`.
    pub fn push_turn(&self, session: &str, user: &str, assistant: &str) {
        let buffer = self
            .sessions
            .get_with(session.to_string(), || Arc::new(Mutex::new(Vec::new())));
        let mut buffer = buffer.lock();
        buffer.push(user_message(user));
        buffer.push(assistant_message(assistant));
        let limit = self.max_turns * 2;
        if buffer.len() > limit {
            let excess = buffer.len() - limit;
            buffer.drain(..excess);
        }
    }

    /// Messages recorded for a session, oldest first.
    #[must_use]
    pub fn messages(&self, session: &str) -> Vec<ChatMessage> {
        self.sessions
            .get(session)
            .map(|buffer| buffer.lock().clone())
            .unwrap_or_default()
    }

    /// Forgets a session.
    pub fn clear(&self, session: &str) {
        self.sessions.invalidate(session);
    }

    /// Sessions currently held, after applying pending evictions.
    #[must_use]
    pub fn session_count(&self) -> u64 {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count()
    }
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("max_turns", &self.max_turns)
            .field("sessions", &self.sessions.entry_count())
            .finish()
    }
}

/// The conversational agent.
pub struct ChatAgent {
    stats: AgentStats,
    llm: Option<Arc<dyn LlmProvider>>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    history: ConversationHistory,
    collaborators: RwLock<BTreeMap<AgentKind, Weak<dyn Agent>>>,
}

impl ChatAgent {
    /// Creates a chat agent.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        system_prompt: impl Into<String>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            stats: AgentStats::new(),
            llm,
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: system_prompt.into(),
            history: ConversationHistory::new(config.max_history_length, config.max_sessions),
            collaborators: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a specialist the chat agent may call when no upstream
    /// result is available. Held weakly; the orchestrator owns it.
    pub fn set_collaborator(&self, agent: &Arc<dyn Agent>) {
        let kind = agent.kind();
        if kind == AgentKind::Chat {
            return;
        }
        self.collaborators.write().insert(kind, Arc::downgrade(agent));
    }

    fn collaborator(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        self.collaborators.read().get(&kind).and_then(Weak::upgrade)
    }

    /// Number of history entries kept for a session.
    #[must_use]
    pub fn history_len(&self, session: &str) -> usize {
        self.history.messages(session).len()
    }

    /// Result of the specialist serving `kind`: upstream first, then a call.
    ///
    /// A specialist that already ran in this workflow is not called again.
    /// `None` means plain chat should answer instead.
    async fn delegate(
        &self,
        kind: AgentKind,
        message: &str,
        ctx: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Option<Reply>, AgentError> {
        if let Some(result) = ctx.upstream_result(kind).filter(|r| !r.trim().is_empty()) {
            debug!(kind = %kind, "reusing upstream result");
            return Ok(Some(Reply::answer(result)));
        }
        if ctx.was_consulted(kind) {
            debug!(kind = %kind, "specialist ran without a result, using plain chat");
            return Ok(None);
        }
        let Some(agent) = self.collaborator(kind) else {
            debug!(kind = %kind, "no collaborator, falling back to plain chat");
            return Ok(None);
        };
        let reply = agent.process(message, ctx, cancel).await?;
        if reply.is_apology() || reply.text().trim().is_empty() {
            debug!(kind = %kind, "specialist failed, falling back to plain chat");
            return Ok(None);
        }
        Ok(Some(reply))
    }

    fn build_request(&self, message: &str, ctx: &RequestContext) -> ChatRequest {
        let mut messages = vec![system_message(&build_chat_system_prompt(
            &self.system_prompt,
            &ctx.upstream,
        ))];
        messages.extend(self.history.messages(ctx.session_key()));
        messages.push(user_message(message));

        let overrides = ctx.model.clone().unwrap_or_default();
        ChatRequest::new(overrides.model.unwrap_or_else(|| self.model.clone()), messages)
            .with_temperature(overrides.temperature.unwrap_or(self.temperature))
            .with_max_tokens(overrides.max_tokens.unwrap_or(self.max_tokens))
    }

    async fn plain_chat(&self, message: &str, ctx: &RequestContext) -> Result<String, AgentError> {
        let Some(llm) = self.llm.as_ref() else {
            return Ok(offline_reply(ctx));
        };
        let response = llm.chat(&self.build_request(message, ctx)).await?;
        if response.content.trim().is_empty() {
            return Err(AgentError::EmptyResponse {
                agent: self.name().to_string(),
            });
        }
        Ok(response.content)
    }

    fn record(&self, ctx: &RequestContext, cancel: &CancellationToken, user: &str, reply: &str) {
        if cancel.is_cancelled() {
            return;
        }
        self.history.push_turn(ctx.session_key(), user, reply);
    }
}

/// Deterministic reply when no LLM is configured.
fn offline_reply(ctx: &RequestContext) -> String {
    let references: Vec<&str> = ctx
        .upstream
        .iter()
        .filter(|(kind, result)| **kind != AgentKind::Chat && !result.trim().is_empty())
        .map(|(_, result)| result.as_str())
        .collect();
    if references.is_empty() {
        OFFLINE_REPLY.to_string()
    } else {
        format!("根据已获取的信息：\n\n{}", references.join("\n\n"))
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn name(&self) -> &'static str {
        "chat_agent"
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Chat
    }

    fn stats(&self) -> &AgentStats {
        &self.stats
    }

    async fn handle(
        &self,
        message: &str,
        ctx: &RequestContext,
        cancel: &CancellationToken,
    ) -> Result<Reply, AgentError> {
        let intent = ChatIntent::classify(message, ctx);
        debug!(?intent, "classified chat intent");

        let delegated = match intent.delegate() {
            Some(kind) => self.delegate(kind, message, ctx, cancel).await?,
            None => None,
        };
        let reply = match delegated {
            Some(reply) => reply,
            None => Reply::Answer(self.plain_chat(message, ctx).await?),
        };

        self.record(ctx, cancel, message, reply.text());
        Ok(reply)
    }

    async fn stream(
        &self,
        message: &str,
        ctx: &RequestContext,
        cancel: &CancellationToken,
    ) -> Option<Result<TextStream, AgentError>> {
        let llm = self.llm.as_ref()?;
        let message = message.trim();
        if ChatIntent::classify(message, ctx) != ChatIntent::General {
            return None;
        }

        let upstream = match llm.chat_stream(&self.build_request(message, ctx)).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(error = %e, "native streaming unavailable");
                return None;
            }
        };
        self.stats.record_message();

        let collected = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&collected);
        let history = self.history.clone();
        let session = ctx.session_key().to_string();
        let user = message.to_string();
        let cancel = cancel.clone();

        let recording = upstream.inspect(move |chunk| {
            if let Ok(text) = chunk {
                sink.lock().push_str(text);
            }
        });
        let finish = stream::once(async move {
            if !cancel.is_cancelled() {
                let reply = collected.lock().clone();
                history.push_turn(&session, &user, &reply);
            }
        })
        .filter_map(|()| ready(None::<Result<String, AgentError>>));

        Some(Ok(Box::pin(recording.chain(finish))))
    }
}

impl std::fmt::Debug for ChatAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAgent")
            .field("model", &self.model)
            .field("llm", &self.llm.as_ref().map(|l| l.name()))
            .field("collaborators", &self.collaborators.read().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> ChatAgent {
        let config = AgentConfig::builder()
            .max_history_length(2)
            .build()
            .unwrap_or_else(|_| unreachable!());
        ChatAgent::new(&config, "system", None)
    }

    #[test]
    fn test_intent_order() {
        let ctx = RequestContext::default();
        assert_eq!(ChatIntent::classify("退货政策是什么", &ctx), ChatIntent::Knowledge);
        assert_eq!(ChatIntent::classify("帮我计算 3*7", &ctx), ChatIntent::Tool);
        assert_eq!(ChatIntent::classify("你好", &ctx), ChatIntent::General);

        let ctx = RequestContext {
            images: vec!["a.png".to_string()],
            ..RequestContext::default()
        };
        assert_eq!(ChatIntent::classify("看看这个", &ctx), ChatIntent::Multimodal);
    }

    #[test]
    fn test_intent_respects_enable_flags() {
        let ctx = RequestContext {
            enable_knowledge: false,
            enable_tools: false,
            ..RequestContext::default()
        };
        assert_eq!(ChatIntent::classify("退货政策是什么", &ctx), ChatIntent::General);
        assert_eq!(ChatIntent::classify("现在几点", &ctx), ChatIntent::General);
    }

    #[test]
    fn test_history_trimmed_fifo() {
        let history = ConversationHistory::new(2, 10);
        for i in 0..5 {
            history.push_turn("u1", &format!("q{i}"), &format!("a{i}"));
        }
        let messages = history.messages("u1");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "q3");
        assert!(history.messages("u2").is_empty());
        history.clear("u1");
        assert!(history.messages("u1").is_empty());
    }

    #[test]
    fn test_sessions_are_capped() {
        let history = ConversationHistory::new(2, 3);
        for user in ["u1", "u2", "u3", "u4", "u5"] {
            history.push_turn(user, "q", "a");
        }
        assert!(history.session_count() <= 3);
        assert_eq!(history.messages("u5").len(), 2);
    }

    #[tokio::test]
    async fn test_upstream_result_reused() {
        let agent = agent();
        let mut ctx = RequestContext::for_user("u1");
        ctx.upstream
            .insert(AgentKind::Knowledge, "七天内可以无理由退货。".to_string());
        let reply = agent
            .process("退货政策是什么", &ctx, &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(reply, Reply::answer("七天内可以无理由退货。"));
        assert_eq!(agent.history_len("u1"), 2);
    }

    #[tokio::test]
    async fn test_offline_plain_chat() {
        let agent = agent();
        let reply = agent
            .process("你好", &RequestContext::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(reply, Reply::answer(OFFLINE_REPLY));
        assert_eq!(agent.history_len("anonymous"), 2);
    }

    struct BrokenKnowledge {
        stats: AgentStats,
    }

    #[async_trait]
    impl Agent for BrokenKnowledge {
        fn name(&self) -> &'static str {
            "broken_knowledge"
        }

        fn kind(&self) -> AgentKind {
            AgentKind::Knowledge
        }

        fn stats(&self) -> &AgentStats {
            &self.stats
        }

        async fn handle(
            &self,
            _message: &str,
            _ctx: &RequestContext,
            _cancel: &CancellationToken,
        ) -> Result<Reply, AgentError> {
            Err(AgentError::Embedding {
                message: "offline".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_specialist_is_not_relayed() {
        let agent = agent();
        let specialist: Arc<dyn Agent> = Arc::new(BrokenKnowledge {
            stats: AgentStats::new(),
        });
        agent.set_collaborator(&specialist);

        let reply = agent
            .process("退货政策是什么", &RequestContext::default(), &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(reply, Reply::answer(OFFLINE_REPLY));
        assert_eq!(specialist.stats().message_count(), 1);

        let mut ctx = RequestContext::default();
        ctx.consulted.insert(AgentKind::Knowledge);
        let reply = agent
            .process("退货政策是什么", &ctx, &CancellationToken::new())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(reply, Reply::answer(OFFLINE_REPLY));
        assert_eq!(specialist.stats().message_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_none_without_llm() {
        let agent = agent();
        let stream = agent
            .stream("你好", &RequestContext::default(), &CancellationToken::new())
            .await;
        assert!(stream.is_none());
    }
}
