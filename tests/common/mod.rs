//! Shared mocks for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use assistflow::agent::{AgentStats, ChatRequest, ChatResponse};
use assistflow::retrieval::{SearchFilter, VectorHit};
use assistflow::{
    Agent, AgentError, AgentKind, Embedder, LlmProvider, Reply, RequestContext, TextStream,
    VectorStore,
};
use async_trait::async_trait;
use futures_util::stream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// One recorded agent invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub kind: AgentKind,
    pub upstream: BTreeMap<AgentKind, String>,
}

/// Shared invocation log.
pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Agent returning a fixed reply (or failing) and logging each call.
pub struct ScriptedAgent {
    kind: AgentKind,
    reply: Option<Reply>,
    delay: Duration,
    log: CallLog,
    stats: AgentStats,
}

impl ScriptedAgent {
    pub fn new(kind: AgentKind, reply: &str, log: &CallLog) -> Arc<dyn Agent> {
        Self::with_reply(kind, Reply::answer(reply), log)
    }

    pub fn with_reply(kind: AgentKind, reply: Reply, log: &CallLog) -> Arc<dyn Agent> {
        Arc::new(Self {
            kind,
            reply: Some(reply),
            delay: Duration::ZERO,
            log: Arc::clone(log),
            stats: AgentStats::new(),
        })
    }

    /// Agent that answers only after `delay`.
    pub fn delayed(kind: AgentKind, reply: &str, delay: Duration, log: &CallLog) -> Arc<dyn Agent> {
        Arc::new(Self {
            kind,
            reply: Some(Reply::answer(reply)),
            delay,
            log: Arc::clone(log),
            stats: AgentStats::new(),
        })
    }

    /// Agent whose `handle` always fails with a workflow error.
    pub fn failing(kind: AgentKind, log: &CallLog) -> Arc<dyn Agent> {
        Arc::new(Self {
            kind,
            reply: None,
            delay: Duration::ZERO,
            log: Arc::clone(log),
            stats: AgentStats::new(),
        })
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn stats(&self) -> &AgentStats {
        &self.stats
    }

    async fn handle(
        &self,
        _message: &str,
        ctx: &RequestContext,
        _cancel: &CancellationToken,
    ) -> Result<Reply, AgentError> {
        self.log.lock().push(Call {
            kind: self.kind,
            upstream: ctx.upstream.clone(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().ok_or_else(|| AgentError::Orchestration {
            message: "scripted failure".to_string(),
        })
    }
}

/// Calls in order, by kind.
pub fn kinds(log: &CallLog) -> Vec<AgentKind> {
    log.lock().iter().map(|c| c.kind).collect()
}

/// LLM answering every request with the same text.
pub struct FixedLlm {
    pub reply: String,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl FixedLlm {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmProvider for FixedLlm {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.requests.lock().push(request.clone());
        Ok(ChatResponse {
            content: self.reply.clone(),
            ..ChatResponse::default()
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, AgentError> {
        self.requests.lock().push(request.clone());
        let chunks: Vec<Result<String, AgentError>> = self
            .reply
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// LLM whose stream breaks off after its first chunk.
pub struct BrokenStreamLlm;

#[async_trait]
impl LlmProvider for BrokenStreamLlm {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        Ok(ChatResponse {
            content: "unused".to_string(),
            ..ChatResponse::default()
        })
    }

    async fn chat_stream(&self, _request: &ChatRequest) -> Result<TextStream, AgentError> {
        let chunks: Vec<Result<String, AgentError>> = vec![
            Ok("hel".to_string()),
            Err(AgentError::Stream {
                message: "connection reset".to_string(),
            }),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Embedder returning the same vector for every text.
pub struct ConstantEmbedder(pub Vec<f32>);

#[async_trait]
impl Embedder for ConstantEmbedder {
    fn model(&self) -> &str {
        "constant"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
        Ok(self.0.clone())
    }
}

/// Store returning canned hits per collection; unknown collections fail.
#[derive(Default)]
pub struct CannedStore {
    pub hits: HashMap<String, Vec<VectorHit>>,
    pub filters: Mutex<Vec<Option<SearchFilter>>>,
}

impl CannedStore {
    pub fn with(mut self, collection: &str, hits: Vec<VectorHit>) -> Self {
        self.hits.insert(collection.to_string(), hits);
        self
    }
}

#[async_trait]
impl VectorStore for CannedStore {
    async fn search(
        &self,
        collection: &str,
        _vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<VectorHit>, AgentError> {
        self.filters.lock().push(filter.cloned());
        let hits = self
            .hits
            .get(collection)
            .ok_or_else(|| AgentError::VectorSearch {
                collection: collection.to_string(),
                message: "collection not found".to_string(),
            })?;
        Ok(hits.iter().take(top_k).cloned().collect())
    }
}

/// A vector hit with distinct, filter-surviving text.
pub fn hit(id: &str, text: &str, score: f32) -> VectorHit {
    VectorHit {
        id: id.to_string(),
        text: text.to_string(),
        score,
        metadata: serde_json::Map::new(),
    }
}
