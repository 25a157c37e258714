//! Streaming orchestrator.
//!
//! Each request runs as its own task and ends in exactly one terminal event
//! (`done` or `error`) unless the consumer leaves first, in which case
//! nothing is sent or committed.

use crate::cache::ResponseCache;
use crate::delivery::{
    event_channel, into_model_stream_error, live, pump, replay, EventSink, EventStream,
    PumpOutcome, StreamEvent, TextSource,
};
use crate::gate::{ContextVerdict, RelevanceGate};
use crate::history::{ConversationStore, ConversationTurn};
use ragline_core::config::EngineConfig;
use ragline_core::{AppError, AppResult};
use ragline_knowledge::{RetrievalResult, Retriever};
use ragline_llm::{ChatMessage, LlmClient, LlmRequest};
use ragline_prompt::{build_messages, PromptPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// One inbound question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub namespace: String,
    pub question: String,
}

impl ChatRequest {
    pub fn new(namespace: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            question: question.into(),
        }
    }
}

/// Services the engine is built from.
pub struct EngineComponents {
    pub llm: Arc<dyn LlmClient>,
    pub model: String,
    pub retriever: Arc<Retriever>,
    pub cache: ResponseCache,
    pub policy: PromptPolicy,
}

/// Answers questions against per-namespace knowledge, streaming the result.
///
/// Cheap to clone; clones share history and cache.
#[derive(Clone)]
pub struct ChatEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    llm: Arc<dyn LlmClient>,
    model: String,
    retriever: Arc<Retriever>,
    cache: ResponseCache,
    policy: PromptPolicy,
    gate: RelevanceGate,
    history: ConversationStore,
}

/// Which path produced an answer; decides what gets committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnswerKind {
    Greeting,
    Cached,
    Generated { cacheable: bool },
}

impl ChatEngine {
    pub fn new(config: EngineConfig, components: EngineComponents) -> Self {
        let gate = RelevanceGate::new(config.relevance.clone());
        let history = ConversationStore::new(config.history.max_turns);

        Self {
            inner: Arc::new(EngineInner {
                config,
                llm: components.llm,
                model: components.model,
                retriever: components.retriever,
                cache: components.cache,
                policy: components.policy,
                gate,
                history,
            }),
        }
    }

    pub fn history(&self) -> &ConversationStore {
        &self.inner.history
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn policy(&self) -> &PromptPolicy {
        &self.inner.policy
    }

    /// Start answering `request`. Dropping the returned stream cancels it.
    pub fn ask(&self, request: ChatRequest) -> EventStream {
        let (sink, events) = event_channel(self.inner.config.channel_capacity);
        let inner = Arc::clone(&self.inner);

        let span = tracing::info_span!(
            "chat",
            request_id = %Uuid::new_v4(),
            namespace = %request.namespace
        );
        tokio::spawn(async move { inner.handle(request, sink).await }.instrument(span));

        events
    }
}

impl EngineInner {
    async fn handle(&self, request: ChatRequest, sink: EventSink) {
        match self.respond(&request, &sink).await {
            Ok(Some(answer)) => {
                sink.send(StreamEvent::done(answer)).await;
            }
            Ok(None) => {
                tracing::info!("Consumer disconnected, nothing committed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Request failed");
                sink.send(StreamEvent::error(e.to_string())).await;
            }
        }
    }

    /// Run one request to completion. `Ok(None)` means the consumer left.
    async fn respond(&self, request: &ChatRequest, sink: &EventSink) -> AppResult<Option<String>> {
        let namespace = request.namespace.as_str();
        let question = request.question.trim();

        if namespace.trim().is_empty() {
            return Err(AppError::InvalidInput("namespace must not be empty".to_string()));
        }
        if question.is_empty() {
            return Err(AppError::InvalidInput("question must not be empty".to_string()));
        }

        if self.gate.is_greeting(question) {
            tracing::info!("Greeting fast path");
            let source = self.replay(&self.policy.greeting);
            return self.deliver(namespace, question, source, sink, AnswerKind::Greeting).await;
        }

        let previous = self.history.last_user_question(namespace);
        if self.gate.should_bypass_cache(previous.as_deref(), question) {
            tracing::debug!("Topic changed since last question, bypassing cache");
        } else if let Some(cached) = self.cache.get(namespace, question).await {
            tracing::info!("Serving cached response");
            let source = self.replay(&cached);
            return self.deliver(namespace, question, source, sink, AnswerKind::Cached).await;
        }

        let (retrieval, degraded) = match self
            .retriever
            .retrieve(namespace, question, self.config.top_k)
            .await
        {
            Ok(result) => (result, false),
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval unavailable, answering without context");
                (RetrievalResult::default(), true)
            }
        };

        let sufficient =
            !degraded && self.gate.assess_context(&retrieval) == ContextVerdict::Sufficient;
        let context = sufficient.then_some(retrieval.context.as_str());
        tracing::debug!(
            passages = retrieval.passages.len(),
            sufficient,
            degraded,
            "Context assessed"
        );

        let history: Vec<ChatMessage> = self
            .history
            .recent(namespace, self.config.history_turns)
            .iter()
            .map(ConversationTurn::to_message)
            .collect();
        let prompt = build_messages(&self.policy, context, &history, question)?;

        let llm_request = LlmRequest::new(prompt.messages, &self.model)
            .with_streaming()
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        let Some(upstream) = self.open_stream(&llm_request, sink).await? else {
            return Ok(None);
        };
        let source = live(upstream, self.config.delivery.idle_timeout());

        self.deliver(
            namespace,
            question,
            source,
            sink,
            AnswerKind::Generated { cacheable: sufficient },
        )
        .await
    }

    /// Call the model, bounded by the connect timeout. `None` if the consumer
    /// left while waiting.
    async fn open_stream(
        &self,
        request: &LlmRequest,
        sink: &EventSink,
    ) -> AppResult<Option<ragline_llm::LlmStream>> {
        let timeout = self.config.delivery.model_timeout();
        tracing::debug!(provider = self.llm.provider_name(), model = %self.model, "Calling model");

        tokio::select! {
            biased;
            _ = sink.closed() => Ok(None),
            opened = tokio::time::timeout(timeout, self.llm.stream(request)) => {
                let stream = opened
                    .map_err(|_| {
                        AppError::ModelStream(format!("Model did not respond within {:?}", timeout))
                    })?
                    .map_err(into_model_stream_error)?;
                Ok(Some(stream))
            }
        }
    }

    fn replay(&self, text: &str) -> TextSource {
        let delivery = &self.config.delivery;
        replay(text, delivery.chunk_chars, delivery.pacing())
    }

    /// Pump `source` to the consumer and commit on completion.
    async fn deliver(
        &self,
        namespace: &str,
        question: &str,
        source: TextSource,
        sink: &EventSink,
        kind: AnswerKind,
    ) -> AppResult<Option<String>> {
        let answer = match pump(source, sink).await? {
            PumpOutcome::Completed(answer) => answer,
            PumpOutcome::Disconnected => return Ok(None),
        };

        match kind {
            AnswerKind::Greeting => {}
            AnswerKind::Cached => self.history.append(namespace, question, &answer),
            AnswerKind::Generated { cacheable } => {
                self.history.append(namespace, question, &answer);
                if cacheable && !answer.trim().is_empty() {
                    self.cache.put(namespace, question, &answer).await;
                }
            }
        }

        tracing::info!(chars = answer.chars().count(), ?kind, "Answer delivered");
        Ok(Some(answer))
    }
}
