//! Language-model collaborators.
//!
//! The orchestrator talks to the outside world through [`Collaborators`]:
//! classify, route, produce sources, generate queries, verify, generate
//! the answer. [`LlmCollaborators`] implements every role on top of one
//! [`LanguageModel`] and a [`Prompts`] set; tests substitute their own
//! implementation of the trait.

pub mod chat;
pub mod prompts;
pub mod sse;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use fisca_search::EnrichedDocument;
use futures_util::Stream;

use crate::brief::{Brief, QuerySpec, RoutingDecision};
use crate::config::ProducerSpec;
use crate::error::LlmError;
use crate::structured::{self, Shape};

pub use chat::ChatClient;
pub use prompts::Prompts;

/// A stream of generated text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// What a call is for; selects the model and appears in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Question classification.
    Classify,
    /// Producer routing.
    Route,
    /// Specialist source lookup.
    Specialist,
    /// Search query generation.
    QueryGenerator,
    /// Verification of merged sources.
    Verify,
    /// Answer generation.
    Generate,
}

impl Role {
    /// Stable snake_case name, as used in `[llm.models]`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Route => "route",
            Self::Specialist => "specialist",
            Self::QueryGenerator => "query_generator",
            Self::Verify => "verify",
            Self::Generate => "generate",
        }
    }
}

/// A single-turn chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Role of the call.
    pub role: Role,
    /// System prompt, already rendered.
    pub system: String,
    /// User message.
    pub user: String,
}

/// A text-completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Complete `request` and return the full text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// Complete `request` as a stream of chunks. The default implementation
    /// yields the full completion as one chunk.
    async fn stream(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(futures_util::stream::once(async move { Ok(text) })))
    }
}

/// Every external capability the orchestrator depends on.
#[async_trait]
pub trait Collaborators: Send + Sync {
    /// Turn the question into a brief.
    async fn classify(&self, question: &str) -> Result<Brief, LlmError>;

    /// Score the producers for this question.
    async fn route(
        &self,
        question: &str,
        brief: &Brief,
        producers: &[ProducerSpec],
    ) -> Result<RoutingDecision, LlmError>;

    /// Ask one specialist for source references.
    async fn produce(
        &self,
        producer: &ProducerSpec,
        question: &str,
        brief: &Brief,
    ) -> Result<QuerySpec, LlmError>;

    /// Generate search queries directly from the question.
    async fn generate_queries(&self, question: &str, brief: &Brief) -> Result<QuerySpec, LlmError>;

    /// Clean a merged source list. An empty spec means "keep the input".
    async fn verify(
        &self,
        question: &str,
        brief: &Brief,
        merged: &QuerySpec,
    ) -> Result<QuerySpec, LlmError>;

    /// Write the answer from the evidence, as a stream of raw text chunks.
    async fn generate(
        &self,
        question: &str,
        brief: &Brief,
        documents: &[EnrichedDocument],
        stream: bool,
    ) -> Result<TextStream, LlmError>;
}

/// [`Collaborators`] backed by a language model and prompt files.
pub struct LlmCollaborators {
    model: Arc<dyn LanguageModel>,
    prompts: Arc<Prompts>,
    allow_list: Vec<String>,
    max_producers: usize,
    excerpt_chars: usize,
}

impl LlmCollaborators {
    /// Create the collaborators.
    ///
    /// `allow_list` is shown to the query generator; `max_producers` to the
    /// router; `excerpt_chars` bounds each document's content in the
    /// generation prompt.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        prompts: Arc<Prompts>,
        allow_list: Vec<String>,
        max_producers: usize,
        excerpt_chars: usize,
    ) -> Self {
        Self {
            model,
            prompts,
            allow_list,
            max_producers,
            excerpt_chars,
        }
    }

    async fn ask(&self, role: Role, system: String, question: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            role,
            system,
            user: format!("Question : {question}"),
        };
        let started = std::time::Instant::now();
        let text = self.model.complete(&request).await?;
        tracing::debug!(
            role = role.name(),
            model = self.model.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "LLM call complete"
        );
        Ok(text)
    }

    async fn ask_for_queries(&self, role: Role, system: String, question: &str) -> Result<QuerySpec, LlmError> {
        let text = self.ask(role, system, question).await?;
        let value = structured::parse(&text, Shape::Any);
        Ok(QuerySpec::from_value(&value).unwrap_or(QuerySpec::Plain(Vec::new())))
    }
}

#[async_trait]
impl Collaborators for LlmCollaborators {
    async fn classify(&self, question: &str) -> Result<Brief, LlmError> {
        let text = self
            .ask(Role::Classify, self.prompts.classify.clone(), question)
            .await?;
        Ok(Brief::from_value(structured::parse_object(&text), question))
    }

    async fn route(
        &self,
        question: &str,
        brief: &Brief,
        producers: &[ProducerSpec],
    ) -> Result<RoutingDecision, LlmError> {
        let system = prompts::render(
            &self.prompts.route,
            &[
                ("producers", &prompts::producer_list(producers)),
                ("brief", &brief.to_prompt_json()),
                ("max_producers", &self.max_producers.to_string()),
                ("question", question),
            ],
        );
        let text = self.ask(Role::Route, system, question).await?;
        Ok(RoutingDecision::from_value(&structured::parse_object(&text)))
    }

    async fn produce(
        &self,
        producer: &ProducerSpec,
        question: &str,
        brief: &Brief,
    ) -> Result<QuerySpec, LlmError> {
        let system = prompts::render(
            self.prompts.specialist_for(&producer.name),
            &[
                ("producer", &producer.name),
                ("description", &producer.description),
                ("brief", &brief.to_prompt_json()),
                ("question", question),
            ],
        );
        self.ask_for_queries(Role::Specialist, system, question).await
    }

    async fn generate_queries(&self, question: &str, brief: &Brief) -> Result<QuerySpec, LlmError> {
        let system = prompts::render(
            &self.prompts.query_generator,
            &[
                ("domains", &self.allow_list.join(", ")),
                ("brief", &brief.to_prompt_json()),
                ("question", question),
            ],
        );
        self.ask_for_queries(Role::QueryGenerator, system, question).await
    }

    async fn verify(
        &self,
        question: &str,
        brief: &Brief,
        merged: &QuerySpec,
    ) -> Result<QuerySpec, LlmError> {
        let sources = serde_json::to_string_pretty(&merged.to_value()).unwrap_or_default();
        let system = prompts::render(
            &self.prompts.verify,
            &[
                ("sources", &sources),
                ("brief", &brief.to_prompt_json()),
                ("question", question),
            ],
        );
        self.ask_for_queries(Role::Verify, system, question).await
    }

    async fn generate(
        &self,
        question: &str,
        brief: &Brief,
        documents: &[EnrichedDocument],
        stream: bool,
    ) -> Result<TextStream, LlmError> {
        let system = prompts::render(
            &self.prompts.generate,
            &[
                ("documents", &prompts::documents_context(documents, self.excerpt_chars)),
                ("brief", &brief.to_prompt_json()),
                ("question", question),
            ],
        );
        let request = ChatRequest {
            role: Role::Generate,
            system,
            user: format!("Question : {question}"),
        };
        if stream {
            self.model.stream(&request).await
        } else {
            let text = self.model.complete(&request).await?;
            Ok(Box::pin(futures_util::stream::once(async move { Ok(text) })))
        }
    }
}
