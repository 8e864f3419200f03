//! Scatter-gather orchestrator.
//!
//! One run walks a fixed sequence of stages:
//!
//! ```text
//! classify -> route -> produce (parallel) -> verify/merge -> search
//!          -> dedupe -> rank -> threshold -> enrich -> generate
//! ```
//!
//! Each stage consumes only the previous stage's output. Routing to zero
//! producers short-circuits to [`RunOutcome::OutOfScope`]; an empty
//! evidence set after threshold relaxation ends in
//! [`RunOutcome::NoEvidence`]. Producer, backend and extraction failures
//! shrink the result instead of failing the run.

pub mod answer;
pub mod events;
pub mod gather;
pub mod threshold;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use fisca_search::ranking::dedup_exact_urls;
use fisca_search::{Aggregator, EnrichedDocument, EnrichmentChain, Family, Ranker};
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::brief::{dedupe_queries, Brief, QuerySpec};
use crate::config::{AppConfig, PipelineConfig};
use crate::error::{LlmError, PipelineError, Result};
use crate::llm::{ChatClient, Collaborators, LlmCollaborators, Prompts};
use crate::routing::Router;

use self::answer::{parse_answer, AnswerStream};

pub use events::{EventSink, PipelineEvent, Stage};
pub use threshold::{adaptive_filter, Filtered};

const QUERY_GENERATOR: &str = "query_generator";

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Forward generated text as [`PipelineEvent::Chunk`]s while it arrives.
    pub stream: bool,
    /// Progress events.
    pub events: EventSink,
    /// Aborts the run when cancelled.
    pub cancel: CancellationToken,
}

/// A document the answer was written from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub domain: String,
    pub family: Family,
    pub score: f64,
    /// Whether full text was extracted for it.
    pub has_content: bool,
}

impl From<&EnrichedDocument> for Source {
    fn from(doc: &EnrichedDocument) -> Self {
        let candidate = &doc.scored.document;
        Self {
            title: candidate.title.clone(),
            url: candidate.url.clone(),
            domain: candidate.domain.clone(),
            family: candidate.family,
            score: doc.scored.score,
            has_content: !doc.content.is_empty(),
        }
    }
}

/// A generated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Answer text (Markdown).
    pub text: String,
    /// Key points, when the model listed them.
    pub key_points: Vec<String>,
    /// Evidence handed to generation, best first.
    pub sources: Vec<Source>,
    /// Whether the low threshold had to be used.
    pub relaxed: bool,
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Answered(Answer),
    /// Routing selected no producer.
    OutOfScope { message: String },
    /// Nothing survived search, ranking and the relaxed threshold.
    NoEvidence { message: String },
}

type ProducerTask = Pin<Box<dyn Future<Output = std::result::Result<QuerySpec, LlmError>> + Send>>;

/// The orchestrator. Built once, shared read-only across runs.
pub struct Pipeline {
    collaborators: Arc<dyn Collaborators>,
    router: Router,
    aggregator: Arc<Aggregator>,
    ranker: Arc<Ranker>,
    enricher: Arc<EnrichmentChain>,
    config: PipelineConfig,
    max_results: usize,
    today: Option<NaiveDate>,
}

impl Pipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        collaborators: Arc<dyn Collaborators>,
        router: Router,
        aggregator: Arc<Aggregator>,
        ranker: Arc<Ranker>,
        enricher: Arc<EnrichmentChain>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            collaborators,
            router,
            aggregator,
            ranker,
            enricher,
            config,
            max_results: fisca_search::SearchConfig::default().max_results,
            today: None,
        }
    }

    /// Build every component from `config`, reading credentials from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] on an invalid config, a missing
    /// credential or an unreadable prompt file.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let client = fisca_search::http::build_client(&config.search)?;

        let aggregator = config.build_aggregator(&client, crate::config::env_var)?;
        let ranker = Ranker::new(config.ranking.clone())?;
        let enricher = EnrichmentChain::from_config(client.clone(), &config.enrichment)?;

        let model = ChatClient::from_config(client, &config.llm)?;
        let prompts = Prompts::load(&config.prompts, &config.routing.producers)?;
        let collaborators = LlmCollaborators::new(
            Arc::new(model),
            Arc::new(prompts),
            config.sources.allow_list.clone(),
            config.routing.max_producers,
            config.pipeline.excerpt_chars,
        );

        tracing::info!(
            backends = ?aggregator.backend_names(),
            producers = config.routing.producers.len(),
            model = %config.llm.model,
            "pipeline ready"
        );

        Ok(Self::new(
            Arc::new(collaborators),
            Router::new(config.routing.clone()),
            Arc::new(aggregator),
            Arc::new(ranker),
            Arc::new(enricher),
            config.pipeline.clone(),
        )
        .with_max_results(config.search.max_results))
    }

    /// Results requested per query from each backend.
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.max(1);
        self
    }

    /// Pin the reference date used by the recency signal.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Answer `question`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Classification`] if classification or routing fails
    /// - [`PipelineError::Generation`] if answer generation fails
    /// - [`PipelineError::Cancelled`] if `options.cancel` fires
    pub async fn run(&self, question: &str, options: RunOptions) -> Result<RunOutcome> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", run_id = %run_id);
        let started = std::time::Instant::now();

        let outcome = self.run_stages(question, &options).instrument(span.clone()).await;
        span.in_scope(|| match &outcome {
            Ok(RunOutcome::Answered(answer)) => tracing::info!(
                sources = answer.sources.len(),
                relaxed = answer.relaxed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "run answered"
            ),
            Ok(RunOutcome::OutOfScope { .. }) => tracing::info!("run out of scope"),
            Ok(RunOutcome::NoEvidence { .. }) => tracing::info!("run found no evidence"),
            Err(e) => tracing::warn!(error = %e, "run failed"),
        });
        options.events.emit(PipelineEvent::Finished);
        outcome
    }

    async fn run_stages(&self, question: &str, options: &RunOptions) -> Result<RunOutcome> {
        let cancel = &options.cancel;
        let events = &options.events;

        events.stage(Stage::Classify);
        let brief = until_cancelled(cancel, self.collaborators.classify(question))
            .await?
            .map_err(|e| PipelineError::Classification(e.to_string()))?;
        if brief.is_bare() {
            tracing::debug!("classification returned no structure; using the question");
        }

        events.stage(Stage::Route);
        let decision = until_cancelled(
            cancel,
            self.collaborators
                .route(question, &brief, self.router.producers()),
        )
        .await?
        .map_err(|e| PipelineError::Classification(e.to_string()))?;
        let selected = self.router.select(&decision);
        if selected.is_empty() {
            return Ok(RunOutcome::OutOfScope {
                message: self.config.out_of_scope_message.clone(),
            });
        }
        tracing::info!(
            producers = ?selected.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            "producers selected"
        );

        events.stage(Stage::Produce);
        let (specialist_specs, generated) = self
            .produce(question, &brief, selected, options)
            .await?;

        events.stage(Stage::Verify);
        let merged = QuerySpec::merge(&specialist_specs);
        let verified = self.verify(question, &brief, merged, cancel).await?;
        let mut queries = generated.map(|spec| spec.normalize()).unwrap_or_default();
        queries.extend(verified.normalize());
        let queries = dedupe_queries(queries, self.config.max_queries);
        if queries.is_empty() {
            tracing::info!("producers returned no usable query");
            return Ok(self.no_evidence());
        }
        tracing::debug!(queries = queries.len(), "queries ready");
        tracing::trace!(queries = ?queries, "query list");

        events.stage(Stage::Search);
        let outcomes = until_cancelled(
            cancel,
            self.aggregator.search_many(&queries, self.max_results),
        )
        .await?;
        let skipped: usize = outcomes.iter().map(|o| o.skipped.len()).sum();
        if skipped > 0 {
            events.emit(PipelineEvent::BackendSkipped { count: skipped });
        }
        let candidates = dedup_exact_urls(
            outcomes
                .into_iter()
                .flat_map(|outcome| outcome.documents)
                .collect(),
        );
        tracing::info!(candidates = candidates.len(), skipped, "search complete");

        events.stage(Stage::Rank);
        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let ranked = self.ranker.rank(question, &candidates, today);
        let Filtered { kept, relaxed } =
            adaptive_filter(ranked, self.config.t_high, self.config.t_low);
        let kept: Vec<_> = kept.into_iter().take(self.config.max_documents).collect();
        if kept.is_empty() {
            return Ok(self.no_evidence());
        }

        events.stage(Stage::Enrich);
        let documents = until_cancelled(cancel, self.enricher.enrich(kept)).await?;
        let with_content = documents.iter().filter(|d| !d.content.is_empty()).count();
        tracing::info!(
            documents = documents.len(),
            with_content,
            "enrichment complete"
        );

        events.stage(Stage::Generate);
        let text = self
            .generate(question, &brief, &documents, options)
            .await?;
        let (text, key_points) = parse_answer(&text)?;

        Ok(RunOutcome::Answered(Answer {
            text,
            key_points,
            sources: documents.iter().map(Source::from).collect(),
            relaxed,
        }))
    }

    /// Fan out to the selected specialists and the query generator.
    ///
    /// Returns the specialist outputs (in selection order) and the query
    /// generator's output, if it ran and succeeded.
    async fn produce(
        &self,
        question: &str,
        brief: &Brief,
        selected: Vec<crate::config::ProducerSpec>,
        options: &RunOptions,
    ) -> Result<(Vec<QuerySpec>, Option<QuerySpec>)> {
        let mut tasks: Vec<(String, ProducerTask)> = Vec::with_capacity(selected.len() + 1);
        for producer in selected {
            let collaborators = Arc::clone(&self.collaborators);
            let question = question.to_owned();
            let brief = brief.clone();
            let name = producer.name.clone();
            tasks.push((
                name,
                Box::pin(async move { collaborators.produce(&producer, &question, &brief).await }),
            ));
        }
        if self.config.query_generator {
            let collaborators = Arc::clone(&self.collaborators);
            let question = question.to_owned();
            let brief = brief.clone();
            tasks.push((
                QUERY_GENERATOR.to_owned(),
                Box::pin(async move { collaborators.generate_queries(&question, &brief).await }),
            ));
        }

        let timeout = Duration::from_secs(self.config.producer_timeout_seconds);
        let gathered = gather::gather(tasks, timeout, &options.cancel).await?;

        let mut specialists = Vec::new();
        let mut generated = None;
        for item in gathered {
            match item.result {
                Ok(spec) if item.name == QUERY_GENERATOR && self.config.query_generator => {
                    generated = Some(spec);
                }
                Ok(spec) => specialists.push(spec),
                Err(error) => {
                    tracing::warn!(producer = %item.name, error = %error, "producer contributed nothing");
                    options.events.emit(PipelineEvent::ProducerFailed {
                        producer: item.name,
                        error,
                    });
                }
            }
        }
        Ok((specialists, generated))
    }

    /// Let the verifier clean the merged specialist output. Its answer is
    /// used only when it holds at least one query.
    async fn verify(
        &self,
        question: &str,
        brief: &Brief,
        merged: QuerySpec,
        cancel: &CancellationToken,
    ) -> Result<QuerySpec> {
        if !self.config.verify || merged.is_empty() {
            return Ok(merged);
        }
        let verified = until_cancelled(
            cancel,
            self.collaborators.verify(question, brief, &merged),
        )
        .await?;
        Ok(match verified {
            Ok(spec) if !spec.normalize().is_empty() => spec,
            Ok(_) => {
                tracing::debug!("verifier returned nothing; keeping merged sources");
                merged
            }
            Err(e) => {
                tracing::warn!(error = %e, "verifier failed; keeping merged sources");
                merged
            }
        })
    }

    /// Run generation to completion, forwarding the decoded answer text when
    /// streaming.
    async fn generate(
        &self,
        question: &str,
        brief: &Brief,
        documents: &[EnrichedDocument],
        options: &RunOptions,
    ) -> Result<String> {
        let cancel = &options.cancel;
        let mut stream = until_cancelled(
            cancel,
            self.collaborators
                .generate(question, brief, documents, options.stream),
        )
        .await?
        .map_err(|e| PipelineError::Generation(e.to_string()))?;

        let mut text = String::new();
        let mut visible = AnswerStream::new();
        while let Some(chunk) = until_cancelled(cancel, stream.next()).await? {
            let chunk = chunk.map_err(|e| PipelineError::Generation(e.to_string()))?;
            if options.stream {
                let decoded = visible.push(&chunk);
                if !decoded.is_empty() {
                    options.events.emit(PipelineEvent::Chunk(decoded));
                }
            }
            text.push_str(&chunk);
        }
        Ok(text)
    }

    fn no_evidence(&self) -> RunOutcome {
        RunOutcome::NoEvidence {
            message: self.config.no_evidence_message.clone(),
        }
    }
}

/// Race `future` against `cancel`.
async fn until_cancelled<T>(cancel: &CancellationToken, future: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        value = future => Ok(value),
    }
}
