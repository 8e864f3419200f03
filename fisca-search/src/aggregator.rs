//! Ordered-fallback search aggregator.
//!
//! Backends are tried strictly in configured order. The first backend whose
//! hits survive normalisation and the allow-list wins; results are never
//! merged across backends for one query. A backend that errors or exceeds
//! its time budget is logged and skipped, never retried here.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::allowlist::{host_of, AllowList};
use crate::config::SearchConfig;
use crate::engine::SearchBackend;
use crate::ranking::recency::parse_explicit_date;
use crate::types::{CandidateDocument, RawHit, SearchQuery};

/// Queries run concurrently by [`Aggregator::search_many`].
const MAX_PARALLEL_QUERIES: usize = 8;

/// A backend that was tried and did not produce usable results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBackend {
    /// Backend name.
    pub backend: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of one aggregated query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    /// Allow-listed documents, in backend order.
    pub documents: Vec<CandidateDocument>,
    /// Name of the backend that produced `documents`.
    pub backend: Option<String>,
    /// Backends tried before (or instead of) the winner.
    pub skipped: Vec<SkippedBackend>,
}

/// Sends queries to an ordered list of backends.
pub struct Aggregator {
    backends: Vec<Arc<dyn SearchBackend>>,
    allow_list: Arc<AllowList>,
    config: SearchConfig,
    timeout: Duration,
}

impl Aggregator {
    /// Create an aggregator over `backends`, tried in the given order.
    pub fn new(
        backends: Vec<Arc<dyn SearchBackend>>,
        allow_list: Arc<AllowList>,
        config: SearchConfig,
    ) -> Self {
        let timeout = Duration::from_secs(config.timeout_seconds);
        Self {
            backends,
            allow_list,
            config,
            timeout,
        }
    }

    /// Override the per-backend time budget taken from the config.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Names of the configured backends, in order.
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// The allow-list every result is filtered through.
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Run `query`, returning at most `max_results` allow-listed documents.
    pub async fn search(&self, query: &SearchQuery, max_results: usize) -> Vec<CandidateDocument> {
        self.search_detailed(query, max_results).await.documents
    }

    /// Like [`search`](Self::search), also reporting which backends were skipped.
    pub async fn search_detailed(&self, query: &SearchQuery, max_results: usize) -> SearchOutcome {
        let budget = self.timeout;
        let mut outcome = SearchOutcome::default();
        tracing::trace!(query = %query.text, family = %query.family, "aggregated search");

        for backend in &self.backends {
            let name = backend.name().to_owned();
            let reason = match tokio::time::timeout(budget, backend.search(&query.text, max_results)).await {
                Ok(Ok(hits)) => {
                    let raw_count = hits.len();
                    let documents = self.normalize(hits, query, max_results);
                    if !documents.is_empty() {
                        tracing::debug!(
                            backend = %name,
                            raw = raw_count,
                            kept = documents.len(),
                            "backend returned usable results"
                        );
                        outcome.documents = documents;
                        outcome.backend = Some(name);
                        return outcome;
                    }
                    format!("no usable results ({raw_count} raw hits)")
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {budget:?}"),
            };
            tracing::warn!(backend = %name, reason = %reason, "backend skipped");
            outcome.skipped.push(SkippedBackend {
                backend: name,
                reason,
            });
        }

        tracing::debug!(family = %query.family, "no backend returned usable results");
        outcome
    }

    /// Run several queries concurrently, keeping query order in the output.
    pub async fn search_many(&self, queries: &[SearchQuery], max_results: usize) -> Vec<SearchOutcome> {
        let workers = queries.len().clamp(1, MAX_PARALLEL_QUERIES);
        stream::iter(queries)
            .map(|q| self.search_detailed(q, max_results))
            .buffered(workers)
            .collect()
            .await
    }

    /// Normalise raw hits into allow-listed candidates.
    ///
    /// Hits without a parseable HTTP(S) host, outside the allow-list, or
    /// advertising a PDF (when `exclude_pdf` is set) are dropped. The rest
    /// keep backend order and are truncated to `max_results`.
    pub fn normalize(&self, hits: Vec<RawHit>, query: &SearchQuery, max_results: usize) -> Vec<CandidateDocument> {
        hits.into_iter()
            .filter_map(|hit| {
                let url = hit.url.trim().to_owned();
                let domain = host_of(&url)?;
                if self.allow_list.entry_for_host(&domain).is_none() {
                    tracing::trace!(domain = %domain, "dropping non-allow-listed hit");
                    return None;
                }
                if self.config.exclude_pdf && looks_like_pdf(&hit.title, &url) {
                    return None;
                }
                Some(CandidateDocument {
                    title: hit.title.trim().to_owned(),
                    snippet: hit.snippet.trim().to_owned(),
                    date: hit.date.as_deref().and_then(parse_explicit_date),
                    url,
                    domain,
                    family: query.family,
                    query: query.text.clone(),
                })
            })
            .take(max_results)
            .collect()
    }
}

fn looks_like_pdf(title: &str, url: &str) -> bool {
    if title.to_lowercase().contains("pdf") {
        return true;
    }
    url::Url::parse(url)
        .map(|u| u.path().to_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}
