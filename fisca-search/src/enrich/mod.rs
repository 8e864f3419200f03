//! Content enrichment: full text for ranked documents.
//!
//! Each document goes through a primary extractor and, when that yields
//! nothing usable, a fallback extractor. Documents are processed with
//! bounded parallelism and output order matches input order. A document is
//! never dropped: total failure leaves its content empty.

pub mod remote;
pub mod sanitize;
pub mod site;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::config::EnrichConfig;
use crate::error::SearchError;
use crate::types::{EnrichedDocument, Provenance, ScoredDocument};

pub use remote::RemoteExtractor;
pub use sanitize::sanitize_url;
pub use site::{SiteExtractor, SiteProfile};

/// Text produced by one extractor for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Extracted text, possibly empty.
    pub text: String,
    /// The page only renders with client-side scripts; `text` is not trustworthy.
    pub requires_script: bool,
    /// Which extractor (and profile) produced `text`.
    pub provenance: Provenance,
}

impl Extraction {
    /// Whether the text can be used as-is.
    pub fn is_usable(&self) -> bool {
        !self.requires_script && !self.text.trim().is_empty()
    }
}

/// A source of page text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Extract the readable text of `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the page cannot be fetched or parsed.
    async fn extract(&self, url: &str) -> Result<Extraction, SearchError>;
}

/// Primary extractor with an optional fallback, run over document batches.
pub struct EnrichmentChain {
    primary: Arc<dyn ContentExtractor>,
    fallback: Option<Arc<dyn ContentExtractor>>,
    max_concurrency: usize,
    primary_timeout: Duration,
    fallback_timeout: Duration,
}

impl EnrichmentChain {
    /// Create a chain with default concurrency (4) and time budgets.
    pub fn new(
        primary: Arc<dyn ContentExtractor>,
        fallback: Option<Arc<dyn ContentExtractor>>,
    ) -> Self {
        let defaults = EnrichConfig::default();
        Self {
            primary,
            fallback,
            max_concurrency: defaults.max_concurrency,
            primary_timeout: Duration::from_secs(defaults.timeout_seconds),
            fallback_timeout: Duration::from_secs(
                defaults
                    .remote
                    .map_or(defaults.timeout_seconds, |r| r.timeout_seconds),
            ),
        }
    }

    /// Build the site extractor and, if configured, the remote fallback.
    ///
    /// The remote bearer token is read from the environment variable the
    /// config names; a missing variable means unauthenticated access.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `config` is invalid.
    pub fn from_config(client: reqwest::Client, config: &EnrichConfig) -> Result<Self, SearchError> {
        config.validate()?;

        let primary_timeout = Duration::from_secs(config.timeout_seconds);
        let primary: Arc<dyn ContentExtractor> = Arc::new(SiteExtractor::new(
            client.clone(),
            config.site_profiles.clone(),
            config.max_chars,
            primary_timeout,
        ));

        let mut fallback_timeout = primary_timeout;
        let fallback = config.remote.as_ref().map(|remote| {
            let api_key = remote
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.trim().is_empty());
            fallback_timeout = Duration::from_secs(remote.timeout_seconds);
            Arc::new(RemoteExtractor::new(
                client.clone(),
                remote.base_url.clone(),
                api_key,
                config.max_chars,
                fallback_timeout,
            )) as Arc<dyn ContentExtractor>
        });

        Ok(Self {
            primary,
            fallback,
            max_concurrency: config.max_concurrency,
            primary_timeout,
            fallback_timeout,
        })
    }

    /// Cap on concurrent extractions (at least 1).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Per-extractor time budgets.
    pub fn with_timeouts(mut self, primary: Duration, fallback: Duration) -> Self {
        self.primary_timeout = primary;
        self.fallback_timeout = fallback;
        self
    }

    /// Enrich every document, preserving input order.
    pub async fn enrich(&self, documents: Vec<ScoredDocument>) -> Vec<EnrichedDocument> {
        if documents.is_empty() {
            return Vec::new();
        }
        let workers = documents.len().min(self.max_concurrency);
        tracing::debug!(documents = documents.len(), workers, "enriching documents");

        stream::iter(documents)
            .map(|doc| self.enrich_one(doc))
            .buffered(workers)
            .collect()
            .await
    }

    /// Enrich one document.
    pub async fn enrich_one(&self, scored: ScoredDocument) -> EnrichedDocument {
        let url = scored.document.url.clone();

        let primary = run_bounded(self.primary.as_ref(), &url, self.primary_timeout).await;
        if let Some(extraction) = primary.as_ref().filter(|e| e.is_usable()) {
            return EnrichedDocument {
                scored,
                content: extraction.text.clone(),
                provenance: extraction.provenance.clone(),
            };
        }

        if let Some(fallback) = &self.fallback {
            tracing::debug!(url = %url, extractor = fallback.name(), "falling back");
            if let Some(extraction) = run_bounded(fallback.as_ref(), &url, self.fallback_timeout)
                .await
                .filter(Extraction::is_usable)
            {
                return EnrichedDocument {
                    scored,
                    content: extraction.text,
                    provenance: extraction.provenance,
                };
            }
        }

        tracing::warn!(url = %url, "no content extracted");
        EnrichedDocument {
            scored,
            content: String::new(),
            provenance: Provenance::None,
        }
    }
}

/// Run one extractor under `timeout`, logging and swallowing failures.
async fn run_bounded(
    extractor: &dyn ContentExtractor,
    url: &str,
    timeout: Duration,
) -> Option<Extraction> {
    match tokio::time::timeout(timeout, extractor.extract(url)).await {
        Ok(Ok(extraction)) => Some(extraction),
        Ok(Err(e)) => {
            tracing::warn!(extractor = extractor.name(), url, error = %e, "extraction failed");
            None
        }
        Err(_) => {
            tracing::warn!(extractor = extractor.name(), url, "extraction timed out");
            None
        }
    }
}
