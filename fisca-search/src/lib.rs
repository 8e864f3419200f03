//! # fisca-search
//!
//! Allow-listed search, heuristic ranking and content enrichment for Fisca.
//!
//! ## Design
//!
//! - Backends (SerpApi, Google Custom Search, DuckDuckGo HTML) are tried in
//!   configured order; the first one with usable hits wins
//! - Every hit is filtered through a trusted-domain [`AllowList`] before it
//!   becomes a [`CandidateDocument`]
//! - [`Ranker`] scores candidates with authority, family fit, recency,
//!   BM25F text relevance, a canonical-identifier bonus and a title penalty,
//!   then deduplicates by normalised URL and caps each family
//! - [`EnrichmentChain`] fetches full text with domain-aware selectors and
//!   falls back to a remote extraction service
//!
//! ## Concurrency
//!
//! Nothing here holds global or cross-run mutable state. Configuration,
//! the allow-list and the HTTP client are built once and shared read-only;
//! every outbound call carries its own time budget.

pub mod aggregator;
pub mod allowlist;
pub mod config;
pub mod content;
pub mod engine;
pub mod engines;
pub mod enrich;
pub mod error;
pub mod http;
pub mod ranking;
pub mod types;

pub use aggregator::{Aggregator, SearchOutcome, SkippedBackend};
pub use allowlist::AllowList;
pub use config::{EnrichConfig, RankingConfig, RemoteExtractorConfig, SearchConfig};
pub use engine::SearchBackend;
pub use enrich::{ContentExtractor, EnrichmentChain, Extraction};
pub use error::{Result, SearchError};
pub use ranking::Ranker;
pub use types::{
    BackendKind, CandidateDocument, EnrichedDocument, Family, PageContent, Provenance, RawHit,
    ScoredDocument, SearchQuery,
};

/// Fetch a page and extract its readable text with the generic selectors.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the page cannot be fetched, or
/// [`SearchError::Parse`] if it is a PDF or has no extractable text.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> fisca_search::Result<()> {
/// let client = fisca_search::http::build_client(&fisca_search::SearchConfig::default())?;
/// let page = fisca_search::fetch_page_content(&client, "https://www.legifrance.gouv.fr/").await?;
/// println!("{}: {} words", page.title, page.word_count);
/// # Ok(())
/// # }
/// ```
pub async fn fetch_page_content(client: &reqwest::Client, url: &str) -> Result<PageContent> {
    let page = http::fetch_page(
        client,
        url,
        std::time::Duration::from_secs(EnrichConfig::default().timeout_seconds),
        None,
    )
    .await?;
    if page.is_pdf() {
        return Err(SearchError::Parse("PDF documents are not extracted locally".into()));
    }
    content::extract_content(&page.body, url)
}
