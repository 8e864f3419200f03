//! Trait definition for pluggable search backends.
//!
//! Each backend (SerpApi, Google Custom Search, DuckDuckGo) implements
//! [`SearchBackend`] so the aggregator can try them in configured order
//! without knowing how each one talks to its service.

use async_trait::async_trait;

use crate::error::SearchError;
use crate::types::{BackendKind, RawHit};

/// A pluggable web search backend.
///
/// Implementors handle their own request construction, authentication and
/// response parsing, and return hits in the backend's own order. They do
/// not filter by domain: allow-list enforcement is the aggregator's job.
///
/// Implementations must be `Send + Sync`; the aggregator holds them behind
/// `Arc<dyn SearchBackend>`.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Name used in logs and events.
    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Run `query` and return up to `max_results` raw hits.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the request fails, the service refuses it
    /// or the response cannot be parsed.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError>;
}
