//! Relevance and ranking engine.
//!
//! Scores candidates with a weighted sum of independent signals, collapses
//! duplicates by normalised URL, sorts by score and caps each family. The
//! [`Ranker`] is built once from configuration and then used read-only:
//! ranking is a pure function of the candidates and the reference date.
//!
//! ```text
//! score = w_auth·authority + w_fam·family_fit + w_rec·recency
//!       + w_rel·min(1, bm25f / ceiling)
//!       + canonical_bonus − title_penalty
//! ```

pub mod bm25;
pub mod dedup;
pub mod recency;
pub mod signals;
pub mod url_normalize;

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::RankingConfig;
use crate::error::SearchError;
use crate::types::{CandidateDocument, Family, ScoredDocument};

pub use dedup::{dedup_exact_urls, deduplicate};
use recency::DateExtractor;
use signals::Signals;
use url_normalize::dedup_key;

/// Per-signal breakdown of one document's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Normalised domain authority.
    pub authority: f64,
    /// Normalised family fit, intent boost included.
    pub family_fit: f64,
    /// Recency bonus.
    pub recency: f64,
    /// Normalised BM25F relevance.
    pub relevance: f64,
    /// Canonical-identifier bonus applied.
    pub canonical: f64,
    /// Title penalty applied.
    pub penalty: f64,
    /// Whether the title looks like a non-content page.
    pub generic_title: bool,
}

impl ScoreBreakdown {
    /// Weighted total, rounded to four decimals.
    pub fn total(&self, config: &RankingConfig) -> f64 {
        let w = &config.weights;
        let raw = w.authority * self.authority
            + w.family * self.family_fit
            + w.recency * self.recency
            + w.relevance * self.relevance
            + self.canonical
            - self.penalty;
        (raw * 10_000.0).round() / 10_000.0
    }
}

/// Compiled ranking engine.
#[derive(Debug, Clone)]
pub struct Ranker {
    config: RankingConfig,
    signals: Signals,
    dates: DateExtractor,
}

impl Ranker {
    /// Validate `config` and compile its tables.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for invalid weights, caps, family
    /// names or regex patterns.
    pub fn new(config: RankingConfig) -> Result<Self, SearchError> {
        config.validate()?;
        let signals = Signals::new(&config)?;
        let dates = DateExtractor::new()
            .map_err(|e| SearchError::Config(format!("date patterns: {e}")))?;
        Ok(Self {
            config,
            signals,
            dates,
        })
    }

    /// The configuration this ranker was built from.
    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Compute the signal breakdown of one document.
    ///
    /// Text relevance and family intent use the query that produced the
    /// document, or `fallback_query` when it has none.
    pub fn breakdown(
        &self,
        doc: &CandidateDocument,
        fallback_query: &str,
        today: NaiveDate,
    ) -> ScoreBreakdown {
        let query = if doc.query.trim().is_empty() {
            fallback_query
        } else {
            doc.query.as_str()
        };
        let w = &self.config.weights;
        let raw_bm25 = bm25::bm25f(query, &doc.title, &doc.snippet, &self.config.bm25);
        let penalty =
            self.signals
                .title_penalty(&doc.title, w.short_title_penalty, w.generic_title_penalty);

        ScoreBreakdown {
            authority: self.signals.authority(&doc.domain),
            family_fit: self.signals.family_fit(doc.family, query),
            recency: recency::recency_bonus(self.dates.extract(doc), today, &self.config.recency),
            relevance: bm25::normalized(raw_bm25, &self.config.bm25),
            canonical: if self.signals.has_canonical_id(&doc.title, &doc.snippet, &doc.url) {
                w.canonical_bonus
            } else {
                0.0
            },
            penalty: penalty.amount,
            generic_title: penalty.generic,
        }
    }

    /// Score one document without deduplicating or capping.
    pub fn score(&self, doc: &CandidateDocument, fallback_query: &str, today: NaiveDate) -> ScoredDocument {
        let breakdown = self.breakdown(doc, fallback_query, today);
        ScoredDocument {
            document: doc.clone(),
            score: breakdown.total(&self.config),
            retained: !breakdown.generic_title,
        }
    }

    /// Score, deduplicate, sort and cap `candidates`.
    ///
    /// `query` is the user question, used for documents that carry no
    /// originating query of their own. `today` anchors the recency signal.
    pub fn rank(
        &self,
        query: &str,
        candidates: &[CandidateDocument],
        today: NaiveDate,
    ) -> Vec<ScoredDocument> {
        let scored: Vec<ScoredDocument> = candidates
            .iter()
            .map(|doc| self.score(doc, query, today))
            .collect();
        let ranked = self.finalize(scored);
        tracing::debug!(
            candidates = candidates.len(),
            ranked = ranked.len(),
            "ranking complete"
        );
        ranked
    }

    /// Deduplicate, sort descending and apply per-family caps.
    pub fn finalize(&self, scored: Vec<ScoredDocument>) -> Vec<ScoredDocument> {
        let mut docs = deduplicate(scored);
        sort_by_score(&mut docs);

        let mut per_family: HashMap<Family, usize> = HashMap::new();
        docs.retain(|doc| {
            let count = per_family.entry(doc.document.family).or_insert(0);
            if *count >= self.config.cap_for(doc.document.family) {
                return false;
            }
            *count += 1;
            true
        });
        docs
    }
}

/// Sort descending by score; ties are broken by URL key so the order never
/// depends on input order.
pub fn sort_by_score(docs: &mut [ScoredDocument]) {
    docs.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| dedup_key(&a.document.url).cmp(&dedup_key(&b.document.url)))
    });
}
