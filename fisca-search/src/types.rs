//! Core document types and backend identification.
//!
//! A document moves through the pipeline as a [`CandidateDocument`]
//! (aggregator output), a [`ScoredDocument`] (ranking output) and finally an
//! [`EnrichedDocument`] (enrichment output). Each stage wraps the previous
//! value instead of mutating it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of source categories a query or document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Codes, statutes and their articles.
    Statute,
    /// Administrative doctrine and official guidance.
    Doctrine,
    /// Court decisions.
    CaseLaw,
    /// Parliamentary debates, reports and questions.
    LegislativeRecord,
    /// Commercial publishers.
    Commercial,
    /// Anything that could not be attributed to a family.
    Misc,
}

impl Family {
    /// Stable snake_case name, used in config tables and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Statute => "statute",
            Self::Doctrine => "doctrine",
            Self::CaseLaw => "case_law",
            Self::LegislativeRecord => "legislative_record",
            Self::Commercial => "commercial",
            Self::Misc => "misc",
        }
    }

    /// Map a free-form category label produced upstream onto the closed set.
    ///
    /// Matching ignores case, spaces, hyphens and a trailing plural `s`.
    /// Unknown labels map to [`Family::Misc`].
    pub fn from_label(label: &str) -> Self {
        let key: String = label
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        let key = key.strip_suffix('s').unwrap_or(&key);
        match key {
            "statute" | "law" | "legislation" | "code" | "legaltext" | "loi" | "texteslegaux" => {
                Self::Statute
            }
            "doctrine" | "guidance" | "administrativedoctrine" | "bofip" => Self::Doctrine,
            "caselaw" | "jurisprudence" | "court" | "decision" => Self::CaseLaw,
            "legislativerecord" | "parliamentary" | "parliament" | "preparatorywork"
            | "travauxparlementaire" => Self::LegislativeRecord,
            "commercial" | "publisher" | "fiscalonline" => Self::Commercial,
            _ => Self::Misc,
        }
    }

    /// Returns all variants.
    pub fn all() -> &'static [Family] {
        &[
            Self::Statute,
            Self::Doctrine,
            Self::CaseLaw,
            Self::LegislativeRecord,
            Self::Commercial,
            Self::Misc,
        ]
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Search backends the aggregator knows how to build from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Paid SERP API (Google results, JSON).
    SerpApi,
    /// Google Custom Search JSON API.
    GoogleCse,
    /// DuckDuckGo HTML endpoints, scraped.
    DuckDuckGo,
}

impl BackendKind {
    /// Human-readable backend name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SerpApi => "SerpApi",
            Self::GoogleCse => "GoogleCse",
            Self::DuckDuckGo => "DuckDuckGo",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A query ready to be sent to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Category the query targets.
    pub family: Family,
    /// Query text, already cleaned.
    pub text: String,
}

impl SearchQuery {
    /// Build a query, stripping a trailing ` — description` annotation and
    /// surrounding whitespace. Returns `None` when nothing usable remains.
    pub fn new(family: Family, raw: &str) -> Option<Self> {
        let text = raw.split(" — ").next().unwrap_or_default().trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            family,
            text: text.to_owned(),
        })
    }
}

/// One raw hit as returned by a backend, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    /// Result title.
    pub title: String,
    /// Result URL.
    pub url: String,
    /// Result snippet.
    pub snippet: String,
    /// Publication date string, when the backend exposes one.
    pub date: Option<String>,
}

/// A normalised, allow-listed search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDocument {
    /// Source URL.
    pub url: String,
    /// Result title.
    pub title: String,
    /// Result snippet.
    pub snippet: String,
    /// Lower-cased host the URL points at (without `www.`).
    pub domain: String,
    /// Family of the query that produced this document.
    pub family: Family,
    /// Query text that produced this document.
    pub query: String,
    /// Explicit publication date, when the backend provided a parseable one.
    pub date: Option<NaiveDate>,
}

/// A candidate annotated by the ranking engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// The underlying candidate.
    #[serde(flatten)]
    pub document: CandidateDocument,
    /// Relevance score (higher is better).
    pub score: f64,
    /// Whether the ranking engine considers the document worth keeping.
    pub retained: bool,
}

/// Which extractor produced the content of an [`EnrichedDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// A domain-specific site profile of the primary extractor.
    Site {
        /// Profile name.
        profile: String,
    },
    /// The generic fallback of the primary extractor.
    Generic,
    /// The remote extraction service.
    Remote,
    /// Every extractor failed; content is empty.
    None,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Site { profile } => write!(f, "site:{profile}"),
            Self::Generic => f.write_str("generic"),
            Self::Remote => f.write_str("remote"),
            Self::None => f.write_str("none"),
        }
    }
}

/// A scored document with its full text attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDocument {
    /// The scored document.
    #[serde(flatten)]
    pub scored: ScoredDocument,
    /// Extracted text, empty when extraction failed.
    pub content: String,
    /// Which extractor produced `content`.
    pub provenance: Provenance,
}

/// Extracted readable content from a fetched web page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    /// The URL that was fetched.
    pub url: String,
    /// The page title extracted from HTML.
    pub title: String,
    /// Cleaned, readable text content with HTML boilerplate stripped.
    pub text: String,
    /// Number of words in the extracted text.
    pub word_count: usize,
}
