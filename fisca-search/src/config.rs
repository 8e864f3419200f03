//! Search, ranking and enrichment configuration with sensible defaults.
//!
//! Every struct deserialises from a partial TOML table (missing fields take
//! their defaults) and has a `validate()` that rejects values the pipeline
//! cannot run with. Configuration is loaded once and never mutated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enrich::site::SiteProfile;
use crate::error::SearchError;
use crate::types::Family;

/// Behaviour of the search aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result-count hint sent to backends; the normalised list is truncated to it.
    pub max_results: usize,
    /// Per-backend time budget in seconds.
    pub timeout_seconds: u64,
    /// Drop hits whose title or URL advertises a PDF.
    pub exclude_pdf: bool,
    /// Interface language hint (`hl`).
    pub language: String,
    /// Country hint (`gl`).
    pub country: String,
    /// Custom User-Agent string. If `None`, rotates through a built-in list.
    pub user_agent: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 4,
            timeout_seconds: 10,
            exclude_pdf: true,
            language: "fr".into(),
            country: "fr".into(),
            user_agent: None,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_results == 0 {
            return Err(SearchError::Config(
                "max_results must be greater than 0".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Weights of the ranking signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight of the normalised domain authority.
    pub authority: f64,
    /// Weight of the normalised family fit.
    pub family: f64,
    /// Weight of the recency bonus.
    pub recency: f64,
    /// Weight of the normalised BM25F text relevance.
    pub relevance: f64,
    /// Flat bonus when a canonical identifier is present.
    pub canonical_bonus: f64,
    /// Flat penalty for titles shorter than `RankingConfig::min_title_chars`.
    pub short_title_penalty: f64,
    /// Flat penalty for titles containing a non-content phrase.
    pub generic_title_penalty: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            authority: 0.10,
            family: 0.10,
            recency: 0.30,
            relevance: 0.40,
            canonical_bonus: 0.08,
            short_title_penalty: 0.03,
            generic_title_penalty: 0.05,
        }
    }
}

/// BM25F parameters for short title/snippet texts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalisation.
    pub b: f64,
    /// Assumed average document length in tokens.
    pub avg_doc_len: f64,
    /// Field weight of the title.
    pub title_weight: f64,
    /// Field weight of the snippet.
    pub snippet_weight: f64,
    /// Raw BM25F value mapped to a relevance of 1.0.
    pub ceiling: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            avg_doc_len: 50.0,
            title_weight: 2.0,
            snippet_weight: 1.0,
            ceiling: 3.0,
        }
    }
}

/// Recency bonus shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyParams {
    /// Bonus for a document dated today.
    pub max_bonus: f64,
    /// Age in years at which the bonus reaches zero.
    pub horizon_years: f64,
}

impl Default for RecencyParams {
    fn default() -> Self {
        Self {
            max_bonus: 0.2,
            horizon_years: 10.0,
        }
    }
}

/// Configuration of the relevance and ranking engine.
///
/// Tables are keyed by plain strings so they read naturally in TOML:
/// `authority` by allow-list entry, `family_weights`, `intent_patterns`
/// and `family_caps` by family name (`statute`, `case_law`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Signal weights.
    pub weights: ScoreWeights,
    /// Per-domain trust weight.
    pub authority: BTreeMap<String, f64>,
    /// `(min, max)` range of authority weights; unknown domains get the midpoint.
    pub authority_range: (f64, f64),
    /// Per-family weight.
    pub family_weights: BTreeMap<String, f64>,
    /// `(min, max)` range of family weights; unknown families get the midpoint.
    pub family_range: (f64, f64),
    /// Case-insensitive regexes that mark a query as well-targeted for a family.
    pub intent_patterns: BTreeMap<String, Vec<String>>,
    /// Boost added to the family fit when an intent pattern matches.
    pub intent_boost: f64,
    /// Case-insensitive regexes recognising canonical document identifiers.
    pub canonical_patterns: Vec<String>,
    /// Lower-case phrases that mark a title as non-content.
    pub generic_phrases: Vec<String>,
    /// Titles shorter than this many characters are penalised.
    pub min_title_chars: usize,
    /// Maximum documents kept per family, by family name.
    pub family_caps: BTreeMap<String, usize>,
    /// Cap for families without an explicit entry.
    pub default_family_cap: usize,
    /// BM25F parameters.
    pub bm25: Bm25Params,
    /// Recency bonus shape.
    pub recency: RecencyParams,
}

impl Default for RankingConfig {
    fn default() -> Self {
        let authority = [
            "legifrance.gouv.fr",
            "bofip.impots.gouv.fr",
            "conseil-etat.fr",
            "courdecassation.fr",
            "conseil-constitutionnel.fr",
            "assemblee-nationale.fr",
            "senat.fr",
            "vie-publique.fr",
        ]
        .into_iter()
        .map(|d| (d.to_owned(), 1.0))
        .chain([("fiscalonline.com".to_owned(), 0.9)])
        .collect();

        let family_weights = [
            (Family::Statute, 1.0),
            (Family::Doctrine, 0.95),
            (Family::CaseLaw, 0.90),
            (Family::LegislativeRecord, 0.80),
            (Family::Commercial, 0.80),
        ]
        .into_iter()
        .map(|(f, w)| (f.name().to_owned(), w))
        .collect();

        let intent_patterns = [
            (
                Family::Statute,
                vec![
                    r"\b150-0\s?[a-z]\b".to_owned(),
                    r"\bcode g[ée]n[ée]ral des imp[ôo]ts\b".to_owned(),
                    r"\bcgi\b".to_owned(),
                ],
            ),
            (
                Family::Doctrine,
                vec![r"\bboi-[a-z0-9\-]+".to_owned(), r"\bbofip\b".to_owned()],
            ),
            (
                Family::CaseLaw,
                vec![r"\b(ecli|cass|conseil d['’][ée]tat|ce|caa)\b".to_owned()],
            ),
        ]
        .into_iter()
        .map(|(f, p)| (f.name().to_owned(), p))
        .collect();

        Self {
            weights: ScoreWeights::default(),
            authority,
            authority_range: (0.70, 1.0),
            family_weights,
            family_range: (0.70, 1.0),
            intent_patterns,
            intent_boost: 0.10,
            canonical_patterns: vec![
                r"\bLEGIARTI\d+\b".into(),
                r"\bBOI-[A-Z0-9\-]+".into(),
                r"\b150-0\s?[A-Z]\b".into(),
                r"\bECLI:[A-Z]{2}:\w+:\d{4}:\w+\b".into(),
                r"\b(n°|no|nº)\s?\d{2,}\b".into(),
            ],
            generic_phrases: [
                "accueil",
                "home",
                "plan du site",
                "sitemap",
                "mentions légales",
                "cookies",
                "erreur",
                "error",
                "not found",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            min_title_chars: 10,
            family_caps: BTreeMap::new(),
            default_family_cap: 4,
            bm25: Bm25Params::default(),
            recency: RecencyParams::default(),
        }
    }
}

impl RankingConfig {
    /// Validates ranges, caps and BM25 parameters.
    ///
    /// Regex patterns are checked when the ranker compiles them.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.authority_range.0 >= self.authority_range.1 {
            return Err(SearchError::Config(
                "authority_range min must be < max".into(),
            ));
        }
        if self.family_range.0 >= self.family_range.1 {
            return Err(SearchError::Config("family_range min must be < max".into()));
        }
        if self.default_family_cap == 0 || self.family_caps.values().any(|&c| c == 0) {
            return Err(SearchError::Config(
                "family caps must be greater than 0".into(),
            ));
        }
        if self.bm25.ceiling <= 0.0 || self.bm25.avg_doc_len <= 0.0 {
            return Err(SearchError::Config(
                "bm25 ceiling and avg_doc_len must be positive".into(),
            ));
        }
        if self.recency.horizon_years <= 0.0 {
            return Err(SearchError::Config(
                "recency horizon_years must be positive".into(),
            ));
        }
        let positive_sum = self.weights.authority
            + self.weights.family
            + self.weights.recency
            + self.weights.relevance;
        if positive_sum > 1.0 + f64::EPSILON {
            return Err(SearchError::Config(
                "ranking signal weights must sum to at most 1.0".into(),
            ));
        }
        Ok(())
    }

    /// The cap that applies to `family`.
    pub fn cap_for(&self, family: Family) -> usize {
        self.family_caps
            .get(family.name())
            .copied()
            .unwrap_or(self.default_family_cap)
    }
}

/// Settings of the remote extraction service used as enrichment fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteExtractorConfig {
    /// Service prefix; the sanitised page URL is appended to it.
    pub base_url: String,
    /// Environment variable holding an optional bearer token.
    pub api_key_env: Option<String>,
    /// Time budget in seconds (the remote service renders scripts, so it is slower).
    pub timeout_seconds: u64,
}

impl Default for RemoteExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://r.jina.ai/".into(),
            api_key_env: Some("JINA_API_KEY".into()),
            timeout_seconds: 45,
        }
    }
}

/// Configuration of the content enrichment chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Upper bound on concurrent extractions.
    pub max_concurrency: usize,
    /// Time budget in seconds for one primary extraction.
    pub timeout_seconds: u64,
    /// Maximum characters of text kept per document.
    pub max_chars: usize,
    /// Domain-specific extraction profiles, tried before the generic extractor.
    pub site_profiles: Vec<SiteProfile>,
    /// Remote fallback extractor; `None` disables the fallback.
    pub remote: Option<RemoteExtractorConfig>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            timeout_seconds: 20,
            max_chars: crate::content::DEFAULT_MAX_CHARS,
            site_profiles: SiteProfile::builtin(),
            remote: Some(RemoteExtractorConfig::default()),
        }
    }
}

impl EnrichConfig {
    /// Validates concurrency, timeouts and profiles.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_concurrency == 0 {
            return Err(SearchError::Config(
                "max_concurrency must be greater than 0".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(SearchError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.max_chars == 0 {
            return Err(SearchError::Config("max_chars must be greater than 0".into()));
        }
        if let Some(remote) = &self.remote {
            if remote.timeout_seconds == 0 {
                return Err(SearchError::Config(
                    "remote timeout_seconds must be greater than 0".into(),
                ));
            }
            if url::Url::parse(&remote.base_url).is_err() {
                return Err(SearchError::Config(format!(
                    "remote base_url is not a valid URL: {}",
                    remote.base_url
                )));
            }
        }
        for profile in &self.site_profiles {
            if profile.domains.is_empty() || profile.selectors.is_empty() {
                return Err(SearchError::Config(format!(
                    "site profile '{}' needs at least one domain and one selector",
                    profile.name
                )));
            }
        }
        Ok(())
    }
}
