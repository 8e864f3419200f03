//! Primary, domain-aware extractor.
//!
//! Fetches the page directly and locates the main content with the CSS
//! selectors of the site profile matching the URL's host, falling back to
//! the generic selector chain for unknown sites or when the profile finds
//! nothing.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::allowlist::{host_matches, host_of};
use crate::content::{self, GENERIC_SELECTORS};
use crate::error::SearchError;
use crate::http;
use crate::types::Provenance;

use super::{ContentExtractor, Extraction};

/// Pages whose raw HTML shows a script banner are only trusted when their
/// extracted text has at least this many words.
const MIN_WORDS_WITH_BANNER: usize = 80;

/// CSS selectors locating the main content on a family of sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Profile name, reported in [`Provenance::Site`].
    pub name: String,
    /// Domains (and their subdomains) the profile applies to.
    pub domains: Vec<String>,
    /// Content selectors, tried in order.
    pub selectors: Vec<String>,
}

impl SiteProfile {
    fn new(name: &str, domains: &[&str], selectors: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            domains: domains.iter().map(|d| (*d).to_owned()).collect(),
            selectors: selectors.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Profiles for the French public legal and tax portals.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::new(
                "statute",
                &["legifrance.gouv.fr"],
                &["div.texte", "div.contenu", "article", "main"],
            ),
            Self::new(
                "doctrine",
                &["bofip.impots.gouv.fr", "fiscalonline.com"],
                &[
                    "article.bofip-content",
                    "div.bofip-content",
                    "div.field--name-body",
                    "div.contenu",
                    "#contenu",
                    "article",
                ],
            ),
            Self::new(
                "courts",
                &[
                    "conseil-etat.fr",
                    "courdecassation.fr",
                    "conseil-constitutionnel.fr",
                ],
                &[
                    "div.decision",
                    "div.contenu",
                    "div[class*=\"contenu\"]",
                    "div[class*=\"texte\"]",
                    "article",
                    "main",
                ],
            ),
            Self::new(
                "parliament",
                &["assemblee-nationale.fr", "senat.fr"],
                &["div.contenu", "div.texte", "article", "main"],
            ),
            Self::new(
                "eu_courts",
                &["curia.europa.eu", "eur-lex.europa.eu"],
                &[
                    "div#document_content",
                    "div.doc-content",
                    "div.content",
                    "article",
                    "main",
                ],
            ),
        ]
    }

    /// Whether this profile covers `host`.
    pub fn matches(&self, host: &str) -> bool {
        self.domains
            .iter()
            .any(|d| host_matches(host, d.trim().to_lowercase().as_str()))
    }
}

/// Direct-fetch extractor with per-site selector profiles.
pub struct SiteExtractor {
    client: reqwest::Client,
    profiles: Vec<SiteProfile>,
    max_chars: usize,
    timeout: Duration,
}

impl SiteExtractor {
    /// Create an extractor using `profiles`.
    pub fn new(
        client: reqwest::Client,
        profiles: Vec<SiteProfile>,
        max_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            profiles,
            max_chars,
            timeout,
        }
    }

    /// The profile covering `url`, if any.
    pub fn profile_for(&self, url: &str) -> Option<&SiteProfile> {
        let host = host_of(url)?;
        self.profiles.iter().find(|p| p.matches(&host))
    }

    /// Extract text from already-fetched HTML.
    pub fn extract_html(&self, html: &str, url: &str) -> Extraction {
        let profile = self.profile_for(url);
        let cleaned = content::clean_html(html);

        let from_profile = profile.and_then(|p| {
            content::extract_with_selectors(&cleaned, url, &p.selectors, self.max_chars)
                .ok()
                .map(|page| {
                    (
                        page,
                        Provenance::Site {
                            profile: p.name.clone(),
                        },
                    )
                })
        });

        let found = from_profile.or_else(|| {
            content::extract_with_selectors(&cleaned, url, GENERIC_SELECTORS, self.max_chars)
                .ok()
                .map(|page| (page, Provenance::Generic))
        });

        let Some((page, provenance)) = found else {
            return Extraction {
                text: String::new(),
                requires_script: cleaned.script_banner(),
                provenance: Provenance::Generic,
            };
        };

        let requires_script = content::has_script_banner(&page.text)
            || (cleaned.script_banner() && page.word_count < MIN_WORDS_WITH_BANNER);

        Extraction {
            text: page.text,
            requires_script,
            provenance,
        }
    }
}

#[async_trait]
impl ContentExtractor for SiteExtractor {
    fn name(&self) -> &str {
        "site"
    }

    async fn extract(&self, url: &str) -> Result<Extraction, SearchError> {
        tracing::trace!(url, "site extraction");
        let page = http::fetch_page(&self.client, url, self.timeout, None).await?;
        if page.is_pdf() {
            return Err(SearchError::Parse(
                "PDF documents are not extracted locally".into(),
            ));
        }
        Ok(self.extract_html(&page.body, url))
    }
}
