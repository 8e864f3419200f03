//! Shared HTTP client with User-Agent rotation.
//!
//! One [`reqwest::Client`] is built per pipeline and shared by every backend
//! and extractor; per-call time budgets are enforced by the callers.

use std::time::Duration;

use rand::seq::SliceRandom;

use crate::config::SearchConfig;
use crate::error::SearchError;

/// Realistic browser User-Agent strings.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Accept-Language sent with scraped requests.
pub const ACCEPT_LANGUAGE: &str = "fr-FR,fr;q=0.9,en;q=0.6";

/// Connect timeout applied to every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the shared [`reqwest::Client`].
///
/// The client keeps cookies (consent pages), decompresses brotli and gzip,
/// follows up to ten redirects and sends either the configured User-Agent
/// or one picked from the built-in rotation.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    let ua = match config.user_agent {
        Some(ref custom) => custom.clone(),
        None => random_user_agent().to_owned(),
    };

    reqwest::Client::builder()
        .cookie_store(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(ua)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Select a random User-Agent string from the rotation list.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// A fetched page body with the metadata extractors need.
#[derive(Debug, Clone)]
pub(crate) struct FetchedPage {
    /// URL after redirects.
    pub final_url: String,
    /// Lower-cased `Content-Type` header, empty when absent.
    pub content_type: String,
    /// Decoded body.
    pub body: String,
}

impl FetchedPage {
    /// Whether the response is a PDF document.
    pub fn is_pdf(&self) -> bool {
        self.content_type.contains("pdf") || self.final_url.to_lowercase().ends_with(".pdf")
    }
}

/// GET `url`, failing on non-success statuses.
///
/// PDF bodies are not decoded; callers check [`FetchedPage::is_pdf`].
pub(crate) async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    bearer: Option<&str>,
) -> Result<FetchedPage, SearchError> {
    let mut request = client
        .get(url)
        .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
        .timeout(timeout);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .map_err(|e| SearchError::from_reqwest("request failed", e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Http(format!("HTTP status {status}")));
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();

    let page = FetchedPage {
        final_url,
        content_type,
        body: String::new(),
    };
    if page.is_pdf() {
        return Ok(page);
    }

    let body = response
        .text()
        .await
        .map_err(|e| SearchError::from_reqwest("response read failed", e))?;
    Ok(FetchedPage { body, ..page })
}
