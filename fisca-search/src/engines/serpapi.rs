//! SerpApi backend: Google results through a paid JSON API.
//!
//! Uses the lightweight `google_light` engine with French locale hints.
//! The API key travels as a query parameter and never appears in logs or
//! error messages.

use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::SearchBackend;
use crate::error::SearchError;
use crate::types::{BackendKind, RawHit};

/// Default SerpApi endpoint.
pub const DEFAULT_BASE_URL: &str = "https://serpapi.com/search";

/// SerpApi search backend.
pub struct SerpApiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    language: String,
    country: String,
    exclude_pdf: bool,
}

impl SerpApiBackend {
    /// Create a backend using the public endpoint and French locale.
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            language: "fr".into(),
            country: "fr".into(),
            exclude_pdf: true,
        }
    }

    /// Override the endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the `hl` / `gl` locale hints.
    pub fn with_locale(mut self, language: impl Into<String>, country: impl Into<String>) -> Self {
        self.language = language.into();
        self.country = country.into();
        self
    }

    /// Whether `-filetype:pdf` is appended to queries.
    pub fn with_exclude_pdf(mut self, exclude_pdf: bool) -> Self {
        self.exclude_pdf = exclude_pdf;
        self
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
}

#[async_trait]
impl SearchBackend for SerpApiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SerpApi
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError> {
        tracing::trace!(query, "SerpApi search");

        let q = if self.exclude_pdf {
            format!("{query} -filetype:pdf")
        } else {
            query.to_owned()
        };
        let num = max_results.to_string();
        let params = [
            ("engine", "google_light"),
            ("q", q.as_str()),
            ("num", num.as_str()),
            ("hl", self.language.as_str()),
            ("gl", self.country.as_str()),
            ("api_key", self.api_key.as_str()),
        ];

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| SearchError::from_reqwest("SerpApi request failed", e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::from_reqwest("SerpApi response read failed", e.without_url()))?;

        parse_serpapi_json(&body, status, max_results)
    }
}

/// Parse a SerpApi JSON payload into raw hits.
pub(crate) fn parse_serpapi_json(
    body: &str,
    status: reqwest::StatusCode,
    max_results: usize,
) -> Result<Vec<RawHit>, SearchError> {
    let parsed: SerpApiResponse = serde_json::from_str(body).map_err(|e| {
        if status.is_success() {
            SearchError::Parse(format!("SerpApi payload: {e}"))
        } else {
            SearchError::Http(format!("SerpApi HTTP status {status}"))
        }
    })?;

    if let Some(message) = parsed.error {
        // "no results" is reported through the error field with a 200.
        if status.is_success() && message.to_lowercase().contains("hasn't returned any results") {
            return Ok(Vec::new());
        }
        return Err(SearchError::Backend(format!("SerpApi: {message}")));
    }
    if !status.is_success() {
        return Err(SearchError::Http(format!("SerpApi HTTP status {status}")));
    }

    let hits: Vec<RawHit> = parsed
        .organic_results
        .into_iter()
        .filter(|r| !r.link.is_empty())
        .take(max_results)
        .map(|r| RawHit {
            title: r.title.trim().to_owned(),
            url: r.link,
            snippet: r.snippet.trim().to_owned(),
            date: r.date,
        })
        .collect();

    tracing::debug!(count = hits.len(), "SerpApi results parsed");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYLOAD: &str = r#"{
        "search_metadata": {"status": "Success"},
        "organic_results": [
            {"position": 1, "title": "Article 150-0 B ter - Légifrance", "link": "https://www.legifrance.gouv.fr/codes/article_lc/LEGIARTI000036428074", "snippet": "Report d'imposition de la plus-value.", "date": "12 janv. 2024"},
            {"position": 2, "title": "BOI-RPPM-PVBMI-30-10-60", "link": "https://bofip.impots.gouv.fr/bofip/5720-PGP.html", "snippet": "Apport de titres à une société contrôlée."},
            {"position": 3, "title": "No link"}
        ]
    }"#;

    #[test]
    fn parses_organic_results() {
        let hits = parse_serpapi_json(PAYLOAD, StatusCode::OK, 10).expect("parse");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Article 150-0 B ter - Légifrance");
        assert!(hits[0].url.contains("LEGIARTI000036428074"));
        assert_eq!(hits[0].date.as_deref(), Some("12 janv. 2024"));
        assert!(hits[1].date.is_none());
    }

    #[test]
    fn respects_max_results() {
        let hits = parse_serpapi_json(PAYLOAD, StatusCode::OK, 1).expect("parse");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn missing_results_is_empty() {
        let hits = parse_serpapi_json(r#"{"search_metadata":{}}"#, StatusCode::OK, 4).expect("parse");
        assert!(hits.is_empty());
    }

    #[test]
    fn no_results_error_is_empty() {
        let body = r#"{"error": "Google hasn't returned any results for this query."}"#;
        let hits = parse_serpapi_json(body, StatusCode::OK, 4).expect("parse");
        assert!(hits.is_empty());
    }

    #[test]
    fn api_error_is_backend_error() {
        let body = r#"{"error": "Invalid API key."}"#;
        let err = parse_serpapi_json(body, StatusCode::UNAUTHORIZED, 4).unwrap_err();
        assert!(matches!(err, SearchError::Backend(_)));
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[test]
    fn garbage_payload_is_parse_error() {
        let err = parse_serpapi_json("<html>", StatusCode::OK, 4).unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[tokio::test]
    async fn sends_locale_and_pdf_exclusion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("engine", "google_light"))
            .and(query_param("q", "plus-value apport -filetype:pdf"))
            .and(query_param("hl", "fr"))
            .and(query_param("gl", "fr"))
            .and(query_param("num", "3"))
            .and(query_param("api_key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAYLOAD))
            .expect(1)
            .mount(&server)
            .await;

        let backend = SerpApiBackend::new(reqwest::Client::new(), "secret")
            .with_base_url(format!("{}/search", server.uri()));
        let hits = backend.search("plus-value apport", 3).await.expect("search");
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn error_does_not_leak_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend = SerpApiBackend::new(reqwest::Client::new(), "secret-key")
            .with_base_url(server.uri());
        let err = backend.search("q", 3).await.unwrap_err();
        assert!(!err.to_string().contains("secret-key"));
    }

    #[tokio::test]
    #[ignore] // Live test, needs SERPAPI_API_KEY
    async fn live_serpapi_search() {
        let key = std::env::var("SERPAPI_API_KEY").expect("SERPAPI_API_KEY");
        let backend = SerpApiBackend::new(reqwest::Client::new(), key);
        let hits = backend.search("article 150-0 B ter CGI", 4).await.expect("search");
        assert!(!hits.is_empty());
    }
}
