//! Google Custom Search JSON API backend.

use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::SearchBackend;
use crate::error::SearchError;
use crate::types::{BackendKind, RawHit};

/// Default Custom Search endpoint.
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";

/// The API refuses `num` above this value.
const MAX_PAGE_SIZE: usize = 10;

/// Google Custom Search backend, keyed by API key and engine id (`cx`).
pub struct GoogleCseBackend {
    client: reqwest::Client,
    api_key: String,
    engine_id: String,
    base_url: String,
    language: String,
    country: String,
}

impl GoogleCseBackend {
    /// Create a backend for the public endpoint.
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            language: "fr".into(),
            country: "fr".into(),
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
}

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
    #[serde(default)]
    error: Option<CseError>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct CseError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl SearchBackend for GoogleCseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GoogleCse
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError> {
        tracing::trace!(query, "Google CSE search");

        let num = max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let params = [
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
            ("hl", self.language.as_str()),
            ("gl", self.country.as_str()),
            ("safe", "off"),
        ];

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| SearchError::from_reqwest("Google CSE request failed", e.without_url()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            SearchError::from_reqwest("Google CSE response read failed", e.without_url())
        })?;

        parse_cse_json(&body, status, max_results)
    }
}

/// Parse a Custom Search JSON payload into raw hits.
pub(crate) fn parse_cse_json(
    body: &str,
    status: reqwest::StatusCode,
    max_results: usize,
) -> Result<Vec<RawHit>, SearchError> {
    let parsed: CseResponse = serde_json::from_str(body).map_err(|e| {
        if status.is_success() {
            SearchError::Parse(format!("Google CSE payload: {e}"))
        } else {
            SearchError::Http(format!("Google CSE HTTP status {status}"))
        }
    })?;

    if let Some(err) = parsed.error {
        return Err(SearchError::Backend(format!(
            "Google CSE error {}: {}",
            err.code, err.message
        )));
    }
    if !status.is_success() {
        return Err(SearchError::Http(format!("Google CSE HTTP status {status}")));
    }

    let hits: Vec<RawHit> = parsed
        .items
        .into_iter()
        .filter(|it| !it.link.is_empty() && !it.title.trim().is_empty())
        .take(max_results)
        .map(|it| RawHit {
            title: it.title.trim().to_owned(),
            url: it.link,
            snippet: it.snippet.trim().to_owned(),
            date: None,
        })
        .collect();

    tracing::debug!(count = hits.len(), "Google CSE results parsed");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAYLOAD: &str = r#"{
        "kind": "customsearch#search",
        "items": [
            {"title": "Conseil d'État, 8ème chambre, 12/03/2024", "link": "https://www.conseil-etat.fr/decisions/123", "snippet": "Plus-value d'apport."},
            {"title": "", "link": "https://www.conseil-etat.fr/empty-title"},
            {"title": "Cour de cassation", "link": "https://www.courdecassation.fr/decision/1", "snippet": ""}
        ]
    }"#;

    #[test]
    fn parses_items() {
        let hits = parse_cse_json(PAYLOAD, StatusCode::OK, 10).expect("parse");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://www.conseil-etat.fr/decisions/123");
        assert_eq!(hits[1].title, "Cour de cassation");
    }

    #[test]
    fn no_items_is_empty() {
        let hits = parse_cse_json(r#"{"kind":"customsearch#search"}"#, StatusCode::OK, 4)
            .expect("parse");
        assert!(hits.is_empty());
    }

    #[test]
    fn quota_error_is_backend_error() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded"}}"#;
        let err = parse_cse_json(body, StatusCode::TOO_MANY_REQUESTS, 4).unwrap_err();
        assert!(matches!(err, SearchError::Backend(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn page_size_is_capped_at_ten() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("num", "10"))
            .and(query_param("cx", "engine"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAYLOAD))
            .expect(1)
            .mount(&server)
            .await;

        let backend = GoogleCseBackend::new(reqwest::Client::new(), "key", "engine")
            .with_base_url(server.uri());
        let hits = backend.search("plus-value", 25).await.expect("search");
        assert_eq!(hits.len(), 2);
    }
}
