//! Remote extraction service used when direct extraction comes back empty
//! or needs a script-capable renderer.
//!
//! The service is addressed by prefixing the sanitised page URL with its
//! base URL (`https://r.jina.ai/https://...`) and answers with plain text.

use std::time::Duration;

use async_trait::async_trait;

use crate::content;
use crate::error::SearchError;
use crate::http;
use crate::types::Provenance;

use super::sanitize::sanitize_url;
use super::{ContentExtractor, Extraction};

/// Client of a reader-style remote extraction service.
pub struct RemoteExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_chars: usize,
    timeout: Duration,
}

impl RemoteExtractor {
    /// Create a client for the service at `base_url`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        max_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            max_chars,
            timeout,
        }
    }

    /// The request URL for `page_url`.
    pub fn request_url(&self, page_url: &str) -> String {
        let clean = sanitize_url(page_url);
        if self.base_url.ends_with('/') {
            format!("{}{clean}", self.base_url)
        } else {
            format!("{}/{clean}", self.base_url)
        }
    }
}

#[async_trait]
impl ContentExtractor for RemoteExtractor {
    fn name(&self) -> &str {
        "remote"
    }

    async fn extract(&self, url: &str) -> Result<Extraction, SearchError> {
        tracing::trace!(url, "remote extraction");
        let page = http::fetch_page(
            &self.client,
            &self.request_url(url),
            self.timeout,
            self.api_key.as_deref(),
        )
        .await?;
        if page.is_pdf() {
            return Err(SearchError::Parse(
                "remote extractor returned a raw PDF".into(),
            ));
        }

        let text = page.body.trim();
        Ok(Extraction {
            text: content::truncate_to_limit(text, self.max_chars),
            requires_script: false,
            provenance: Provenance::Remote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn request_url_prefixes_sanitised_url() {
        let ex = RemoteExtractor::new(
            reqwest::Client::new(),
            "https://r.jina.ai/",
            None,
            1000,
            Duration::from_secs(5),
        );
        assert_eq!(
            ex.request_url("https://example.gov/a;jsessionid=1?sid=2#x"),
            "https://r.jina.ai/https://example.gov/a"
        );

        let ex = RemoteExtractor::new(
            reqwest::Client::new(),
            "https://reader.local",
            None,
            1000,
            Duration::from_secs(5),
        );
        assert!(ex.request_url("https://example.gov/a").starts_with("https://reader.local/https://"));
    }

    #[tokio::test]
    async fn returns_remote_text_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/https://example.gov/decision"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  Texte rendu  "))
            .expect(1)
            .mount(&server)
            .await;

        let ex = RemoteExtractor::new(
            reqwest::Client::new(),
            format!("{}/", server.uri()),
            Some("token".into()),
            1000,
            Duration::from_secs(5),
        );
        let out = ex
            .extract("https://example.gov/decision?PHPSESSID=abc")
            .await
            .expect("extraction");
        assert_eq!(out.text, "Texte rendu");
        assert_eq!(out.provenance, Provenance::Remote);
    }

    #[tokio::test]
    async fn service_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(451))
            .mount(&server)
            .await;

        let ex = RemoteExtractor::new(
            reqwest::Client::new(),
            server.uri(),
            None,
            1000,
            Duration::from_secs(5),
        );
        assert!(ex.extract("https://example.gov/x").await.is_err());
    }
}
