//! DuckDuckGo backend, scraping the JavaScript-free HTML endpoints.
//!
//! Three endpoints are tried in order (main HTML form via POST, the `html.`
//! host and the `lite.` host via GET); the first one that yields at least
//! one usable link wins. Result links are wrapped in `/l/?uddg=` redirects
//! which are decoded here.

use async_trait::async_trait;
use rand::Rng;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

use crate::engine::SearchBackend;
use crate::error::SearchError;
use crate::http::ACCEPT_LANGUAGE;
use crate::types::{BackendKind, RawHit};

/// How a DuckDuckGo endpoint takes its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    /// Form-encoded body.
    Post,
    /// Query string.
    Get,
}

/// One DuckDuckGo HTML endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Request method.
    pub method: FormMethod,
    /// Endpoint URL.
    pub url: String,
}

impl Endpoint {
    fn new(method: FormMethod, url: &str) -> Self {
        Self {
            method,
            url: url.to_owned(),
        }
    }
}

/// Endpoints tried by default, in order.
pub fn default_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new(FormMethod::Post, "https://duckduckgo.com/html"),
        Endpoint::new(FormMethod::Get, "https://html.duckduckgo.com/html"),
        Endpoint::new(FormMethod::Get, "https://lite.duckduckgo.com/lite"),
    ]
}

/// DuckDuckGo HTML scraper backend.
pub struct DuckDuckGoBackend {
    client: reqwest::Client,
    endpoints: Vec<Endpoint>,
    retry_pause: Duration,
}

impl DuckDuckGoBackend {
    /// Create a backend trying the public endpoints.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoints: default_endpoints(),
            retry_pause: Duration::from_millis(800),
        }
    }

    /// Replace the endpoint list (tests, mirrors).
    pub fn with_endpoints(mut self, endpoints: Vec<Endpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Base pause between failing endpoints; up to 75% jitter is added.
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    async fn fetch(&self, endpoint: &Endpoint, query: &str) -> Result<String, SearchError> {
        let params = [("q", query)];
        let request = match endpoint.method {
            FormMethod::Post => self.client.post(&endpoint.url).form(&params),
            FormMethod::Get => self.client.get(&endpoint.url).query(&params),
        };
        let response = request
            .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .send()
            .await
            .map_err(|e| SearchError::from_reqwest("DuckDuckGo request failed", e))?
            .error_for_status()
            .map_err(|e| SearchError::Http(format!("DuckDuckGo HTTP error: {e}")))?;

        response
            .text()
            .await
            .map_err(|e| SearchError::from_reqwest("DuckDuckGo response read failed", e))
    }

    fn jittered_pause(&self) -> Duration {
        let base = self.retry_pause.as_millis() as u64;
        let jitter = if base == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base * 3 / 4)
        };
        Duration::from_millis(base + jitter)
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DuckDuckGo
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError> {
        tracing::trace!(query, "DuckDuckGo search");

        let mut last_error = None;
        let mut any_answered = false;
        for endpoint in &self.endpoints {
            match self.fetch(endpoint, query).await {
                Ok(html) => {
                    any_answered = true;
                    let hits = parse_duckduckgo_html(&html, max_results)?;
                    if !hits.is_empty() {
                        return Ok(hits);
                    }
                    tracing::debug!(endpoint = %endpoint.url, "DuckDuckGo endpoint returned no links");
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint.url, error = %e, "DuckDuckGo endpoint failed");
                    last_error = Some(e);
                    tokio::time::sleep(self.jittered_pause()).await;
                }
            }
        }

        match last_error {
            Some(err) if !any_answered => Err(err),
            _ => Ok(Vec::new()),
        }
    }
}

/// Decode a DuckDuckGo redirect (`/l/?uddg=...`) into the target URL.
///
/// Protocol-relative and site-relative redirects are both handled. Links
/// that are not redirects are returned as-is.
pub(crate) fn decode_href(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let full = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_owned()
    };

    let parsed = Url::parse(&full).ok()?;
    let is_ddg = parsed
        .host_str()
        .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"));
    if is_ddg && parsed.path().starts_with("/l/") {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned());
    }
    Some(full)
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Parse(format!("invalid selector {css}: {e:?}")))
}

fn is_usable_link(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    matches!(parsed.scheme(), "http" | "https")
        && !parsed
            .host_str()
            .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"))
}

/// Parse a DuckDuckGo HTML or lite page into raw hits.
///
/// Result anchors (`a.result__a`, `a.result-link`) are preferred, paired
/// with snippets by position. When none are present every outbound anchor
/// is taken instead.
pub(crate) fn parse_duckduckgo_html(html: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError> {
    let document = Html::parse_document(html);
    let anchor_sel = selector("a.result__a, a.result-link")?;
    let snippet_sel = selector(".result__snippet, td.result-snippet")?;
    let any_anchor_sel = selector("a[href]")?;

    let snippets: Vec<String> = document
        .select(&snippet_sel)
        .map(|el| collapse(&el.text().collect::<Vec<_>>().join(" ")))
        .collect();

    let mut hits = Vec::new();
    for (i, anchor) in document.select(&anchor_sel).enumerate() {
        let title = collapse(&anchor.text().collect::<Vec<_>>().join(" "));
        let Some(url) = anchor.value().attr("href").and_then(decode_href) else {
            continue;
        };
        if title.is_empty() || !is_usable_link(&url) {
            continue;
        }
        hits.push(RawHit {
            title,
            url,
            snippet: snippets.get(i).cloned().unwrap_or_default(),
            date: None,
        });
        if hits.len() >= max_results {
            break;
        }
    }

    if hits.is_empty() {
        for anchor in document.select(&any_anchor_sel) {
            let title = collapse(&anchor.text().collect::<Vec<_>>().join(" "));
            let Some(url) = anchor.value().attr("href").and_then(decode_href) else {
                continue;
            };
            if title.is_empty() || !is_usable_link(&url) {
                continue;
            }
            hits.push(RawHit {
                title,
                url,
                ..Default::default()
            });
            if hits.len() >= max_results {
                break;
            }
        }
    }

    tracing::debug!(count = hits.len(), "DuckDuckGo results parsed");
    Ok(hits)
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
