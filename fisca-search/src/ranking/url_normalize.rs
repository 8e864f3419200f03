//! URL keys for document deduplication.
//!
//! Two documents are the same page when their keys are equal: scheme and
//! host lower-cased, default port dropped, trailing slash stripped from the
//! path, query string and fragment discarded.

use url::Url;

/// Build the deduplication key of `raw`.
///
/// Unparseable input falls back to the trimmed, lower-cased string cut at
/// the first `?` or `#`, so malformed URLs still dedupe against themselves.
///
/// # Examples
///
/// ```
/// use fisca_search::ranking::url_normalize::dedup_key;
///
/// let a = dedup_key("HTTPS://Example.GOV/doc/?page=2#s1");
/// let b = dedup_key("https://example.gov/doc");
/// assert_eq!(a, b);
/// ```
pub fn dedup_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        let cut = trimmed.split(['?', '#']).next().unwrap_or_default();
        return cut.trim_end_matches('/').to_lowercase();
    };

    parsed.set_fragment(None);
    parsed.set_query(None);
    if is_default_port(&parsed) {
        let _ = parsed.set_port(None);
    }

    let path = parsed.path().to_owned();
    let stripped = path.trim_end_matches('/');
    let host = parsed.host_str().unwrap_or_default();
    let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();

    // The url crate already lower-cases scheme and host.
    format!("{}://{host}{port}{stripped}", parsed.scheme())
}

fn is_default_port(url: &Url) -> bool {
    matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    )
}
