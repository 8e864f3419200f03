//! URL clean-up before handing a page to the remote extractor.
//!
//! Session identifiers make otherwise identical URLs look distinct to the
//! remote service's cache and often expire before it fetches the page.

use url::Url;

/// Query parameters carrying server-side session state.
const SESSION_PARAMS: &[&str] = &[
    "jsessionid",
    "phpsessid",
    "sid",
    "sessionid",
    "session_id",
    "cfid",
    "cftoken",
];

/// Query parameters that only track the click.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "xtor",
];

/// Strip session and tracking state from `raw`.
///
/// Removes `;jsessionid=...` path parameters, session and tracking query
/// parameters (case-insensitive) and the fragment. Remaining parameters
/// keep their order. Unparseable input is returned trimmed.
pub fn sanitize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_owned();
    };

    parsed.set_fragment(None);

    let path = parsed.path().to_owned();
    let cleaned_path: Vec<&str> = path
        .split('/')
        .map(|segment| match segment.to_ascii_lowercase().find(";jsessionid=") {
            Some(idx) => &segment[..idx],
            None => segment,
        })
        .collect();
    parsed.set_path(&cleaned_path.join("/"));

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| {
            let k = key.to_lowercase();
            !SESSION_PARAMS.contains(&k.as_str()) && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_jsessionid_path_parameter() {
        assert_eq!(
            sanitize_url("https://www.legifrance.gouv.fr/affichCode.do;jsessionid=ABC123.tpdjo?cidTexte=LEGITEXT000006069577"),
            "https://www.legifrance.gouv.fr/affichCode.do?cidTexte=LEGITEXT000006069577"
        );
    }

    #[test]
    fn strips_session_query_parameters_case_insensitively() {
        assert_eq!(
            sanitize_url("https://example.gov/doc?id=7&PHPSESSID=x&sid=y&CFID=1&cftoken=2"),
            "https://example.gov/doc?id=7"
        );
    }

    #[test]
    fn strips_tracking_and_fragment() {
        assert_eq!(
            sanitize_url("https://example.gov/doc?utm_source=news&page=2#section-3"),
            "https://example.gov/doc?page=2"
        );
    }

    #[test]
    fn drops_empty_query() {
        assert_eq!(
            sanitize_url("https://example.gov/doc?jsessionid=abc"),
            "https://example.gov/doc"
        );
    }

    #[test]
    fn clean_url_unchanged() {
        let url = "https://bofip.impots.gouv.fr/bofip/5720-PGP.html/identifiant=BOI-RPPM-PVBMI-30-10-60-20191220";
        assert_eq!(sanitize_url(url), url);
    }

    #[test]
    fn unparseable_input_trimmed() {
        assert_eq!(sanitize_url("  not a url "), "not a url");
    }
}
