//! HTML text extraction: boilerplate stripping and selector-driven content
//! location.
//!
//! Raw HTML has its non-content elements (scripts, styles, navigation)
//! removed, then the first selector of an ordered list that matches
//! non-empty text decides the content root. Site profiles pass their own
//! selector lists; [`GENERIC_SELECTORS`] is the fallback chain.

use scraper::{Html, Selector};

use crate::error::{Result, SearchError};
use crate::types::PageContent;

/// Default maximum characters to return from extracted content.
pub const DEFAULT_MAX_CHARS: usize = 100_000;

/// Content roots tried when no site profile applies.
pub const GENERIC_SELECTORS: &[&str] = &["article", "main", "[role=\"main\"]", "body"];

/// Banners shown by pages that render their content client-side.
const SCRIPT_BANNERS: &[&str] = &[
    "javascript n'est pas activé",
    "javascript n’est pas activé",
    "veuillez activer javascript",
    "javascript is not enabled",
    "javascript is disabled",
    "please enable javascript",
];

/// Elements removed with their content before parsing.
const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "svg", "iframe", "form",
];

/// HTML with its boilerplate elements removed.
#[derive(Debug, Clone)]
pub struct CleanedHtml {
    html: String,
    script_banner: bool,
}

impl CleanedHtml {
    /// The remaining markup.
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Whether the page showed a script banner, either in a removed
    /// `<noscript>` element or in the remaining markup.
    pub fn script_banner(&self) -> bool {
        self.script_banner
    }
}

/// Extract readable text using the generic selector chain.
///
/// # Errors
///
/// Returns [`SearchError::Parse`] if no extractable content is found.
pub fn extract_content(html: &str, url: &str) -> Result<PageContent> {
    extract_with_selectors(&clean_html(html), url, GENERIC_SELECTORS, DEFAULT_MAX_CHARS)
}

/// Extract readable text using the first selector that yields text.
///
/// Every element matched by the winning selector contributes, in document
/// order. Invalid selectors are skipped.
///
/// # Errors
///
/// Returns [`SearchError::Parse`] if no selector yields text.
pub fn extract_with_selectors<S: AsRef<str>>(
    page: &CleanedHtml,
    url: &str,
    selectors: &[S],
    max_chars: usize,
) -> Result<PageContent> {
    let document = Html::parse_document(page.html());

    let text = tidy_whitespace(&select_text(&document, selectors));
    if text.is_empty() {
        return Err(SearchError::Parse("no extractable content found".into()));
    }
    let text = truncate_to_limit(&text, max_chars);

    Ok(PageContent {
        url: url.to_owned(),
        title: page_title(&document),
        word_count: text.split_whitespace().count(),
        text,
    })
}

/// Whether `text` carries a "JavaScript is not enabled" banner.
pub fn has_script_banner(text: &str) -> bool {
    let lower = text.to_lowercase();
    SCRIPT_BANNERS.iter().any(|b| lower.contains(b))
}

/// Remove every [`BOILERPLATE_TAGS`] element in one scan, noting script
/// banners on the way.
///
/// An element runs to its matching close tag, or to the end of its open
/// tag when it is never closed.
pub fn clean_html(html: &str) -> CleanedHtml {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut kept = String::with_capacity(html.len());
    let mut script_banner = false;
    let mut copied_to = 0;
    let mut scan = 0;

    while let Some(offset) = lower[scan..].find('<') {
        let open = scan + offset;
        let Some(tag) = boilerplate_tag_at(&lower[open + 1..]) else {
            scan = open + 1;
            continue;
        };
        kept.push_str(&html[copied_to..open]);

        let inner = open + 1 + tag.len();
        let close = format!("</{tag}>");
        let end = lower[inner..]
            .find(&close)
            .map(|o| inner + o + close.len())
            .or_else(|| lower[inner..].find('>').map(|o| inner + o + 1))
            .unwrap_or(html.len());

        if tag == "noscript" && !script_banner {
            script_banner = has_script_banner(&html[inner..end]);
        }
        copied_to = end;
        scan = end;
    }
    kept.push_str(&html[copied_to..]);

    let script_banner = script_banner || has_script_banner(&kept);
    CleanedHtml {
        html: kept,
        script_banner,
    }
}

/// The boilerplate tag opened at the start of `rest` (the text after a
/// `<`). `<nav` must not match `<navigate>`.
fn boilerplate_tag_at(rest: &str) -> Option<&'static str> {
    BOILERPLATE_TAGS.iter().copied().find(|tag| {
        rest.strip_prefix(tag).is_some_and(|after| {
            after
                .chars()
                .next()
                .map_or(true, |c| c == '>' || c == '/' || c.is_ascii_whitespace())
        })
    })
}

/// `<title>`, or the first `<h1>` when the title is missing or blank.
fn page_title(document: &Html) -> String {
    ["title", "h1"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .map(|el| el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" "))
                .find(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

fn select_text<S: AsRef<str>>(document: &Html, selectors: &[S]) -> String {
    for selector_str in selectors {
        let Ok(selector) = Selector::parse(selector_str.as_ref()) else {
            tracing::debug!(selector = selector_str.as_ref(), "skipping invalid selector");
            continue;
        };
        let blocks: Vec<String> = document
            .select(&selector)
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.trim().is_empty())
            .collect();
        if !blocks.is_empty() {
            return blocks.join("\n\n");
        }
    }
    String::new()
}

/// One space between words, one newline between lines, and at most one
/// blank line between paragraphs.
fn tidy_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut paragraph_break = false;
    for line in text.lines() {
        let mut words = line.split_whitespace().peekable();
        if words.peek().is_none() {
            paragraph_break = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if paragraph_break { "\n\n" } else { "\n" });
        }
        paragraph_break = false;
        for (i, word) in words.enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// Keep the first `max_chars` characters, marking the cut.
pub(crate) fn truncate_to_limit(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_owned(),
        Some((cut, _)) => format!("{}\n\n[Content truncated]", &text[..cut]),
    }
}
