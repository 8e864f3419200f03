//! BM25F text relevance over title and snippet.
//!
//! Titles and snippets are a few dozen tokens at most, so the usual corpus
//! statistics are replaced by fixed parameters: the term frequency is the
//! number of query terms present in the field and the average document
//! length is a constant.

use std::collections::HashSet;

use crate::config::Bm25Params;

/// Lower-case word tokens: letters (accented included), digits and hyphens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty() && t.chars().any(char::is_alphanumeric))
        .map(str::to_owned)
        .collect()
}

/// BM25 contribution of one field.
fn field_score(query_terms: &[String], field_terms: &[String], params: &Bm25Params) -> f64 {
    if query_terms.is_empty() || field_terms.is_empty() {
        return 0.0;
    }
    let present: HashSet<&str> = field_terms.iter().map(String::as_str).collect();
    let tf = query_terms
        .iter()
        .filter(|t| present.contains(t.as_str()))
        .count() as f64;
    let dl = field_terms.len() as f64;
    let k1 = params.k1;
    let b = params.b;
    (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * (dl / params.avg_doc_len)))
}

/// Weighted BM25F score of a title/snippet pair against `query`.
pub fn bm25f(query: &str, title: &str, snippet: &str, params: &Bm25Params) -> f64 {
    let q = tokenize(query);
    let t = tokenize(title);
    let s = tokenize(snippet);
    params.title_weight * field_score(&q, &t, params)
        + params.snippet_weight * field_score(&q, &s, params)
}

/// Map a raw BM25F value onto `[0, 1]` against the configured ceiling.
pub fn normalized(raw: f64, params: &Bm25Params) -> f64 {
    (raw / params.ceiling).clamp(0.0, 1.0)
}
