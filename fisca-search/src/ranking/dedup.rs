//! Document deduplication.
//!
//! Two passes exist. [`dedup_exact_urls`] drops verbatim repeats before
//! scoring (first occurrence wins). [`deduplicate`] collapses scored
//! documents sharing a [`dedup_key`] and keeps the best-scored one.

use std::collections::{HashMap, HashSet};

use crate::types::{CandidateDocument, ScoredDocument};

use super::url_normalize::dedup_key;

/// Drop candidates whose URL string was already seen, keeping input order.
pub fn dedup_exact_urls(candidates: Vec<CandidateDocument>) -> Vec<CandidateDocument> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

/// Collapse documents sharing a normalised URL key.
///
/// The highest-scored document of each group survives; on equal scores the
/// first one seen wins. Groups keep the position of their first member, so
/// the output order is deterministic for a given input.
pub fn deduplicate(docs: Vec<ScoredDocument>) -> Vec<ScoredDocument> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ScoredDocument> = Vec::new();

    for doc in docs {
        let key = dedup_key(&doc.document.url);
        match index.get(&key) {
            Some(&slot) => {
                if doc.score > kept[slot].score {
                    kept[slot] = doc;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(doc);
            }
        }
    }

    kept
}
