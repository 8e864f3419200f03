//! Adaptive score threshold.

use fisca_search::ScoredDocument;

/// Documents surviving the threshold filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filtered {
    /// Kept documents, in input order.
    pub kept: Vec<ScoredDocument>,
    /// Whether the low threshold was used.
    pub relaxed: bool,
}

/// Keep retained documents scoring at least `t_high`. If none do, retry
/// once with `t_low`; there is no further relaxation.
pub fn adaptive_filter(docs: Vec<ScoredDocument>, t_high: f64, t_low: f64) -> Filtered {
    let passes = |doc: &ScoredDocument, threshold: f64| doc.retained && doc.score >= threshold;

    if docs.iter().any(|d| passes(d, t_high)) {
        return Filtered {
            kept: docs.into_iter().filter(|d| passes(d, t_high)).collect(),
            relaxed: false,
        };
    }

    let kept: Vec<ScoredDocument> = docs.into_iter().filter(|d| passes(d, t_low)).collect();
    tracing::info!(
        t_high,
        t_low,
        kept = kept.len(),
        "no document above the high threshold; relaxed once"
    );
    Filtered {
        kept,
        relaxed: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fisca_search::{CandidateDocument, Family};

    fn doc(url: &str, score: f64, retained: bool) -> ScoredDocument {
        ScoredDocument {
            document: CandidateDocument {
                url: url.into(),
                title: "Titre".into(),
                snippet: String::new(),
                domain: "legifrance.gouv.fr".into(),
                family: Family::Statute,
                query: "q".into(),
                date: None,
            },
            score,
            retained,
        }
    }

    fn urls(filtered: &Filtered) -> Vec<&str> {
        filtered.kept.iter().map(|d| d.document.url.as_str()).collect()
    }

    #[test]
    fn high_threshold_wins_when_anything_passes() {
        let docs = vec![doc("a", 0.5, true), doc("b", 0.35, true), doc("c", 0.9, false)];
        let out = adaptive_filter(docs, 0.45, 0.30);
        assert!(!out.relaxed);
        assert_eq!(urls(&out), vec!["a"]);
    }

    #[test]
    fn relaxes_once_when_high_pass_is_empty() {
        let docs = vec![doc("a", 0.40, true), doc("b", 0.31, true), doc("c", 0.10, true)];
        let out = adaptive_filter(docs, 0.45, 0.30);
        assert!(out.relaxed);
        assert_eq!(urls(&out), vec!["a", "b"]);
    }

    #[test]
    fn not_retained_never_passes() {
        let docs = vec![doc("a", 0.9, false), doc("b", 0.4, false)];
        let out = adaptive_filter(docs, 0.45, 0.30);
        assert!(out.relaxed);
        assert!(out.kept.is_empty());
    }

    #[test]
    fn boundary_scores_are_inclusive() {
        let out = adaptive_filter(vec![doc("a", 0.45, true)], 0.45, 0.30);
        assert!(!out.relaxed);
        assert_eq!(out.kept.len(), 1);
    }

    #[test]
    fn empty_input_is_empty() {
        let out = adaptive_filter(Vec::new(), 0.45, 0.30);
        assert!(out.kept.is_empty());
    }
}
