//! Producer selection from a routing decision.

use crate::brief::RoutingDecision;
use crate::config::{ProducerSpec, RoutingConfig};

/// Turns a [`RoutingDecision`] into a bounded list of known producers.
#[derive(Debug, Clone)]
pub struct Router {
    config: RoutingConfig,
}

impl Router {
    /// Create a router over the configured producers.
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    /// Every producer the router may pick.
    pub fn producers(&self) -> &[ProducerSpec] {
        &self.config.producers
    }

    /// Select producers for `decision`.
    ///
    /// An explicit selection is kept in order, with unknown names dropped,
    /// duplicates removed and the list capped at `max_producers`. Without
    /// one, producers scoring at least `min_score` are taken by descending
    /// score (ties by name). An empty result means the question is out of
    /// scope.
    pub fn select(&self, decision: &RoutingDecision) -> Vec<ProducerSpec> {
        let names: Vec<&str> = match &decision.selected {
            Some(selected) => selected.iter().map(String::as_str).collect(),
            None => {
                let mut scored: Vec<(&str, f64)> = decision
                    .scores
                    .iter()
                    .filter(|(_, score)| **score >= self.config.min_score)
                    .map(|(name, score)| (name.as_str(), *score))
                    .collect();
                scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                scored.into_iter().map(|(name, _)| name).collect()
            }
        };

        let mut picked: Vec<ProducerSpec> = Vec::new();
        for name in names {
            let Some(producer) = self.lookup(name) else {
                tracing::debug!(producer = %name, "router named an unknown producer");
                continue;
            };
            if picked.iter().any(|p| p.name == producer.name) {
                continue;
            }
            picked.push(producer.clone());
            if picked.len() == self.config.max_producers {
                break;
            }
        }
        picked
    }

    fn lookup(&self, name: &str) -> Option<&ProducerSpec> {
        let name = name.trim();
        self.config
            .producers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn router(max: usize) -> Router {
        Router::new(RoutingConfig {
            producers: ["A", "B", "C", "D", "E"]
                .into_iter()
                .map(|n| ProducerSpec::new(n, "desc"))
                .collect(),
            max_producers: max,
            min_score: 0.6,
        })
    }

    fn names(picked: &[ProducerSpec]) -> Vec<&str> {
        picked.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn explicit_selection_keeps_order_and_drops_unknowns() {
        let decision = RoutingDecision {
            scores: BTreeMap::new(),
            selected: Some(vec!["C".into(), "ZZZ".into(), "a".into(), "C".into()]),
        };
        assert_eq!(names(&router(4).select(&decision)), vec!["C", "A"]);
    }

    #[test]
    fn selection_is_capped() {
        let decision = RoutingDecision {
            scores: BTreeMap::new(),
            selected: Some(["A", "B", "C", "D", "E"].map(String::from).to_vec()),
        };
        assert_eq!(router(4).select(&decision).len(), 4);
        assert_eq!(names(&router(2).select(&decision)), vec!["A", "B"]);
    }

    #[test]
    fn scores_are_used_without_selection() {
        let decision = RoutingDecision {
            scores: BTreeMap::from([
                ("A".to_owned(), 0.61),
                ("B".to_owned(), 0.95),
                ("C".to_owned(), 0.2),
                ("D".to_owned(), 0.95),
            ]),
            selected: None,
        };
        assert_eq!(names(&router(4).select(&decision)), vec!["B", "D", "A"]);
    }

    #[test]
    fn empty_or_unknown_selection_is_out_of_scope() {
        let empty = RoutingDecision {
            scores: BTreeMap::from([("A".to_owned(), 0.9)]),
            selected: Some(vec![]),
        };
        assert!(router(4).select(&empty).is_empty());

        let unknown = RoutingDecision {
            scores: BTreeMap::new(),
            selected: Some(vec!["NOPE".into()]),
        };
        assert!(router(4).select(&unknown).is_empty());

        assert!(router(4).select(&RoutingDecision::default()).is_empty());
    }
}
