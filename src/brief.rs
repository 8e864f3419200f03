//! Structured values produced by the language-model collaborators.
//!
//! Every type here is built from an already-parsed [`serde_json::Value`]
//! (see [`crate::structured`]) and tolerates missing or mistyped fields:
//! model output is never trusted to match a schema exactly.

use std::collections::{BTreeMap, HashSet, VecDeque};

use fisca_search::{Family, SearchQuery};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The classification of a question: what is asked, in which terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brief {
    /// One-sentence statement of the issue.
    pub issue: String,
    /// Technical terms worth searching for.
    #[serde(default)]
    pub key_terms: Vec<String>,
    /// Everything else the classifier returned (scope, periods, thresholds).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Brief {
    /// Build a brief from classifier output.
    ///
    /// A missing or blank `issue` falls back to the question itself.
    pub fn from_value(value: Value, question: &str) -> Self {
        let mut details = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let issue = details
            .remove("issue")
            .and_then(|v| v.as_str().map(str::trim).map(str::to_owned))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| question.trim().to_owned());
        let key_terms = details
            .remove("key_terms")
            .map(|v| string_list(&v))
            .unwrap_or_default();
        Self {
            issue,
            key_terms,
            details,
        }
    }

    /// Whether the classifier returned anything beyond the fallback issue.
    pub fn is_bare(&self) -> bool {
        self.key_terms.is_empty() && self.details.is_empty()
    }

    /// Pretty JSON rendering, as handed to downstream prompts.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.issue.clone())
    }
}

/// Which producers the router chose, with their scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Score in `[0, 1]` per producer name.
    pub scores: BTreeMap<String, f64>,
    /// Explicit selection, in priority order. `None` when the router gave
    /// only scores.
    pub selected: Option<Vec<String>>,
}

impl RoutingDecision {
    /// Read a decision from router output.
    ///
    /// Accepts `selected` or `selected_agents`; non-numeric scores and
    /// non-string names are ignored.
    pub fn from_value(value: &Value) -> Self {
        let scores = value
            .get("scores")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(name, score)| Some((name.trim().to_owned(), score.as_f64()?)))
                    .collect()
            })
            .unwrap_or_default();
        let selected = value
            .get("selected")
            .or_else(|| value.get("selected_agents"))
            .filter(|v| v.is_array())
            .map(string_list);
        Self { scores, selected }
    }
}

/// A query paired with an optional family label, as producers emit them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedQuery {
    /// Free-form family label; unknown labels map to [`Family::Misc`].
    pub family: Option<String>,
    /// Query text.
    pub text: String,
}

/// The shapes a producer's query list arrives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuerySpec {
    /// `{"statute": ["...", ...], "doctrine": [...]}`
    ByFamily(BTreeMap<String, Vec<String>>),
    /// `[{"family": "doctrine", "q": "..."}, ...]`, possibly mixed with bare strings.
    Tagged(Vec<TaggedQuery>),
    /// `["...", "..."]`
    Plain(Vec<String>),
}

impl QuerySpec {
    /// Classify a parsed value. Returns `None` for anything that is neither
    /// an object nor an array.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::ByFamily(
                map.iter()
                    .map(|(family, items)| (family.clone(), family_items(items)))
                    .collect(),
            )),
            Value::Array(items) if items.iter().all(Value::is_string) => {
                Some(Self::Plain(string_list(value)))
            }
            Value::Array(items) => Some(Self::Tagged(items.iter().filter_map(tagged).collect())),
            _ => None,
        }
    }

    /// Whether the spec holds no query text at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::ByFamily(map) => map.values().all(Vec::is_empty),
            Self::Tagged(items) => items.is_empty(),
            Self::Plain(items) => items.is_empty(),
        }
    }

    /// Flatten into search queries, mapping labels onto [`Family`].
    ///
    /// Blank entries are dropped; trailing ` — description` annotations are
    /// stripped by [`SearchQuery::new`].
    pub fn normalize(&self) -> Vec<SearchQuery> {
        match self {
            Self::ByFamily(map) => map
                .iter()
                .flat_map(|(label, items)| {
                    let family = Family::from_label(label);
                    items.iter().filter_map(move |q| SearchQuery::new(family, q))
                })
                .collect(),
            Self::Tagged(items) => items
                .iter()
                .filter_map(|item| {
                    let family = item
                        .family
                        .as_deref()
                        .map_or(Family::Misc, Family::from_label);
                    SearchQuery::new(family, &item.text)
                })
                .collect(),
            Self::Plain(items) => items
                .iter()
                .filter_map(|q| SearchQuery::new(Family::Misc, q))
                .collect(),
        }
    }

    /// Merge several specs into one by-family map, keeping first-seen order
    /// inside each family.
    pub fn merge<'a>(specs: impl IntoIterator<Item = &'a QuerySpec>) -> QuerySpec {
        let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for spec in specs {
            for query in spec.normalize() {
                merged
                    .entry(query.family.name().to_owned())
                    .or_default()
                    .push(query.text);
            }
        }
        QuerySpec::ByFamily(merged)
    }

    /// JSON rendering handed to the verifier prompt.
    pub fn to_value(&self) -> Value {
        match self {
            Self::ByFamily(map) => serde_json::json!(map),
            Self::Tagged(items) => Value::Array(
                items
                    .iter()
                    .map(|i| serde_json::json!({"family": i.family, "q": i.text}))
                    .collect(),
            ),
            Self::Plain(items) => serde_json::json!(items),
        }
    }
}

/// Drop case-insensitive duplicates within each family, then cap the total
/// by taking one query per family in turn.
///
/// Families are visited in order of first appearance and keep their own
/// order, so a long family never crowds out the others.
pub fn dedupe_queries(queries: Vec<SearchQuery>, max: usize) -> Vec<SearchQuery> {
    let mut seen = HashSet::new();
    let mut by_family: Vec<(Family, VecDeque<SearchQuery>)> = Vec::new();
    for query in queries {
        if !seen.insert((query.family, query.text.to_lowercase())) {
            continue;
        }
        match by_family.iter_mut().find(|(family, _)| *family == query.family) {
            Some((_, queue)) => queue.push_back(query),
            None => by_family.push((query.family, VecDeque::from([query]))),
        }
    }

    let mut picked = Vec::with_capacity(max.min(seen.len()));
    while picked.len() < max {
        let before = picked.len();
        for (_, queue) in &mut by_family {
            if picked.len() == max {
                break;
            }
            if let Some(query) = queue.pop_front() {
                picked.push(query);
            }
        }
        if picked.len() == before {
            break;
        }
    }
    if picked.len() < seen.len() {
        tracing::debug!(kept = picked.len(), dropped = seen.len() - picked.len(), "query cap reached");
    }
    picked
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Items under one family key: strings, or objects carrying `q`/`query`.
fn family_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => query_text(item),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn tagged(item: &Value) -> Option<TaggedQuery> {
    match item {
        Value::String(s) => Some(TaggedQuery {
            family: None,
            text: s.clone(),
        }),
        Value::Object(_) => Some(TaggedQuery {
            family: item.get("family").and_then(Value::as_str).map(str::to_owned),
            text: query_text(item)?,
        }),
        _ => None,
    }
}

fn query_text(item: &Value) -> Option<String> {
    item.get("q")
        .or_else(|| item.get("query"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn brief_falls_back_to_question() {
        let brief = Brief::from_value(json!({}), "  Quel régime pour les plus-values ?  ");
        assert_eq!(brief.issue, "Quel régime pour les plus-values ?");
        assert!(brief.is_bare());

        let brief = Brief::from_value(json!("not an object"), "Q");
        assert_eq!(brief.issue, "Q");
    }

    #[test]
    fn brief_keeps_extra_fields() {
        let brief = Brief::from_value(
            json!({
                "issue": "Plus-values de cession",
                "key_terms": ["150-0 A", "", 3],
                "scope": {"impot": "IR"}
            }),
            "Q",
        );
        assert_eq!(brief.issue, "Plus-values de cession");
        assert_eq!(brief.key_terms, vec!["150-0 A"]);
        assert_eq!(brief.details.get("scope"), Some(&json!({"impot": "IR"})));
        assert!(brief.to_prompt_json().contains("\"impot\""));
    }

    #[test]
    fn routing_decision_accepts_both_selection_keys() {
        let a = RoutingDecision::from_value(&json!({
            "scores": {"AGENT_IS": 0.9, "AGENT_TVA": "high"},
            "selected_agents": ["AGENT_IS", 4]
        }));
        assert_eq!(a.scores.len(), 1);
        assert_eq!(a.selected, Some(vec!["AGENT_IS".to_owned()]));

        let b = RoutingDecision::from_value(&json!({"selected": []}));
        assert_eq!(b.selected, Some(vec![]));

        let c = RoutingDecision::from_value(&json!({"scores": {"X": 0.7}}));
        assert!(c.selected.is_none());
    }

    #[test]
    fn query_spec_by_family_map() {
        let spec = QuerySpec::from_value(&json!({
            "textes_legaux": ["Article 150-0 B ter CGI — report d'imposition", " "],
            "bofip": [{"q": "BOI-RPPM-PVBMI-30-10-60"}],
            "autres": "apport-cession"
        }))
        .expect("spec");
        let queries = spec.normalize();
        assert_eq!(queries.len(), 3);
        assert!(queries.contains(&SearchQuery {
            family: Family::Statute,
            text: "Article 150-0 B ter CGI".into()
        }));
        assert!(queries.contains(&SearchQuery {
            family: Family::Doctrine,
            text: "BOI-RPPM-PVBMI-30-10-60".into()
        }));
        assert!(queries.contains(&SearchQuery {
            family: Family::Misc,
            text: "apport-cession".into()
        }));
    }

    #[test]
    fn query_spec_tagged_and_plain_lists() {
        let tagged = QuerySpec::from_value(&json!([
            {"family": "doctrine", "q": "BOI-IS-BASE"},
            {"family": "jurisprudence", "query": "CE 2019 Sté X"},
            {"family": "loi"},
            "site:legifrance.gouv.fr article 209 B",
            42
        ]))
        .expect("spec");
        assert!(matches!(tagged, QuerySpec::Tagged(ref items) if items.len() == 3));
        let families: Vec<Family> = tagged.normalize().iter().map(|q| q.family).collect();
        assert_eq!(families, vec![Family::Doctrine, Family::CaseLaw, Family::Misc]);

        let plain = QuerySpec::from_value(&json!(["a", "b"])).expect("spec");
        assert!(matches!(plain, QuerySpec::Plain(_)));
        assert_eq!(plain.normalize().len(), 2);

        assert!(QuerySpec::from_value(&json!("text")).is_none());
        assert!(QuerySpec::from_value(&json!({})).expect("spec").is_empty());
    }

    #[test]
    fn merge_groups_by_family() {
        let a = QuerySpec::Plain(vec!["x".into()]);
        let b = QuerySpec::ByFamily(BTreeMap::from([(
            "loi".to_owned(),
            vec!["Article 1A".to_owned()],
        )]));
        let merged = QuerySpec::merge([&a, &b]);
        let QuerySpec::ByFamily(map) = &merged else {
            panic!("expected by-family map");
        };
        assert_eq!(map.get("misc"), Some(&vec!["x".to_owned()]));
        assert_eq!(map.get("statute"), Some(&vec!["Article 1A".to_owned()]));
        assert_eq!(merged.normalize().len(), 2);
    }

    #[test]
    fn dedupe_is_case_insensitive_per_family() {
        let queries = vec![
            SearchQuery::new(Family::Statute, "Article 4 B").expect("q"),
            SearchQuery::new(Family::Statute, "article 4 b").expect("q"),
            SearchQuery::new(Family::Doctrine, "article 4 b").expect("q"),
            SearchQuery::new(Family::Misc, "autre").expect("q"),
        ];
        let out = dedupe_queries(queries, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "Article 4 B");
        assert_eq!(out[1].family, Family::Doctrine);
    }

    #[test]
    fn query_cap_keeps_every_family_and_the_generator() {
        let specialists: Vec<QuerySpec> = (0..4)
            .map(|agent| {
                let refs = |kind: &str| -> Vec<String> {
                    (0..3).map(|n| format!("{kind} {agent}-{n}")).collect()
                };
                QuerySpec::ByFamily(BTreeMap::from([
                    ("textes_legaux".to_owned(), refs("Article")),
                    ("bofip".to_owned(), refs("BOI")),
                    ("jurisprudence".to_owned(), refs("CE")),
                    ("autres".to_owned(), refs("Réponse ministérielle")),
                ]))
            })
            .collect();
        let generated = QuerySpec::Plain(vec!["plus-value apport-cession holding".into()]);

        let mut queries = generated.normalize();
        queries.extend(QuerySpec::merge(&specialists).normalize());
        assert_eq!(queries.len(), 49);

        let out = dedupe_queries(queries, 24);
        assert_eq!(out.len(), 24);
        for family in [Family::Statute, Family::Doctrine, Family::CaseLaw, Family::Misc] {
            assert_eq!(out.iter().filter(|q| q.family == family).count(), 6, "{family}");
        }
        assert!(out.iter().any(|q| q.text == "plus-value apport-cession holding"));
    }

    #[test]
    fn query_cap_interleaves_families_in_first_seen_order() {
        let q = |family, text| SearchQuery::new(family, text).expect("q");
        let queries = vec![
            q(Family::Doctrine, "d1"),
            q(Family::Doctrine, "d2"),
            q(Family::Doctrine, "d3"),
            q(Family::Statute, "s1"),
        ];
        let texts: Vec<String> = dedupe_queries(queries.clone(), 3)
            .into_iter()
            .map(|q| q.text)
            .collect();
        assert_eq!(texts, vec!["d1", "s1", "d2"]);
        assert_eq!(dedupe_queries(queries, 10).len(), 4);
    }
}
