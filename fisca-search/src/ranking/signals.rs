//! Table-driven ranking signals: authority, family fit, canonical
//! identifiers and the generic-title penalty.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use crate::allowlist::host_matches;
use crate::config::RankingConfig;
use crate::error::SearchError;
use crate::types::Family;

/// Map `value` onto `[0, 1]` within `(min, max)`.
pub fn min_max(value: f64, (min, max): (f64, f64)) -> f64 {
    if max <= min {
        return 0.5;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

fn compile(pattern: &str) -> Result<Regex, SearchError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| SearchError::Config(format!("invalid ranking pattern {pattern:?}: {e}")))
}

/// Ranking tables compiled from [`RankingConfig`].
#[derive(Debug, Clone)]
pub struct Signals {
    authority: Vec<(String, f64)>,
    authority_range: (f64, f64),
    family_weights: HashMap<Family, f64>,
    family_range: (f64, f64),
    intent: HashMap<Family, Vec<Regex>>,
    intent_boost: f64,
    canonical: Vec<Regex>,
    generic_phrases: Vec<String>,
    min_title_chars: usize,
}

/// Outcome of the title check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitlePenalty {
    /// Penalty to subtract from the score.
    pub amount: f64,
    /// Whether the title contains a non-content phrase.
    pub generic: bool,
}

impl Signals {
    /// Compile the tables, rejecting unknown family names and bad regexes.
    pub fn new(config: &RankingConfig) -> Result<Self, SearchError> {
        let family_key = |name: &str| -> Result<Family, SearchError> {
            Family::all()
                .iter()
                .copied()
                .find(|f| f.name() == name)
                .ok_or_else(|| SearchError::Config(format!("unknown family in ranking config: {name}")))
        };

        // Longest entries first so the most specific domain wins.
        let mut authority: Vec<(String, f64)> = config
            .authority
            .iter()
            .map(|(d, w)| (d.trim().to_lowercase(), *w))
            .collect();
        authority.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let mut family_weights = HashMap::new();
        for (name, weight) in &config.family_weights {
            family_weights.insert(family_key(name)?, *weight);
        }

        let mut intent = HashMap::new();
        for (name, patterns) in &config.intent_patterns {
            let compiled = patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>, _>>()?;
            intent.insert(family_key(name)?, compiled);
        }

        for name in config.family_caps.keys() {
            family_key(name)?;
        }

        let canonical = config
            .canonical_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            authority,
            authority_range: config.authority_range,
            family_weights,
            family_range: config.family_range,
            intent,
            intent_boost: config.intent_boost,
            canonical,
            generic_phrases: config
                .generic_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            min_title_chars: config.min_title_chars,
        })
    }

    /// Normalised authority of `domain`; unknown domains get the midpoint.
    pub fn authority(&self, domain: &str) -> f64 {
        let (min, max) = self.authority_range;
        let weight = self
            .authority
            .iter()
            .find(|(entry, _)| host_matches(domain, entry))
            .map(|(_, w)| *w)
            .unwrap_or((min + max) / 2.0);
        min_max(weight, self.authority_range)
    }

    /// Normalised family weight plus the intent boost, capped at 1.
    pub fn family_fit(&self, family: Family, query: &str) -> f64 {
        let (min, max) = self.family_range;
        let weight = self
            .family_weights
            .get(&family)
            .copied()
            .unwrap_or((min + max) / 2.0);
        let base = min_max(weight, self.family_range);
        let boosted = self
            .intent
            .get(&family)
            .is_some_and(|patterns| patterns.iter().any(|re| re.is_match(query)));
        let boost = if boosted { self.intent_boost } else { 0.0 };
        (base + boost).min(1.0)
    }

    /// Whether title, snippet or URL carries a canonical identifier.
    pub fn has_canonical_id(&self, title: &str, snippet: &str, url: &str) -> bool {
        let text = format!("{title} {snippet} {url}");
        self.canonical.iter().any(|re| re.is_match(&text))
    }

    /// Short-title and non-content-phrase penalties.
    pub fn title_penalty(&self, title: &str, short_penalty: f64, generic_penalty: f64) -> TitlePenalty {
        let t = title.trim().to_lowercase();
        let mut amount = 0.0;
        if t.chars().count() < self.min_title_chars {
            amount += short_penalty;
        }
        let generic = self.generic_phrases.iter().any(|p| t.contains(p.as_str()));
        if generic {
            amount += generic_penalty;
        }
        TitlePenalty { amount, generic }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> Signals {
        Signals::new(&RankingConfig::default()).expect("signals")
    }

    #[test]
    fn min_max_maps_and_clamps() {
        assert!((min_max(0.85, (0.7, 1.0)) - 0.5).abs() < 1e-9);
        assert_eq!(min_max(2.0, (0.7, 1.0)), 1.0);
        assert_eq!(min_max(0.0, (0.7, 1.0)), 0.0);
        assert_eq!(min_max(1.0, (1.0, 1.0)), 0.5);
    }

    #[test]
    fn authority_known_subdomain_and_unknown() {
        let s = signals();
        assert_eq!(s.authority("legifrance.gouv.fr"), 1.0);
        assert_eq!(s.authority("api.legifrance.gouv.fr"), 1.0);
        assert!((s.authority("impots.gouv.fr") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn most_specific_authority_entry_wins() {
        let mut config = RankingConfig::default();
        config.authority.insert("gouv.fr".into(), 0.7);
        let s = Signals::new(&config).expect("signals");
        assert_eq!(s.authority("bofip.impots.gouv.fr"), 1.0);
        assert_eq!(s.authority("service-public.gouv.fr"), 0.0);
    }

    #[test]
    fn family_fit_with_intent_boost() {
        let s = signals();
        let plain = s.family_fit(Family::Doctrine, "plus-value apport");
        let boosted = s.family_fit(Family::Doctrine, "BOI-RPPM-PVBMI-30-10-60 apport");
        assert!((plain - (0.95 - 0.7) / 0.3).abs() < 1e-9);
        assert!((boosted - plain - 0.10).abs() < 1e-9);
        assert_eq!(s.family_fit(Family::Statute, "article 150-0 B ter du CGI"), 1.0);
    }

    #[test]
    fn intent_patterns_only_boost_their_family() {
        let s = signals();
        let a = s.family_fit(Family::CaseLaw, "bofip apport");
        let b = s.family_fit(Family::CaseLaw, "apport");
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_family_gets_midpoint() {
        let s = signals();
        assert!((s.family_fit(Family::Misc, "q") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn canonical_identifiers_detected() {
        let s = signals();
        assert!(s.has_canonical_id("", "", "https://legifrance.gouv.fr/LEGIARTI000036428074"));
        assert!(s.has_canonical_id("BOI-RPPM-PVBMI-30-10-60", "", ""));
        assert!(s.has_canonical_id("", "ECLI:FR:CECHR:2023:462123.20231005", ""));
        assert!(s.has_canonical_id("Décision n° 2023-1045", "", ""));
        assert!(!s.has_canonical_id("Plus-values mobilières", "régime général", "https://x.gouv.fr/a"));
    }

    #[test]
    fn short_and_generic_titles_penalised() {
        let s = signals();
        let p = s.title_penalty("Accueil", 0.03, 0.05);
        assert!((p.amount - 0.08).abs() < 1e-9);
        assert!(p.generic);

        let p = s.title_penalty("Plan du site de Légifrance", 0.03, 0.05);
        assert!((p.amount - 0.05).abs() < 1e-9);

        let p = s.title_penalty("Article 150-0 B ter", 0.03, 0.05);
        assert_eq!(p.amount, 0.0);
        assert!(!p.generic);
    }

    #[test]
    fn unknown_family_name_rejected() {
        let mut config = RankingConfig::default();
        config.family_weights.insert("weather".into(), 1.0);
        let err = Signals::new(&config).unwrap_err();
        assert!(err.to_string().contains("weather"));
    }

    #[test]
    fn invalid_regex_rejected() {
        let config = RankingConfig {
            canonical_patterns: vec!["(unclosed".into()],
            ..Default::default()
        };
        assert!(matches!(Signals::new(&config), Err(SearchError::Config(_))));
    }
}
