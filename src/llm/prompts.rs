//! Role prompts and their rendering.
//!
//! Prompt text is content, not code: deployments point the `[prompts]`
//! section at their own files. The built-in prompts are short working
//! defaults. Templates use `{{name}}` placeholders.

use std::collections::HashMap;
use std::path::Path;

use fisca_search::EnrichedDocument;

use crate::config::{ProducerSpec, PromptsConfig};
use crate::error::{PipelineError, Result};

const CLASSIFY: &str = "Tu es fiscaliste senior en France. Reformule la question de l'utilisateur \
en un brief JSON : {\"issue\": \"...\", \"scope\": {\"impot\": \"...\", \"periode\": \"...\"}, \
\"key_terms\": [\"...\"], \"exclusions\": [\"...\"]}. Réponds uniquement en JSON.";

const ROUTE: &str = "Tu orientes des questions fiscales vers des experts. Experts disponibles :\n\
{{producers}}\n\nBrief de l'analyste :\n{{brief}}\n\n\
Attribue un score entre 0 et 1 à chaque expert et sélectionne de 1 à {{max_producers}} experts \
(score >= 0.6 en priorité). Si la question ne relève pas de la fiscalité, ne sélectionne personne. \
Réponds uniquement en JSON : {\"scores\": {\"NOM\": 0.0}, \"selected\": [\"NOM\"]}.";

const SPECIALIST: &str = "Tu es l'expert {{producer}} ({{description}}). À partir du brief \
ci-dessous, liste les sources juridiques précises à consulter, par catégorie. \
Format de chaque entrée : \"Référence — intitulé\".\n\nBrief :\n{{brief}}\n\n\
Réponds uniquement en JSON : {\"textes_legaux\": [], \"bofip\": [], \"jurisprudence\": [], \"autres\": []}.";

const QUERY_GENERATOR: &str = "Tu génères des requêtes de recherche web pour trouver des sources \
officielles répondant à la question. Domaines autorisés : {{domains}}.\n\nBrief :\n{{brief}}\n\n\
Réponds uniquement en JSON : [{\"family\": \"statute|doctrine|case_law|legislative_record|commercial\", \"q\": \"...\"}].";

const VERIFY: &str = "Tu vérifies une liste de sources proposées par des experts. Supprime les \
doublons, les références inexistantes ou hors sujet, et corrige les intitulés.\n\n\
Brief :\n{{brief}}\n\nSources proposées :\n{{sources}}\n\n\
Réponds uniquement en JSON avec les mêmes catégories.";

const GENERATE: &str = "Tu es un expert fiscaliste senior. Rédige une consultation claire et \
précise en Markdown à partir des sources fournies. Cite les articles et références utilisés. \
Pour une source sans contenu, appuie-toi sur son titre et son extrait.\n\n\
Brief :\n{{brief}}\n\nSources :\n{{documents}}\n\n\
Réponds uniquement en JSON : {\"question\": \"...\", \"reponse_redigee\": \"...\", \"points_cles\": [\"...\"]}.";

/// The prompt set used by the collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompts {
    /// Classification.
    pub classify: String,
    /// Routing.
    pub route: String,
    /// Shared specialist prompt.
    pub specialist: String,
    /// Query generation.
    pub query_generator: String,
    /// Verification of merged sources.
    pub verify: String,
    /// Answer generation.
    pub generate: String,
    /// Per-producer specialist prompts, by producer name.
    pub producer_overrides: HashMap<String, String>,
}

impl Default for Prompts {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Prompts {
    /// The built-in prompts.
    pub fn builtin() -> Self {
        Self {
            classify: CLASSIFY.into(),
            route: ROUTE.into(),
            specialist: SPECIALIST.into(),
            query_generator: QUERY_GENERATOR.into(),
            verify: VERIFY.into(),
            generate: GENERATE.into(),
            producer_overrides: HashMap::new(),
        }
    }

    /// Load configured prompt files over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a configured file cannot be
    /// read or is empty.
    pub fn load(config: &PromptsConfig, producers: &[ProducerSpec]) -> Result<Self> {
        let mut prompts = Self::builtin();
        let slots = [
            (&config.classify, &mut prompts.classify),
            (&config.route, &mut prompts.route),
            (&config.specialist, &mut prompts.specialist),
            (&config.query_generator, &mut prompts.query_generator),
            (&config.verify, &mut prompts.verify),
            (&config.generate, &mut prompts.generate),
        ];
        for (path, slot) in slots {
            if let Some(path) = path {
                *slot = read_prompt(&config.resolve(path))?;
            }
        }
        for producer in producers {
            if let Some(path) = &producer.prompt {
                prompts
                    .producer_overrides
                    .insert(producer.name.clone(), read_prompt(&config.resolve(path))?);
            }
        }
        Ok(prompts)
    }

    /// The specialist template for `producer`.
    pub fn specialist_for(&self, producer: &str) -> &str {
        self.producer_overrides
            .get(producer)
            .map_or(self.specialist.as_str(), String::as_str)
    }
}

fn read_prompt(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Config(format!("cannot read prompt {}: {e}", path.display()))
    })?;
    if text.trim().is_empty() {
        return Err(PipelineError::Config(format!(
            "prompt {} is empty",
            path.display()
        )));
    }
    Ok(text)
}

/// Replace every `{{key}}` in `template`. Unknown placeholders are left as is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_owned(), |text, (key, value)| {
        text.replace(&format!("{{{{{key}}}}}"), value)
    })
}

/// One line per producer: `- NAME : description`.
pub fn producer_list(producers: &[ProducerSpec]) -> String {
    producers
        .iter()
        .map(|p| format!("- {} : {}", p.name, p.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Evidence block handed to generation: title, domain, content excerpt and
/// snippet per document, separated by `---`.
///
/// Content is cut at `excerpt_chars` characters, with `...` appended when
/// cut. Empty content is kept so the model can still cite title and snippet.
pub fn documents_context(documents: &[EnrichedDocument], excerpt_chars: usize) -> String {
    documents
        .iter()
        .map(|doc| {
            let candidate = &doc.scored.document;
            let title = if candidate.title.is_empty() {
                candidate.url.as_str()
            } else {
                candidate.title.as_str()
            };
            let excerpt: String = doc.content.chars().take(excerpt_chars).collect();
            let ellipsis = if doc.content.chars().count() > excerpt_chars {
                "..."
            } else {
                ""
            };
            format!(
                "TITRE: {title}\nURL: {}\nDOMAINE SOURCE: {}\nCONTENU:\n{excerpt}{ellipsis}\nSNIPPET:\n{}",
                candidate.url, candidate.domain, candidate.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fisca_search::{CandidateDocument, Family, Provenance, ScoredDocument};
    use std::path::PathBuf;

    fn doc(title: &str, content: &str) -> EnrichedDocument {
        EnrichedDocument {
            scored: ScoredDocument {
                document: CandidateDocument {
                    url: "https://bofip.impots.gouv.fr/bofip/1".into(),
                    title: title.into(),
                    snippet: "extrait".into(),
                    domain: "bofip.impots.gouv.fr".into(),
                    family: Family::Doctrine,
                    query: "q".into(),
                    date: None,
                },
                score: 0.6,
                retained: true,
            },
            content: content.into(),
            provenance: Provenance::Generic,
        }
    }

    #[test]
    fn render_replaces_known_placeholders() {
        let out = render("Q: {{question}} / {{brief}} / {{unknown}} {\"a\": 1}", &[
            ("question", "TVA ?"),
            ("brief", "{}"),
        ]);
        assert_eq!(out, "Q: TVA ? / {} / {{unknown}} {\"a\": 1}");
    }

    #[test]
    fn builtin_prompts_carry_their_placeholders() {
        let p = Prompts::builtin();
        assert!(p.route.contains("{{producers}}"));
        assert!(p.specialist.contains("{{producer}}"));
        assert!(p.generate.contains("{{documents}}"));
        assert!(p.verify.contains("{{sources}}"));
    }

    #[test]
    fn load_overrides_from_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("route.md"), "ROUTE {{brief}}").expect("write");
        std::fs::write(dir.path().join("tva.md"), "TVA {{brief}}").expect("write");

        let config = PromptsConfig {
            dir: Some(dir.path().to_path_buf()),
            route: Some(PathBuf::from("route.md")),
            ..Default::default()
        };
        let mut tva = ProducerSpec::new("AGENT_TVA", "TVA");
        tva.prompt = Some(PathBuf::from("tva.md"));
        let other = ProducerSpec::new("AGENT_IS", "IS");

        let prompts = Prompts::load(&config, &[tva, other]).expect("prompts");
        assert_eq!(prompts.route, "ROUTE {{brief}}");
        assert_eq!(prompts.classify, CLASSIFY);
        assert_eq!(prompts.specialist_for("AGENT_TVA"), "TVA {{brief}}");
        assert_eq!(prompts.specialist_for("AGENT_IS"), SPECIALIST);
    }

    #[test]
    fn missing_or_empty_prompt_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("empty.md"), "  \n").expect("write");

        let missing = PromptsConfig {
            generate: Some(dir.path().join("nope.md")),
            ..Default::default()
        };
        assert!(matches!(Prompts::load(&missing, &[]), Err(PipelineError::Config(_))));

        let empty = PromptsConfig {
            generate: Some(dir.path().join("empty.md")),
            ..Default::default()
        };
        assert!(matches!(Prompts::load(&empty, &[]), Err(PipelineError::Config(_))));
    }

    #[test]
    fn documents_context_truncates_by_characters() {
        let text = "é".repeat(10);
        let ctx = documents_context(&[doc("BOI-TVA", &text), doc("", "")], 4);
        let blocks: Vec<&str> = ctx.split("\n\n---\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("TITRE: BOI-TVA"));
        assert!(blocks[0].contains("CONTENU:\néééé...\n"));
        assert!(blocks[1].contains("TITRE: https://bofip.impots.gouv.fr/bofip/1"));
        assert!(blocks[1].contains("SNIPPET:\nextrait"));
    }
}
