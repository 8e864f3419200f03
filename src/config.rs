//! Configuration types for fisca.
//!
//! One TOML file maps onto [`AppConfig`]. Every section has defaults, so a
//! partial file (or none at all) works. The file is loaded and validated
//! once at startup, then shared read-only behind an `Arc`. Credentials are
//! never stored in the file: it names the environment variables that hold
//! them.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fisca_search::engines::{DuckDuckGoBackend, GoogleCseBackend, SerpApiBackend};
use fisca_search::{
    Aggregator, AllowList, EnrichConfig, RankingConfig, SearchBackend, SearchConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Domains searched by default: statutes, tax doctrine, courts,
/// parliament and one commercial publisher.
pub const OFFICIAL_DOMAINS: &[&str] = &[
    "legifrance.gouv.fr",
    "bofip.impots.gouv.fr",
    "conseil-etat.fr",
    "courdecassation.fr",
    "conseil-constitutionnel.fr",
    "assemblee-nationale.fr",
    "senat.fr",
    "vie-publique.fr",
    "fiscalonline.com",
];

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Aggregator behaviour.
    pub search: SearchConfig,
    /// Allow-list and backend order.
    pub sources: SourcesConfig,
    /// Ranking weights and tables.
    pub ranking: RankingConfig,
    /// Content enrichment chain.
    pub enrichment: EnrichConfig,
    /// Orchestrator thresholds and limits.
    pub pipeline: PipelineConfig,
    /// Producers the router can select.
    pub routing: RoutingConfig,
    /// Language-model service.
    pub llm: LlmConfig,
    /// Prompt files.
    pub prompts: PromptsConfig,
}

/// Where results may come from and which backends are asked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Trusted domains; results from anywhere else are discarded.
    pub allow_list: Vec<String>,
    /// Backends, tried in this order for every query.
    pub backends: Vec<BackendSettings>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            allow_list: OFFICIAL_DOMAINS.iter().map(|d| (*d).to_owned()).collect(),
            backends: vec![BackendSettings::serpapi(), BackendSettings::DuckDuckGo],
        }
    }
}

/// One search backend and where its credentials live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSettings {
    /// Paid SERP API.
    #[serde(rename = "serpapi")]
    SerpApi {
        /// Environment variable holding the API key.
        #[serde(default = "default_serpapi_key_env")]
        api_key_env: String,
        /// Endpoint override.
        #[serde(default)]
        base_url: Option<String>,
    },
    /// Google Custom Search JSON API.
    GoogleCse {
        /// Environment variable holding the API key.
        #[serde(default = "default_google_key_env")]
        api_key_env: String,
        /// Environment variable holding the search engine id.
        #[serde(default = "default_google_cse_env")]
        engine_id_env: String,
        /// Endpoint override.
        #[serde(default)]
        base_url: Option<String>,
    },
    /// DuckDuckGo HTML scrape; needs no credentials.
    #[serde(rename = "duckduckgo")]
    DuckDuckGo,
}

fn default_serpapi_key_env() -> String {
    "SERPAPI_API_KEY".into()
}

fn default_google_key_env() -> String {
    "GOOGLE_API_KEY".into()
}

fn default_google_cse_env() -> String {
    "GOOGLE_CSE_ID".into()
}

impl BackendSettings {
    /// SerpApi with the default key variable.
    pub fn serpapi() -> Self {
        Self::SerpApi {
            api_key_env: default_serpapi_key_env(),
            base_url: None,
        }
    }

    /// Google CSE with the default key and engine variables.
    pub fn google_cse() -> Self {
        Self::GoogleCse {
            api_key_env: default_google_key_env(),
            engine_id_env: default_google_cse_env(),
            base_url: None,
        }
    }

    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SerpApi { .. } => "serpapi",
            Self::GoogleCse { .. } => "google_cse",
            Self::DuckDuckGo => "duckduckgo",
        }
    }
}

/// Orchestrator thresholds and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First-pass score threshold.
    pub t_high: f64,
    /// Relaxed threshold, used once when the first pass keeps nothing.
    pub t_low: f64,
    /// Maximum documents sent to enrichment.
    pub max_documents: usize,
    /// Maximum search queries per run, after deduplication.
    pub max_queries: usize,
    /// Time budget in seconds for one producer (specialist or query generator).
    pub producer_timeout_seconds: u64,
    /// Run the query generator alongside the selected specialists.
    pub query_generator: bool,
    /// Ask the verifier to clean the merged source list.
    pub verify: bool,
    /// Characters of each document's content handed to generation.
    pub excerpt_chars: usize,
    /// Terminal answer when routing selects no producer.
    pub out_of_scope_message: String,
    /// Terminal answer when no document survives the relaxed threshold.
    pub no_evidence_message: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            t_high: 0.45,
            t_low: 0.30,
            max_documents: 12,
            max_queries: 24,
            producer_timeout_seconds: 90,
            query_generator: true,
            verify: true,
            excerpt_chars: 5000,
            out_of_scope_message: "Cette question ne relève pas de la fiscalité française ou ne peut \
                être rattachée à aucun domaine d'expertise. Merci de la reformuler."
                .into(),
            no_evidence_message: "Je n'ai trouvé aucune source pertinente pour répondre à votre \
                question fiscale. Merci de reformuler ou de préciser votre demande."
                .into(),
        }
    }
}

/// A specialist the router can select.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerSpec {
    /// Name the router refers to, e.g. `AGENT_TVA_INDIRECTES`.
    pub name: String,
    /// Competence summary shown to the router.
    pub description: String,
    /// Prompt file overriding the shared specialist prompt.
    #[serde(default)]
    pub prompt: Option<PathBuf>,
}

impl ProducerSpec {
    /// A producer using the shared specialist prompt.
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prompt: None,
        }
    }
}

/// Producers and selection limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Known producers.
    pub producers: Vec<ProducerSpec>,
    /// Upper bound on selected producers.
    pub max_producers: usize,
    /// Score needed when the router gives scores but no explicit selection.
    pub min_score: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            producers: vec![
                ProducerSpec::new(
                    "AGENT_PARTICULIERS_REVENUS",
                    "IR, revenus catégoriels, plus-values de titres des particuliers",
                ),
                ProducerSpec::new("AGENT_TVA_INDIRECTES", "TVA, taxes indirectes"),
                ProducerSpec::new(
                    "AGENT_ENTREPRISES_IS",
                    "IS, résultat fiscal, intégration fiscale, dividendes",
                ),
                ProducerSpec::new(
                    "AGENT_PATRIMOINE_TRANSMISSION",
                    "successions, donations, IFI, démembrement",
                ),
                ProducerSpec::new(
                    "AGENT_STRUCTURES_MONTAGES",
                    "abus de droit, restructurations, montages",
                ),
                ProducerSpec::new(
                    "AGENT_INTERNATIONAL",
                    "résidence fiscale, exit tax, conventions, établissement stable",
                ),
                ProducerSpec::new(
                    "AGENT_DROIT_EUROPEEN",
                    "conformité UE, CJUE, libertés fondamentales, directives",
                ),
                ProducerSpec::new(
                    "AGENT_IMMOBILIER_URBANISME",
                    "TVA immobilière, marchands de biens, DMTO",
                ),
                ProducerSpec::new(
                    "AGENT_PROCEDURE_CONTENTIEUX",
                    "preuve, prescription, contrôle fiscal, contentieux",
                ),
                ProducerSpec::new("AGENT_TAXES_LOCALES", "taxe foncière, CFE, taxes locales"),
                ProducerSpec::new(
                    "AGENT_PRELEVEMENTS_SOCIAUX",
                    "CSG, CRDS, prélèvements sociaux",
                ),
            ],
            max_producers: 4,
            min_score: 0.6,
        }
    }
}

/// OpenAI-compatible chat completions service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL; `/v1/chat/completions` is appended.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Default model.
    pub model: String,
    /// Per-role model overrides (`classify`, `route`, `specialist`,
    /// `query_generator`, `verify`, `generate`).
    pub models: BTreeMap<String, String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token limit.
    pub max_tokens: Option<u32>,
    /// Time budget in seconds for one call.
    pub timeout_seconds: u64,
    /// Retries on retryable errors.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            model: "gpt-4o".into(),
            models: BTreeMap::new(),
            temperature: 0.0,
            max_tokens: None,
            timeout_seconds: 120,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    /// The model to use for `role`.
    pub fn model_for(&self, role: &str) -> &str {
        self.models.get(role).map_or(self.model.as_str(), String::as_str)
    }
}

/// Prompt files. Relative paths resolve against `dir`; unset entries use
/// the built-in prompts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Base directory for relative prompt paths.
    pub dir: Option<PathBuf>,
    /// Classification prompt.
    pub classify: Option<PathBuf>,
    /// Routing prompt.
    pub route: Option<PathBuf>,
    /// Shared specialist prompt.
    pub specialist: Option<PathBuf>,
    /// Query generator prompt.
    pub query_generator: Option<PathBuf>,
    /// Verifier prompt.
    pub verify: Option<PathBuf>,
    /// Answer generation prompt.
    pub generate: Option<PathBuf>,
}

impl PromptsConfig {
    /// Resolve `path` against `dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/fisca/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fisca")
            .join("config.toml")
    }

    /// Load from `path`, or from the default path when `None`, then validate.
    ///
    /// A missing file at the default path means "use defaults"; a missing
    /// file that was asked for explicitly is an error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] or [`PipelineError::Io`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    tracing::info!(path = %default.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every section. Credentials are checked by
    /// [`build_backends`](Self::build_backends).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.ranking.validate()?;
        self.enrichment.validate()?;
        self.allow_list()?;

        if self.sources.backends.is_empty() {
            return Err(config_err("at least one search backend must be configured"));
        }

        let p = &self.pipeline;
        if !(0.0..=1.0).contains(&p.t_low) || !(0.0..=1.0).contains(&p.t_high) {
            return Err(config_err("thresholds must be within [0, 1]"));
        }
        if p.t_low >= p.t_high {
            return Err(config_err("t_low must be lower than t_high"));
        }
        if p.max_documents == 0 || p.max_queries == 0 {
            return Err(config_err("max_documents and max_queries must be greater than 0"));
        }
        if p.producer_timeout_seconds == 0 {
            return Err(config_err("producer_timeout_seconds must be greater than 0"));
        }
        if p.excerpt_chars == 0 {
            return Err(config_err("excerpt_chars must be greater than 0"));
        }

        let r = &self.routing;
        if r.producers.is_empty() {
            return Err(config_err("at least one producer must be configured"));
        }
        let mut names = HashSet::new();
        for producer in &r.producers {
            if producer.name.trim().is_empty() {
                return Err(config_err("producer names must not be empty"));
            }
            if !names.insert(producer.name.to_uppercase()) {
                return Err(config_err(&format!("duplicate producer '{}'", producer.name)));
            }
        }
        if r.max_producers == 0 {
            return Err(config_err("max_producers must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&r.min_score) {
            return Err(config_err("min_score must be within [0, 1]"));
        }

        if self.llm.timeout_seconds == 0 {
            return Err(config_err("llm timeout_seconds must be greater than 0"));
        }
        if url::Url::parse(&self.llm.base_url).is_err() {
            return Err(config_err(&format!(
                "llm base_url is not a valid URL: {}",
                self.llm.base_url
            )));
        }
        Ok(())
    }

    /// The compiled allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the list is empty.
    pub fn allow_list(&self) -> Result<AllowList> {
        Ok(AllowList::new(&self.sources.allow_list)?)
    }

    /// Build the configured backends in order, reading credentials through
    /// `env` (normally [`env_var`]).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the first missing variable.
    pub fn build_backends(
        &self,
        client: &reqwest::Client,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<Arc<dyn SearchBackend>>> {
        let require = |var: &str, backend: &str| {
            env(var).ok_or_else(|| {
                config_err(&format!("{backend} is configured but {var} is not set"))
            })
        };
        let language = &self.search.language;
        let country = &self.search.country;

        self.sources
            .backends
            .iter()
            .map(|settings| {
                let backend: Arc<dyn SearchBackend> = match settings {
                    BackendSettings::SerpApi {
                        api_key_env,
                        base_url,
                    } => {
                        let mut b = SerpApiBackend::new(
                            client.clone(),
                            require(api_key_env, settings.name())?,
                        )
                        .with_locale(language.as_str(), country.as_str())
                        .with_exclude_pdf(self.search.exclude_pdf);
                        if let Some(url) = base_url {
                            b = b.with_base_url(url.as_str());
                        }
                        Arc::new(b)
                    }
                    BackendSettings::GoogleCse {
                        api_key_env,
                        engine_id_env,
                        base_url,
                    } => {
                        let mut b = GoogleCseBackend::new(
                            client.clone(),
                            require(api_key_env, settings.name())?,
                            require(engine_id_env, settings.name())?,
                        )
                        .with_locale(language.as_str(), country.as_str());
                        if let Some(url) = base_url {
                            b = b.with_base_url(url.as_str());
                        }
                        Arc::new(b)
                    }
                    BackendSettings::DuckDuckGo => Arc::new(DuckDuckGoBackend::new(client.clone())),
                };
                Ok(backend)
            })
            .collect()
    }

    /// Build the search aggregator over the configured backends.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] on an empty allow-list or a
    /// missing credential.
    pub fn build_aggregator(
        &self,
        client: &reqwest::Client,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Aggregator> {
        let backends = self.build_backends(client, env)?;
        Ok(Aggregator::new(
            backends,
            Arc::new(self.allow_list()?),
            self.search.clone(),
        ))
    }
}

/// Read a non-blank environment variable.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn config_err(message: &str) -> PipelineError {
    PipelineError::Config(message.to_owned())
}
