//! Fisca: answers French tax questions from official sources.
//!
//! A question goes through a fixed pipeline:
//! classify → route → specialists (parallel) → verify → search → rank →
//! threshold → enrich → generate
//!
//! # Architecture
//!
//! - **Collaborators** ([`llm`]): classification, routing, specialist
//!   lookups and answer generation against an OpenAI-compatible service
//! - **Structured output** ([`structured`]): tolerant parsing of model output
//! - **Search, ranking, enrichment**: the `fisca-search` crate
//! - **Orchestrator** ([`pipeline`]): scatter-gather over failure-prone
//!   stages, with adaptive thresholding and structured cancellation

pub mod brief;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod routing;
pub mod structured;

pub use brief::{Brief, QuerySpec, RoutingDecision};
pub use config::{AppConfig, PipelineConfig, ProducerSpec, RoutingConfig};
pub use error::{LlmError, PipelineError, Result};
pub use llm::{Collaborators, LanguageModel, LlmCollaborators};
pub use pipeline::{Answer, Pipeline, PipelineEvent, RunOptions, RunOutcome, Source};
pub use routing::Router;
