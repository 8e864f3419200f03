//! CLI binary for fisca.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use fisca::pipeline::{Pipeline, PipelineEvent, RunOptions, RunOutcome};
use fisca::pipeline::events::EventSink;
use fisca::AppConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fisca: answers French tax questions from official sources.
#[derive(Parser)]
#[command(name = "fisca", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Answer a question.
    Ask {
        /// The question, in French.
        question: String,

        /// Print the answer while it is generated.
        #[arg(long)]
        stream: bool,

        /// Print the outcome as JSON.
        #[arg(long, conflicts_with = "stream")]
        json: bool,
    },

    /// Validate the configuration and credentials, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the answer.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fisca=info,fisca_search=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Ask {
            question,
            stream,
            json,
        } => ask(&config, &question, stream, json).await,
        Command::CheckConfig => check_config(&config),
    }
}

async fn ask(config: &AppConfig, question: &str, stream: bool, json: bool) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config)?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, cancelling run...");
            cancel_clone.cancel();
        }
    });

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    // Resolves to whether any answer text reached stdout.
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        let mut printed = false;
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::Chunk(chunk) => {
                    printed = true;
                    let _ = write!(stdout, "{chunk}");
                    let _ = stdout.flush();
                }
                PipelineEvent::StageStarted(stage) => info!(stage = stage.name(), "stage"),
                PipelineEvent::ProducerFailed { producer, error } => {
                    info!(%producer, %error, "producer skipped");
                }
                PipelineEvent::BackendSkipped { count } => info!(count, "search backends skipped"),
                PipelineEvent::Finished => break,
            }
        }
        printed
    });

    let options = RunOptions {
        stream,
        events: EventSink::new(tx),
        cancel,
    };
    let outcome = pipeline.run(question, options).await;
    let streamed = printer.await.unwrap_or(false);
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        RunOutcome::Answered(answer) => {
            if streamed {
                println!();
            } else {
                println!("{}", answer.text);
            }
            if !answer.key_points.is_empty() {
                println!("\nPoints clés :");
                for point in &answer.key_points {
                    println!("- {point}");
                }
            }
            println!("\nSources :");
            for source in &answer.sources {
                let title = if source.title.is_empty() {
                    &source.url
                } else {
                    &source.title
                };
                println!("- {title} ({})", source.url);
            }
        }
        RunOutcome::OutOfScope { message } | RunOutcome::NoEvidence { message } => {
            println!("{message}");
        }
    }
    Ok(())
}

fn check_config(config: &AppConfig) -> anyhow::Result<()> {
    let _pipeline = Pipeline::from_config(config)?;
    println!(
        "configuration OK: {} backends, {} trusted domains, {} producers",
        config.sources.backends.len(),
        config.sources.allow_list.len(),
        config.routing.producers.len()
    );
    Ok(())
}
