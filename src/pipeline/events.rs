//! Progress events emitted during a run.

use tokio::sync::mpsc;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Route,
    Produce,
    Verify,
    Search,
    Rank,
    Enrich,
    Generate,
}

impl Stage {
    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Route => "route",
            Self::Produce => "produce",
            Self::Verify => "verify",
            Self::Search => "search",
            Self::Rank => "rank",
            Self::Enrich => "enrich",
            Self::Generate => "generate",
        }
    }
}

/// Progress notification sent to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A stage began.
    StageStarted(Stage),
    /// A producer failed or timed out and contributed nothing.
    ProducerFailed { producer: String, error: String },
    /// Backends skipped across the search stage.
    BackendSkipped { count: usize },
    /// A chunk of streamed answer text.
    Chunk(String),
    /// The run finished (with any outcome).
    Finished,
}

/// Optional event sink. Sending never blocks and a dropped receiver is
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    /// A sink forwarding to `tx`.
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn stage(&self, stage: Stage) {
        tracing::debug!(stage = stage.name(), "stage started");
        self.emit(PipelineEvent::StageStarted(stage));
    }
}
