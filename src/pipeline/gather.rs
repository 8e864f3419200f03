//! Scatter-gather over independent, failure-prone tasks.
//!
//! Every task runs on its own tokio task with its own time budget. The
//! gather step waits for all of them and reports one outcome per task; a
//! failure, timeout or panic in one task never affects the others.
//! Cancelling the token aborts whatever is still in flight.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};

/// Outcome of one gathered task.
#[derive(Debug, Clone, PartialEq)]
pub struct Gathered<T> {
    /// Task name, used in logs and events.
    pub name: String,
    /// Value, or a description of why the task contributed nothing.
    pub result: std::result::Result<T, String>,
}

/// Run `tasks` concurrently and collect every outcome, in launch order.
///
/// # Errors
///
/// Returns [`PipelineError::Cancelled`] if `cancel` fires first; the
/// remaining tasks are aborted.
pub async fn gather<T, E, F>(
    tasks: Vec<(String, F)>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<Gathered<T>>>
where
    T: Send + 'static,
    E: Display + Send + 'static,
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    let mut slots: Vec<Option<Gathered<T>>> = Vec::with_capacity(tasks.len());
    let mut names = Vec::with_capacity(tasks.len());
    let mut set = JoinSet::new();

    for (index, (name, task)) in tasks.into_iter().enumerate() {
        names.push(name.clone());
        slots.push(None);
        set.spawn(async move {
            let result = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
            };
            (index, Gathered { name, result })
        });
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                set.abort_all();
                return Err(PipelineError::Cancelled);
            }
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok((index, gathered))) => slots[index] = Some(gathered),
                Some(Err(e)) => tracing::warn!(error = %e, "gathered task did not complete"),
            },
        }
    }

    Ok(slots
        .into_iter()
        .zip(names)
        .map(|(slot, name)| {
            slot.unwrap_or_else(|| Gathered {
                name,
                result: Err("task panicked".into()),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;

    type Task = Pin<Box<dyn Future<Output = std::result::Result<u32, String>> + Send>>;

    fn task(delay_ms: u64, result: std::result::Result<u32, &'static str>) -> Task {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            result.map_err(str::to_owned)
        })
    }

    #[tokio::test]
    async fn collects_in_launch_order_despite_completion_order() {
        let tasks = vec![
            ("slow".to_owned(), task(50, Ok(1))),
            ("fast".to_owned(), task(0, Ok(2))),
        ];
        let out = gather(tasks, Duration::from_secs(5), &CancellationToken::new())
            .await
            .expect("gathered");
        assert_eq!(out[0].name, "slow");
        assert_eq!(out[0].result, Ok(1));
        assert_eq!(out[1].result, Ok(2));
    }

    #[tokio::test]
    async fn failures_and_timeouts_are_isolated() {
        let tasks = vec![
            ("ok".to_owned(), task(0, Ok(7))),
            ("err".to_owned(), task(0, Err("boom"))),
            ("slow".to_owned(), task(5_000, Ok(9))),
        ];
        let out = gather(tasks, Duration::from_millis(100), &CancellationToken::new())
            .await
            .expect("gathered");
        assert_eq!(out[0].result, Ok(7));
        assert_eq!(out[1].result, Err("boom".to_owned()));
        assert!(out[2].result.as_ref().is_err_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn panicking_task_is_reported_not_propagated() {
        let boom: Task = Box::pin(async { panic!("producer crashed") });
        let tasks = vec![("boom".to_owned(), boom), ("ok".to_owned(), task(0, Ok(1)))];
        let out = gather(tasks, Duration::from_secs(5), &CancellationToken::new())
            .await
            .expect("gathered");
        assert_eq!(out[0].result, Err("task panicked".to_owned()));
        assert_eq!(out[1].result, Ok(1));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_gather() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let tasks = vec![("slow".to_owned(), task(5_000, Ok(1)))];
        let err = gather(tasks, Duration::from_secs(10), &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn empty_task_list_is_empty() {
        let tasks: Vec<(String, Task)> = Vec::new();
        let out = gather(tasks, Duration::from_secs(1), &CancellationToken::new())
            .await
            .expect("gathered");
        assert!(out.is_empty());
    }
}
