//! Fan-out / fan-in of independent analysis passes.
//!
//! Each pass owns its output; nothing is shared between tasks. Every pass
//! runs under its own timeout, and a pass that hangs, fails or panics only
//! removes its own findings from the merge.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::MrResult;

use super::policy::{self, Finding, FindingSet};

/// What came back from a fan-out run.
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    /// Completed passes, in the order they were submitted.
    pub sets: Vec<FindingSet>,
    /// Passes that exceeded the per-pass timeout.
    pub timed_out: Vec<String>,
    /// Passes that returned an error or panicked, with a short reason.
    pub failed: Vec<(String, String)>,
}

impl FanOutReport {
    pub fn is_complete(&self) -> bool {
        self.timed_out.is_empty() && self.failed.is_empty()
    }

    /// Names of passes that produced nothing usable.
    pub fn missing(&self) -> Vec<String> {
        self.timed_out
            .iter()
            .cloned()
            .chain(self.failed.iter().map(|(name, _)| name.clone()))
            .collect()
    }

    /// Consolidated findings of the completed passes.
    pub fn merged(&self) -> Vec<Finding> {
        policy::consolidate(self.sets.clone())
    }
}

enum PassOutcome {
    Done(Vec<Finding>),
    Failed(String),
    TimedOut,
}

/// Runs every `(name, future)` pass concurrently and waits for all of them.
pub async fn run_analyses<Fut>(passes: Vec<(String, Fut)>, per_pass: Duration) -> FanOutReport
where
    Fut: Future<Output = MrResult<Vec<Finding>>> + Send + 'static,
{
    let t0 = Instant::now();
    let names: Vec<String> = passes.iter().map(|(name, _)| name.clone()).collect();
    debug!("fanout: spawn {} pass(es), timeout={:?}", names.len(), per_pass);

    let mut join_set = JoinSet::new();
    for (i, (_, fut)) in passes.into_iter().enumerate() {
        join_set.spawn(async move {
            let outcome = match tokio::time::timeout(per_pass, fut).await {
                Ok(Ok(findings)) => PassOutcome::Done(findings),
                Ok(Err(e)) => PassOutcome::Failed(e.to_string()),
                Err(_) => PassOutcome::TimedOut,
            };
            (i, outcome)
        });
    }

    let mut results: Vec<Option<PassOutcome>> = names.iter().map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((i, outcome)) => results[i] = Some(outcome),
            Err(e) => warn!("fanout: analysis task aborted: {e}"),
        }
    }

    let mut report = FanOutReport::default();
    for (name, outcome) in names.into_iter().zip(results) {
        match outcome {
            Some(PassOutcome::Done(findings)) => {
                debug!("fanout: pass `{}` returned {} finding(s)", name, findings.len());
                report.sets.push(FindingSet::new(name, findings));
            }
            Some(PassOutcome::TimedOut) => {
                warn!("fanout: pass `{}` timed out after {:?}", name, per_pass);
                report.timed_out.push(name);
            }
            Some(PassOutcome::Failed(reason)) => {
                warn!("fanout: pass `{}` failed: {}", name, reason);
                report.failed.push((name, reason));
            }
            None => report.failed.push((name, "task panicked".to_string())),
        }
    }

    debug!(
        "fanout: done in {} ms (ok={}, timed_out={}, failed={})",
        t0.elapsed().as_millis(),
        report.sets.len(),
        report.timed_out.len(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{Error, TransportError};
    use crate::review::CommentInput;
    use crate::review::policy::Severity;
    use std::pin::Pin;

    type PassFuture = Pin<Box<dyn Future<Output = MrResult<Vec<Finding>>> + Send>>;

    fn finding(sev: Severity, pos: i64) -> Finding {
        Finding {
            severity: sev,
            source: String::new(),
            comment: CommentInput::new("a.rs", pos, format!("at {pos}")),
        }
    }

    fn after(ms: u64, result: MrResult<Vec<Finding>>) -> PassFuture {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            result
        })
    }

    #[tokio::test]
    async fn results_follow_submission_order() {
        let report = run_analyses(
            vec![
                ("slow".to_string(), after(40, Ok(vec![finding(Severity::Low, 1)]))),
                ("fast".to_string(), after(1, Ok(vec![finding(Severity::High, 2)]))),
            ],
            Duration::from_secs(5),
        )
        .await;
        assert!(report.is_complete());
        let names: Vec<_> = report.sets.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(names, vec!["slow", "fast"]);
        let merged = report.merged();
        assert_eq!(merged[0].severity, Severity::High);
        assert_eq!(merged[0].source, "fast");
    }

    #[tokio::test]
    async fn hung_pass_does_not_block_the_others() {
        let report = run_analyses(
            vec![
                ("ok".to_string(), after(1, Ok(vec![finding(Severity::Medium, 3)]))),
                ("hang".to_string(), after(60_000, Ok(Vec::new()))),
                (
                    "broken".to_string(),
                    after(
                        1,
                        Err(Error::Transport(TransportError::Network(
                            "model unavailable".into(),
                        ))),
                    ),
                ),
            ],
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(report.sets.len(), 1);
        assert_eq!(report.timed_out, vec!["hang".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert!(report.failed[0].1.contains("model unavailable"));
        assert_eq!(report.missing(), vec!["hang".to_string(), "broken".to_string()]);
        assert_eq!(report.merged().len(), 1);
    }

    #[tokio::test]
    async fn no_passes_is_an_empty_report() {
        let report = run_analyses(Vec::<(String, PassFuture)>::new(), Duration::from_secs(1)).await;
        assert!(report.is_complete());
        assert!(report.merged().is_empty());
    }
}
