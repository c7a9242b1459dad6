// src/core/probe.rs

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, warn};

use crate::core::models::ProbeKind;

/// Upper bound on probe tasks alive at once, abandoned ones included.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// A soft failure reported by a probe body, optionally with whatever it had
/// already gathered before failing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeFailure<T> {
    pub reason: String,
    pub partial: Option<T>,
}

impl<T> ProbeFailure<T> {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), partial: None }
    }

    pub fn with_partial(reason: impl Into<String>, partial: T) -> Self {
        Self { reason: reason.into(), partial: Some(partial) }
    }
}

impl<T> From<String> for ProbeFailure<T> {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl<T> From<&str> for ProbeFailure<T> {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// What a probe body returns.
pub type ProbeResult<T> = Result<T, ProbeFailure<T>>;

/// What the orchestrator gets back from [`invoke`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    Value(T),
    Failed { reason: String, partial: Option<T> },
    /// The budget elapsed first; the probe task was left running detached.
    TimedOut(Duration),
}

impl<T> ProbeOutcome<T> {
    /// Splits the outcome into the value to store in the probe's field group
    /// and the message to store under its error key.
    pub fn into_parts(self, kind: ProbeKind) -> (Option<T>, Option<String>) {
        match self {
            ProbeOutcome::Value(value) => (Some(value), None),
            ProbeOutcome::Failed { reason, partial } => (partial, Some(reason)),
            ProbeOutcome::TimedOut(budget) => (None, Some(timeout_message(kind, budget))),
        }
    }
}

pub fn timeout_message(kind: ProbeKind, budget: Duration) -> String {
    format!("{kind} timed out after {}ms", budget.as_millis())
}

/// Bounds the number of probe tasks that may exist at once.
///
/// A permit travels with each spawned probe and is only returned when the task
/// actually finishes, so tasks abandoned after a timeout keep counting until
/// their blocking work completes.
#[derive(Debug, Clone)]
pub struct ProbePool {
    permits: Arc<Semaphore>,
}

impl ProbePool {
    pub fn new(capacity: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(capacity)) }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for ProbePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

/// Runs one probe under `budget`.
///
/// The probe body is spawned as its own task and the caller waits for
/// whichever comes first: completion or the budget elapsing. On timeout the
/// task is not aborted. It keeps running in the background (a blocking call
/// inside it cannot be interrupted anyway), its result is dropped, and
/// its resources are released when it returns.
pub async fn invoke<T, F>(pool: &ProbePool, kind: ProbeKind, budget: Duration, probe: F) -> ProbeOutcome<T>
where
    T: Send + 'static,
    F: Future<Output = ProbeResult<T>> + Send + 'static,
{
    let permit = match Arc::clone(&pool.permits).try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            warn!(probe = %kind, "Probe pool exhausted by tasks still running in the background.");
            return ProbeOutcome::Failed {
                reason: format!("{kind} not started: too many abandoned probes still running"),
                partial: None,
            };
        }
    };

    debug!(probe = %kind, budget_ms = budget.as_millis() as u64, "Launching probe task.");
    let handle = tokio::spawn(async move {
        let _permit = permit;
        probe.await
    });

    match timeout(budget, handle).await {
        Ok(Ok(Ok(value))) => {
            debug!(probe = %kind, "Probe completed.");
            ProbeOutcome::Value(value)
        }
        Ok(Ok(Err(failure))) => {
            warn!(probe = %kind, reason = %failure.reason, partial = failure.partial.is_some(), "Probe failed.");
            ProbeOutcome::Failed { reason: failure.reason, partial: failure.partial }
        }
        Ok(Err(join_error)) => {
            error!(probe = %kind, error = %join_error, "Probe task panicked!");
            ProbeOutcome::Failed { reason: format!("{kind} probe crashed: {join_error}"), partial: None }
        }
        Err(_) => {
            // Dropping the JoinHandle detaches the task.
            warn!(probe = %kind, budget_ms = budget.as_millis() as u64, "Probe exceeded its budget, abandoning it.");
            ProbeOutcome::TimedOut(budget)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn returns_value_when_probe_finishes_in_time() {
        let pool = ProbePool::default();
        let outcome = invoke(&pool, ProbeKind::Ping, Duration::from_secs(1), async {
            sleep(Duration::from_millis(100)).await;
            Ok::<_, ProbeFailure<u32>>(7)
        })
        .await;
        assert_eq!(outcome, ProbeOutcome::Value(7));
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_partial_result_on_failure() {
        let pool = ProbePool::default();
        let outcome = invoke(&pool, ProbeKind::Asn, Duration::from_secs(1), async {
            Err::<String, _>(ProbeFailure::with_partial("AS name missing", "US".to_string()))
        })
        .await;
        let (value, error) = outcome.into_parts(ProbeKind::Asn);
        assert_eq!(value.as_deref(), Some("US"));
        assert_eq!(error.as_deref(), Some("AS name missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_killing_the_task() {
        let pool = ProbePool::new(4);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let outcome = invoke(&pool, ProbeKind::Whois, Duration::from_secs(1), async move {
            sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, ProbeFailure<()>>(())
        })
        .await;

        assert_eq!(outcome, ProbeOutcome::TimedOut(Duration::from_secs(1)));
        // The abandoned task still holds its permit...
        assert_eq!(pool.available(), 3);

        sleep(Duration::from_secs(10)).await;
        // ...and runs to completion, releasing it afterwards.
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(pool.available(), 4);

        let (value, error) = outcome.into_parts(ProbeKind::Whois);
        assert!(value.is_none());
        assert_eq!(error.as_deref(), Some("whois timed out after 1000ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn refuses_new_probes_when_pool_is_exhausted() {
        let pool = ProbePool::new(1);
        let outcome = invoke(&pool, ProbeKind::Ping, Duration::from_millis(10), async {
            sleep(Duration::from_secs(60)).await;
            Ok::<_, ProbeFailure<()>>(())
        })
        .await;
        assert!(matches!(outcome, ProbeOutcome::TimedOut(_)));

        let second = invoke(&pool, ProbeKind::Geo, Duration::from_secs(1), async {
            Ok::<_, ProbeFailure<()>>(())
        })
        .await;
        match second {
            ProbeOutcome::Failed { reason, partial } => {
                assert!(reason.contains("too many abandoned probes"));
                assert!(partial.is_none());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_probe_becomes_a_failure() {
        let pool = ProbePool::default();
        let explode = true;
        let outcome = invoke(&pool, ProbeKind::Tls, Duration::from_secs(5), async move {
            if explode {
                panic!("boom");
            }
            Ok::<_, ProbeFailure<()>>(())
        })
        .await;
        match outcome {
            ProbeOutcome::Failed { reason, .. } => assert!(reason.starts_with("tls probe crashed")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
