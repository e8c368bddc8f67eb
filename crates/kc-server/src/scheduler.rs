//! Periodic reconciliation.

use std::time::Duration;

use kc_audit::{ReconciliationJob, UpstreamProvider};
use kc_storage::MirrorStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs `job` for every realm in `realms` once per `interval`.
///
/// Returns `None` without spawning anything if the interval is zero or no
/// realm is configured. Failures are logged and retried on the next tick.
pub fn spawn_reconciliation<S, U>(
    job: ReconciliationJob<S, U>,
    realms: Vec<String>,
    interval: Duration,
) -> Option<JoinHandle<()>>
where
    S: MirrorStore + 'static,
    U: UpstreamProvider + 'static,
{
    if interval.is_zero() || realms.is_empty() {
        tracing::info!("Reconciliation disabled");
        return None;
    }

    tracing::info!(?interval, realms = ?realms, "Starting reconciliation scheduler");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for realm in &realms {
                match job.run(realm).await {
                    Ok(reports) => {
                        let drifted = reports.iter().filter(|r| !r.in_sync).count();
                        tracing::info!(realm = %realm, checked = reports.len(), drifted, "Reconciliation finished");
                    }
                    Err(err) => {
                        tracing::warn!(realm = %realm, error = %err, "Reconciliation failed");
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kc_audit::{InMemoryUpstream, SystemClock};
    use kc_storage::InMemoryStore;

    use super::*;

    fn job() -> ReconciliationJob<InMemoryStore, InMemoryUpstream> {
        ReconciliationJob::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryUpstream::new()),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn zero_interval_disables_scheduler() {
        assert!(spawn_reconciliation(job(), vec!["acme".into()], Duration::ZERO).is_none());
        assert!(spawn_reconciliation(job(), Vec::new(), Duration::from_secs(60)).is_none());
    }

    #[tokio::test]
    async fn scheduler_runs_until_aborted() {
        let handle = spawn_reconciliation(job(), vec!["acme".into()], Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!handle.is_finished());
        handle.abort();
    }
}
