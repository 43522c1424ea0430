use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use color_eyre::eyre::eyre;
use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::info;

use crate::domain::{
    RevocationOutcome, RevocationParams, RevocationReason, RevocationRequest, Revoker, Serial,
};
use crate::revocation::audit::AuditLog;
use crate::revocation::errors::{RevocationError, RevocationResult};

/// Per-outcome counts of a finished batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RevocationSummary {
    pub succeeded: usize,
    pub already_revoked: usize,
    pub failed: usize,
}

impl RevocationSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.already_revoked + self.failed
    }
}

#[derive(Default)]
struct Tally {
    succeeded: AtomicUsize,
    already_revoked: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record(&self, request: &RevocationRequest, outcome: RevocationOutcome, log: &dyn AuditLog) {
        match outcome {
            RevocationOutcome::Succeeded => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            RevocationOutcome::AlreadyRevoked => {
                log.warn(format!(
                    "not revoking {}: already revoked (requested reason {})",
                    request.serial, request.reason
                ));
                self.already_revoked.fetch_add(1, Ordering::Relaxed);
            }
            RevocationOutcome::Failed(error) => {
                log.error(format!("failed to revoke {}: {:#}", request.serial, error));
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn summary(&self) -> RevocationSummary {
        RevocationSummary {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            already_revoked: self.already_revoked.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Drives batch revocation through a fixed-size pool of workers.
///
/// The revoker is chosen once here; dry runs simply pass a
/// [`DryRunRevoker`](crate::revocation::DryRunRevoker).
#[derive(Clone)]
pub struct RevocationOrchestrator {
    revoker: Arc<dyn Revoker>,
    log: Arc<dyn AuditLog>,
}

impl RevocationOrchestrator {
    pub fn new(revoker: Arc<dyn Revoker>, log: Arc<dyn AuditLog>) -> Self {
        Self { revoker, log }
    }

    /// Attempts to revoke every serial, `parallelism` at a time.
    ///
    /// Every serial gets exactly one revoke call, duplicates included. Individual
    /// failures, panics included, are written to the audit log and counted in
    /// the summary; only invalid batch parameters fail the call.
    ///
    /// Dropping the returned future aborts in-flight calls, and queued serials
    /// are never started.
    pub async fn revoke_serials(
        &self,
        serials: Vec<Serial>,
        params: RevocationParams,
        parallelism: usize,
    ) -> RevocationResult<RevocationSummary> {
        if parallelism == 0 {
            return Err(RevocationError::InvalidParallelism(parallelism));
        }
        if params.skip_block_key && params.reason != RevocationReason::KeyCompromise {
            return Err(RevocationError::SkipBlockKeyRequiresKeyCompromise(
                params.reason,
            ));
        }
        if serials.is_empty() {
            return Ok(RevocationSummary::default());
        }

        let worker_count = parallelism.min(serials.len());
        let (tx, rx) = mpsc::channel::<Serial>(worker_count);
        let rx = Arc::new(Mutex::new(rx));
        let tally = Arc::new(Tally::default());

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let rx = Arc::clone(&rx);
            let revoker = Arc::clone(&self.revoker);
            let log = Arc::clone(&self.log);
            let tally = Arc::clone(&tally);
            workers.spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(serial) = next else {
                        break;
                    };
                    let request = RevocationRequest::new(serial, params);
                    // A panicking call counts as that serial's failure and the
                    // worker moves on to the next one.
                    let outcome = match AssertUnwindSafe(revoker.revoke(&request))
                        .catch_unwind()
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => RevocationOutcome::Failed(eyre!("revoke call panicked")),
                    };
                    tally.record(&request, outcome, log.as_ref());
                }
            });
        }
        drop(rx);

        for serial in serials {
            // Only fails once every worker has gone away.
            if tx.send(serial).await.is_err() {
                break;
            }
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            joined?;
        }

        let summary = tally.summary();
        info!(
            succeeded = summary.succeeded,
            already_revoked = summary.already_revoked,
            failed = summary.failed,
            "Revocation batch finished"
        );
        Ok(summary)
    }
}
