//! Plan execution.
//!
//! Donors are processed one after another. For each donor:
//!
//! ```text
//! INIT -> SESSION_ACQUIRED -> SENDING* -> SESSION_RELEASED
//! INIT -> ACQUIRE_FAILED          (every entry recorded as failed)
//! ```
//!
//! Entries for the same recipient are merged into one send, but one result
//! is still recorded per plan entry. Nothing is retried within a run.

use crate::error::ExecuteError;
use crate::models::{AccountId, AccountSnapshot, InventoryItem, TransferPlanEntry, TransferResult};
use crate::session::{Session, SessionManager, SessionTransport};
use crate::sink::ResultSink;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Plan entries of one donor, bucketed by recipient in plan order.
struct DonorBatch<'p> {
    donor: &'p AccountId,
    groups: Vec<RecipientGroup<'p>>,
}

struct RecipientGroup<'p> {
    recipient: Option<&'p AccountId>,
    entries: Vec<&'p TransferPlanEntry>,
}

/// Group a plan by donor, then by recipient, keeping first-appearance order.
fn group_plan(plan: &[TransferPlanEntry]) -> Vec<DonorBatch<'_>> {
    let mut batches: Vec<DonorBatch<'_>> = Vec::new();

    for entry in plan.iter().filter(|e| !e.is_empty()) {
        let batch = match batches.iter().position(|b| *b.donor == entry.donor) {
            Some(i) => &mut batches[i],
            None => {
                batches.push(DonorBatch {
                    donor: &entry.donor,
                    groups: Vec::new(),
                });
                let last = batches.len() - 1;
                &mut batches[last]
            }
        };

        let recipient = entry.recipient.as_ref();
        match batch.groups.iter_mut().find(|g| g.recipient == recipient) {
            Some(group) => group.entries.push(entry),
            None => batch.groups.push(RecipientGroup {
                recipient,
                entries: vec![entry],
            }),
        }
    }

    batches
}

/// Destination (trade link) of every account that can receive items.
pub fn destinations_from(snapshots: &[AccountSnapshot]) -> HashMap<AccountId, String> {
    snapshots
        .iter()
        .filter_map(|s| s.destination.clone().map(|d| (s.id.clone(), d)))
        .collect()
}

/// Cancellation observed; the donor's session has already been released.
struct Interrupted;

pub struct TransferExecutor<T: SessionTransport, S: ResultSink> {
    sessions: SessionManager<T>,
    sink: S,
    destinations: HashMap<AccountId, String>,
    cancel: CancellationToken,
}

impl<T: SessionTransport, S: ResultSink> TransferExecutor<T, S> {
    pub fn new(
        sessions: SessionManager<T>,
        sink: S,
        destinations: HashMap<AccountId, String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sessions,
            sink,
            destinations,
            cancel,
        }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Execute the plan, returning one result per non-empty entry.
    ///
    /// On cancellation the in-flight donor's session is released first and
    /// the results recorded so far are returned inside the error.
    pub async fn execute(
        &mut self,
        plan: &[TransferPlanEntry],
    ) -> Result<Vec<TransferResult>, ExecuteError> {
        let mut results = Vec::new();

        for batch in group_plan(plan) {
            let interrupted = self.cancel.is_cancelled()
                || self.run_donor(&batch, &mut results).await.is_err();

            if interrupted {
                warn!("Execution cancelled, {} results recorded", results.len());
                self.sessions.release_warm().await;
                return Err(ExecuteError::Cancelled { completed: results });
            }
        }

        self.sessions.release_warm().await;

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            "Execution finished: {} succeeded, {} failed",
            results.len() - failed,
            failed
        );

        Ok(results)
    }

    async fn run_donor(
        &mut self,
        batch: &DonorBatch<'_>,
        results: &mut Vec<TransferResult>,
    ) -> Result<(), Interrupted> {
        info!("Processing transfers for donor: {}", batch.donor);

        let mut session = match self.sessions.acquire(batch.donor).await {
            Ok(session) => session,
            Err(e) => {
                error!("{}", e);
                let reason = e.to_string();
                for group in &batch.groups {
                    self.fail_group(group, &reason, results);
                }
                return Ok(());
            }
        };

        let outcome = self.send_groups(batch, &mut session, results).await;
        self.sessions.release(&mut session).await;
        outcome
    }

    async fn send_groups(
        &mut self,
        batch: &DonorBatch<'_>,
        session: &mut Session,
        results: &mut Vec<TransferResult>,
    ) -> Result<(), Interrupted> {
        for (index, group) in batch.groups.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Interrupted);
            }

            let Some(recipient) = group.recipient else {
                self.fail_group(group, "No recipient assigned", results);
                continue;
            };
            let Some(destination) = self.destinations.get(recipient).cloned() else {
                let reason = format!("No destination known for {}", recipient);
                warn!("{}", reason);
                self.fail_group(group, &reason, results);
                continue;
            };

            if !session.is_valid() {
                let reason = format!("Session for {} is no longer valid", batch.donor);
                self.fail_group(group, &reason, results);
                continue;
            }

            if session.needs_switch(recipient) {
                if let Some(bound) = session.recipient() {
                    info!(
                        "Logging out from {} to switch recipient from {} to {}",
                        batch.donor, bound, recipient
                    );
                }
                self.sessions.release(session).await;

                info!(
                    "Creating fresh login for {} to send to {}",
                    batch.donor, recipient
                );
                match self.sessions.acquire(batch.donor).await {
                    Ok(fresh) => *session = fresh,
                    Err(e) => {
                        error!("{}", e);
                        let reason = e.to_string();
                        for rest in &batch.groups[index..] {
                            self.fail_group(rest, &reason, results);
                        }
                        return Ok(());
                    }
                }
            }

            let items: Vec<InventoryItem> = group
                .entries
                .iter()
                .flat_map(|e| e.items.iter().cloned())
                .collect();
            let value: Decimal = group.entries.iter().map(|e| e.value).sum();

            info!(
                "Sending {} items from {} to {} (value: {:.2})",
                items.len(),
                batch.donor,
                recipient,
                value
            );

            // Cancellation is checked between groups, never during a send.
            let sent = self
                .sessions
                .send(session, recipient, &destination, &items)
                .await;

            match sent {
                Ok(reference) => {
                    info!(
                        "{} items sent from {} to {} ({})",
                        items.len(),
                        batch.donor,
                        recipient,
                        reference
                    );
                    for entry in &group.entries {
                        self.record(TransferResult::success(entry, reference.clone()), results);
                    }
                }
                Err(e) => {
                    error!(
                        "Error sending from {} to {}: {}",
                        batch.donor, recipient, e
                    );
                    self.fail_group(group, &e.to_string(), results);
                }
            }
        }

        Ok(())
    }

    fn fail_group(
        &mut self,
        group: &RecipientGroup<'_>,
        reason: &str,
        results: &mut Vec<TransferResult>,
    ) {
        for entry in &group.entries {
            self.record(TransferResult::failure(entry, reason.to_string()), results);
        }
    }

    fn record(&mut self, result: TransferResult, results: &mut Vec<TransferResult>) {
        self.sink.record(&result);
        results.push(result);
    }
}
