//! Step executor — drives one entity through its lifecycle state machine.
//!
//! Each invocation re-reads the record, asks the planner for the next step,
//! performs the side effect, and commits via compare-and-swap. Every commit
//! is a resumable checkpoint: `Assess → SendInitial` lands before the
//! provider call, the send result lands as `Wait` plus an owed notice, and
//! the notice clears in a final write once posted. A version conflict at any
//! point means another writer (usually the response listener) got there
//! first; the executor re-reads and recomputes, so the response flag wins
//! every race — including one that fires mid-send.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::entity::{Entity, Notice};
use cadence_core::error::CoreError;
use cadence_core::machine::{decide, Decision};
use cadence_core::store::LifecycleStore;
use cadence_core::types::StepKind;

use crate::capability::{CapabilityError, Notifier, Outbound, SendRequest};
use crate::error::Result;
use crate::expander::CampaignExpander;
use crate::retry::{with_retry, RetryPolicy};

// ─── ResponseOutcome ──────────────────────────────────────────────────────

/// What applying a response event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The lifecycle escalated; the urgent-or-normal notice was posted.
    Escalated,
    /// The lifecycle was already terminal — duplicate or late signal.
    AlreadyTerminal,
}

// ─── StepExecutor ─────────────────────────────────────────────────────────

pub struct StepExecutor {
    store: Arc<LifecycleStore>,
    outbound: Arc<dyn Outbound>,
    notifier: Arc<dyn Notifier>,
    expander: Option<Arc<CampaignExpander>>,
    retry: RetryPolicy,
}

/// Upper bound on planner passes in one invocation. A full campaign step is
/// at most four commits; anything past this is a conflict storm worth
/// surfacing rather than spinning through.
const MAX_PASSES: u32 = 16;

impl StepExecutor {
    pub fn new(
        store: Arc<LifecycleStore>,
        outbound: Arc<dyn Outbound>,
        notifier: Arc<dyn Notifier>,
        expander: Option<Arc<CampaignExpander>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            outbound,
            notifier,
            expander,
            retry,
        }
    }

    /// Advance one entity as far as it can go at `now`.
    ///
    /// Safe to call for entities that are not due, already terminal, or
    /// concurrently being stepped elsewhere — a stale writer simply loses
    /// the version race and no-ops.
    pub async fn step(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        for _ in 0..MAX_PASSES {
            let entity = self.store.get(id)?;
            match decide(&entity, now) {
                Decision::Idle => return Ok(()),

                Decision::Skip => {
                    if self.commit(&entity, |e| e.skip(now))?.is_some() {
                        info!("lead {id} unqualified, lifecycle skipped with no outreach");
                        return Ok(());
                    }
                    continue;
                }

                Decision::Escalate => {
                    self.apply_response(id, entity.responded_at.unwrap_or(now), now)
                        .await?;
                    return Ok(());
                }

                Decision::BeginSend(kind) => {
                    // Commit the send-owed state, then fall through to
                    // PerformSend on the next pass.
                    self.commit(&entity, |e| e.begin_send(kind, now))?;
                    continue;
                }

                Decision::PerformSend(kind) => {
                    self.perform_send(&entity, kind, now).await?;
                    continue;
                }

                Decision::Exhaust => {
                    let notice = Notice {
                        message: format!(
                            "Campaign for {} <{}> exhausted after {} sends with no response",
                            entity.contact.name, entity.contact.email, entity.step_count
                        ),
                        urgent: false,
                    };
                    match self.commit(&entity, |e| e.exhaust(notice.clone(), now))? {
                        Some(updated) => {
                            info!(
                                "entity {id} exhausted at {}/{} steps",
                                updated.step_count, updated.max_steps
                            );
                            self.flush_notice(&updated).await?;
                            return Ok(());
                        }
                        None => continue,
                    }
                }
            }
        }
        warn!("entity {id} hit the per-step pass limit; will resume next tick");
        Ok(())
    }

    /// Mark a response and escalate a non-terminal lifecycle.
    ///
    /// Duplicate signals and signals for already-terminal entities are
    /// no-ops. Exactly one escalation notice is ever posted per entity: the
    /// transition commits once, and posting is guarded by the owed notice on
    /// the committed record.
    pub async fn apply_response(
        &self,
        id: Uuid,
        responded_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ResponseOutcome> {
        loop {
            let entity = self.store.get(id)?;
            if entity.state.is_terminal() {
                debug!("response for terminal entity {id} ignored");
                return Ok(ResponseOutcome::AlreadyTerminal);
            }
            let urgent = entity.cadence().escalate_urgent;
            let notice = Notice {
                message: format!(
                    "{} <{}> responded — hand off to a human now",
                    entity.contact.name, entity.contact.email
                ),
                urgent,
            };
            match self.commit(&entity, |e| {
                e.mark_responded(responded_at);
                e.escalate(notice.clone(), now);
            })? {
                Some(updated) => {
                    info!(
                        "entity {id} escalated on response (urgent: {urgent}, steps so far: {})",
                        updated.step_count
                    );
                    self.flush_notice(&updated).await?;
                    return Ok(ResponseOutcome::Escalated);
                }
                None => continue,
            }
        }
    }

    /// Post an owed notice and clear it.
    ///
    /// Re-reads the committed record first: if the notice is already gone
    /// (posted by another worker, or never owed) this is a no-op, which is
    /// what bounds terminal notifications to one per committed transition
    /// even under tick replay. Posting happens before the clear commits, so
    /// a crash in between re-sends the notice rather than losing it.
    pub async fn flush_notice(&self, entity: &Entity) -> Result<()> {
        let current = self.store.get(entity.id)?;
        let Some(notice) = current.pending_notice.clone() else {
            return Ok(());
        };

        let posted = with_retry(&self.retry, "notify", || {
            self.notifier
                .notify(current.thread.as_deref(), &notice.message, notice.urgent)
        })
        .await;

        match posted {
            Ok(thread) => {
                if self.commit(&current, |e| e.clear_notice(thread.clone()))?.is_none() {
                    // The record moved on (e.g. an escalation replaced the
                    // owed notice); the new owner flushes its own notice.
                    debug!("notice clear for {} lost the version race", entity.id);
                }
            }
            Err(err) => {
                let note = format!("degraded: notification dropped ({err})");
                if self.commit(&current, |e| e.abandon_notice(note.clone()))?.is_none() {
                    debug!("notice abandon for {} lost the version race", entity.id);
                }
            }
        }
        Ok(())
    }

    // ─── Internal ─────────────────────────────────────────────────────────

    /// Perform the outbound call for a committed send-owed state, then
    /// commit the result. Retry exhaustion and permanent provider errors
    /// still advance the lifecycle — a lead is never silently dropped on a
    /// flaky dependency — with the failure recorded as an annotation.
    async fn perform_send(
        &self,
        entity: &Entity,
        kind: StepKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let req = self.send_request(entity, kind)?;
        let sent = with_retry(&self.retry, "send", || self.outbound.send(&req)).await;

        let step_no = entity.step_count + 1;
        let (annotation, message) = match &sent {
            Ok(receipt) => (
                None,
                format!(
                    "Sent {} outreach to {} <{}> — step {}/{} (ref {})",
                    kind,
                    entity.contact.name,
                    entity.contact.email,
                    step_no,
                    entity.max_steps,
                    receipt.provider_ref
                ),
            ),
            Err(CapabilityError::Transient(reason)) => (
                Some(format!("degraded: send step {step_no} failed ({reason})")),
                format!(
                    "Send to {} <{}> failed after retries — step {}/{} continues on cadence",
                    entity.contact.name, entity.contact.email, step_no, entity.max_steps
                ),
            ),
            Err(CapabilityError::Permanent(reason)) => (
                Some(format!("permanent send failure at step {step_no}: {reason}")),
                format!(
                    "Send to {} <{}> rejected by provider — step {}/{} continues on cadence",
                    entity.contact.name, entity.contact.email, step_no, entity.max_steps
                ),
            ),
        };

        let notice = Notice {
            message,
            urgent: false,
        };
        match self.commit(entity, |e| {
            if let Some(note) = annotation.clone() {
                e.annotate(note);
            }
            e.record_send(notice.clone(), now);
        })? {
            Some(updated) => {
                info!(
                    "entity {} advanced to wait ({}/{} sends, next due {:?})",
                    updated.id, updated.step_count, updated.max_steps, updated.next_action_at
                );
                self.flush_notice(&updated).await?;
                self.maybe_expand(&updated, now).await;
            }
            // A response landed before the write committed; the next
            // planner pass converts this step into an escalation.
            None => {}
        }
        Ok(())
    }

    fn send_request(&self, entity: &Entity, kind: StepKind) -> Result<SendRequest> {
        let colleague = match entity.referred_by {
            Some(referrer) => match self.store.get(referrer) {
                Ok(original) => Some(original.contact.name),
                Err(CoreError::EntityNotFound(_)) => {
                    debug!("referrer {referrer} missing for {}", entity.id);
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };
        Ok(SendRequest {
            entity_id: entity.id,
            step_count: entity.step_count,
            kind,
            contact: entity.contact.clone(),
            tier: entity.tier,
            colleague,
        })
    }

    /// First wait after the first send on a qualifying tier triggers
    /// multi-contact expansion. Expansion failures never fail the step.
    async fn maybe_expand(&self, entity: &Entity, now: DateTime<Utc>) {
        if entity.step_count != 1 || !entity.tier.qualifies_for_expansion() {
            return;
        }
        let Some(expander) = &self.expander else {
            return;
        };
        match expander.expand(entity.account_id, entity, now).await {
            Ok(report) if report.created > 0 => {
                info!(
                    "expanded account {} with {} sibling lifecycle(s)",
                    entity.account_id, report.created
                );
            }
            Ok(_) => {}
            Err(e) => warn!("expansion for account {} failed: {e}", entity.account_id),
        }
    }

    /// CAS wrapper: `Ok(None)` means the version race was lost — an
    /// expected concurrency signal, not an error. The caller re-reads and
    /// recomputes.
    fn commit(
        &self,
        read: &Entity,
        mutator: impl FnOnce(&mut Entity),
    ) -> Result<Option<Entity>> {
        match self.store.compare_and_swap(read.id, read.version, mutator) {
            Ok(updated) => Ok(Some(updated)),
            Err(CoreError::VersionConflict { id, .. }) => {
                debug!("version conflict on {id}; recomputing from fresh state");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
