//! Entity data model — one lead-or-contact's follow-up lifecycle.
//!
//! Everything needed to resume a lifecycle lives on this record: the current
//! state, the send budget, the next deadline, and any owed notification. No
//! in-memory object holds campaign state; any worker can pick up any entity
//! from the store at any tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::{cadence_for, Cadence};
use crate::types::{LifecycleState, StepKind, Tier};

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// The person a lifecycle is pursuing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Normalized form used for dedup in the account contact set.
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_ascii_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Notice
// ---------------------------------------------------------------------------

/// An owed notification, committed in the same write as the transition that
/// owes it and cleared by a separate compare-and-swap once posted. A crash
/// between the two leaves the notice on the record for startup recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub urgent: bool,
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Durable per-lifecycle record; single source of truth for recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    /// Groups sibling lifecycles created by campaign expansion.
    pub account_id: Uuid,
    pub contact: Contact,
    pub tier: Tier,
    pub state: LifecycleState,
    /// Follow-up actions sent so far.
    pub step_count: u32,
    /// Send budget frozen from the cadence policy at creation time.
    pub max_steps: u32,
    /// When the scheduler may next act; `None` once terminal.
    pub next_action_at: Option<DateTime<Utc>>,
    pub last_transition_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency token; strictly increases on every accepted
    /// write. Stale writers lose the race and must re-read.
    pub version: u64,
    /// Sticky response flag set by the response listener.
    pub responded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    /// Opaque handle to the notification thread, created on first post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_notice: Option<Notice>,
    /// For expansion siblings: the original entity whose inquiry the first
    /// send references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_reasoning: Option<String>,
    /// Degradation notes (retry exhaustion, permanent provider errors).
    /// Append-only; never read by the state machine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
}

impl Entity {
    /// Create a fresh lifecycle in `Assess`, due immediately.
    ///
    /// `max_steps` is frozen from the cadence policy here so later policy
    /// changes don't retroactively alter in-flight campaigns.
    pub fn new(
        account_id: Uuid,
        contact: Contact,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Self {
        let cadence = cadence_for(tier);
        Self {
            id: Uuid::new_v4(),
            account_id,
            contact,
            tier,
            state: LifecycleState::Assess,
            step_count: 0,
            max_steps: cadence.max_steps,
            next_action_at: Some(now),
            last_transition_at: now,
            created_at: now,
            version: 0,
            responded: false,
            responded_at: None,
            thread: None,
            pending_notice: None,
            referred_by: None,
            score: None,
            score_reasoning: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: u32, reasoning: impl Into<String>) -> Self {
        self.score = Some(score);
        self.score_reasoning = Some(reasoning.into());
        self
    }

    pub fn with_referrer(mut self, referrer: Uuid) -> Self {
        self.referred_by = Some(referrer);
        self
    }

    pub fn cadence(&self) -> Cadence {
        cadence_for(self.tier)
    }

    // -----------------------------------------------------------------------
    // Transition mutators
    //
    // Applied inside the store's compare-and-swap closure. Each one leaves
    // the record in the exact shape the next scheduler tick expects, so a
    // crash after the commit resumes cleanly.
    // -----------------------------------------------------------------------

    /// `Assess`/`Wait` → a send-owed state, due immediately.
    pub fn begin_send(&mut self, kind: StepKind, now: DateTime<Utc>) {
        self.state = match kind {
            StepKind::Initial => LifecycleState::SendInitial,
            StepKind::FollowUp => LifecycleState::SendFollowup,
        };
        self.next_action_at = Some(now);
        self.last_transition_at = now;
    }

    /// Send step done (or degraded past retries) → `Wait` with a refreshed
    /// deadline and the "sent" notice owed to the channel.
    pub fn record_send(&mut self, notice: Notice, now: DateTime<Utc>) {
        self.step_count += 1;
        self.state = LifecycleState::Wait;
        self.next_action_at = Some(now + self.cadence().interval_chrono());
        self.pending_notice = Some(notice);
        self.last_transition_at = now;
    }

    /// Sticky response flag. Setting an already-true flag is a no-op.
    pub fn mark_responded(&mut self, at: DateTime<Utc>) {
        if !self.responded {
            self.responded = true;
            self.responded_at = Some(at);
        }
    }

    /// Any non-terminal state → `Escalated`, owing an urgent-or-normal notice.
    pub fn escalate(&mut self, notice: Notice, now: DateTime<Utc>) {
        self.state = LifecycleState::Escalated;
        self.next_action_at = None;
        self.pending_notice = Some(notice);
        self.last_transition_at = now;
    }

    /// `Wait` with the budget spent → `Exhausted`.
    pub fn exhaust(&mut self, notice: Notice, now: DateTime<Utc>) {
        self.state = LifecycleState::Exhausted;
        self.next_action_at = None;
        self.pending_notice = Some(notice);
        self.last_transition_at = now;
    }

    /// `Assess` with a zero budget → `Skipped`. No thread ever exists for
    /// these, so no notice is owed.
    pub fn skip(&mut self, now: DateTime<Utc>) {
        self.state = LifecycleState::Skipped;
        self.next_action_at = None;
        self.last_transition_at = now;
    }

    /// Owed notice posted; remember the thread for subsequent posts.
    pub fn clear_notice(&mut self, thread: impl Into<String>) {
        self.thread = Some(thread.into());
        self.pending_notice = None;
    }

    /// Give up on an owed notice after retries; the lifecycle proceeds and
    /// the loss is recorded instead of blocking the entity forever.
    pub fn abandon_notice(&mut self, note: impl Into<String>) {
        self.pending_notice = None;
        self.annotations.push(note.into());
    }

    /// Record a degraded external call without blocking progression.
    pub fn annotate(&mut self, note: impl Into<String>) {
        self.annotations.push(note.into());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(tier: Tier) -> Entity {
        Entity::new(
            Uuid::new_v4(),
            Contact::new("Ada Lovelace", "ada@acme.test"),
            tier,
            Utc::now(),
        )
    }

    #[test]
    fn new_entity_is_due_immediately() {
        let e = entity(Tier::Hot);
        assert_eq!(e.state, LifecycleState::Assess);
        assert_eq!(e.step_count, 0);
        assert_eq!(e.max_steps, 5);
        assert_eq!(e.version, 0);
        assert!(e.next_action_at.is_some());
    }

    #[test]
    fn record_send_refreshes_deadline() {
        let mut e = entity(Tier::Hot);
        let now = Utc::now();
        e.begin_send(StepKind::Initial, now);
        assert_eq!(e.state, LifecycleState::SendInitial);

        e.record_send(
            Notice {
                message: "sent".into(),
                urgent: false,
            },
            now,
        );
        assert_eq!(e.state, LifecycleState::Wait);
        assert_eq!(e.step_count, 1);
        assert_eq!(e.next_action_at, Some(now + chrono::Duration::hours(4)));
        assert!(e.pending_notice.is_some());
    }

    #[test]
    fn responded_flag_is_sticky() {
        let mut e = entity(Tier::Warm);
        let first = Utc::now();
        e.mark_responded(first);
        let later = first + chrono::Duration::hours(1);
        e.mark_responded(later);
        assert_eq!(e.responded_at, Some(first));
    }

    #[test]
    fn terminal_transitions_clear_deadline() {
        let now = Utc::now();
        let mut a = entity(Tier::Hot);
        a.escalate(
            Notice {
                message: "replied".into(),
                urgent: true,
            },
            now,
        );
        assert_eq!(a.state, LifecycleState::Escalated);
        assert!(a.next_action_at.is_none());

        let mut b = entity(Tier::Cold);
        b.exhaust(
            Notice {
                message: "done".into(),
                urgent: false,
            },
            now,
        );
        assert!(b.next_action_at.is_none());

        let mut c = entity(Tier::Unqualified);
        c.skip(now);
        assert!(c.next_action_at.is_none());
        assert!(c.pending_notice.is_none());
    }

    #[test]
    fn clear_notice_pins_thread() {
        let mut e = entity(Tier::Hot);
        let now = Utc::now();
        e.begin_send(StepKind::Initial, now);
        e.record_send(
            Notice {
                message: "sent".into(),
                urgent: false,
            },
            now,
        );
        e.clear_notice("thread-1");
        assert_eq!(e.thread.as_deref(), Some("thread-1"));
        assert!(e.pending_notice.is_none());
    }

    #[test]
    fn normalized_email_lowercases() {
        let c = Contact::new("Ada", "  Ada@Acme.TEST ");
        assert_eq!(c.normalized_email(), "ada@acme.test");
    }

    #[test]
    fn entity_json_roundtrip() {
        let e = entity(Tier::Warm).with_score(72, "good ICP match");
        let json = serde_json::to_vec(&e).unwrap();
        let parsed: Entity = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed.id, e.id);
        assert_eq!(parsed.tier, Tier::Warm);
        assert_eq!(parsed.score, Some(72));
        assert_eq!(parsed.max_steps, 3);
    }
}
