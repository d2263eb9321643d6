//! Lifecycle transition planner.
//!
//! `decide` is a total, pure function of (record, now) — it reads one entity
//! and names the single step the executor should take next. All timing
//! knowledge lives on the record (`next_action_at`), which keeps the
//! scheduler stateless with respect to cadence logic.
//!
//! `responded` is checked before anything else: a response that lands while
//! a send is owed converts the step into an escalation rather than another
//! outbound message.

use chrono::{DateTime, Utc};

use crate::entity::Entity;
use crate::types::{LifecycleState, StepKind};

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// The next step for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Terminal, or not yet due. Nothing to do.
    Idle,
    /// `Assess` with a zero send budget → `Skipped`.
    Skip,
    /// Commit the send-owed state before calling the provider.
    BeginSend(StepKind),
    /// A send-owed state is committed; perform the outbound call.
    PerformSend(StepKind),
    /// The budget is spent and no response arrived → `Exhausted`.
    Exhaust,
    /// The sticky response flag is set on a non-terminal record.
    Escalate,
}

pub fn decide(entity: &Entity, now: DateTime<Utc>) -> Decision {
    if entity.state.is_terminal() {
        return Decision::Idle;
    }
    // Response wins every race, including mid-send.
    if entity.responded {
        return Decision::Escalate;
    }
    match entity.state {
        LifecycleState::Assess => {
            if entity.max_steps == 0 {
                Decision::Skip
            } else {
                Decision::BeginSend(StepKind::Initial)
            }
        }
        LifecycleState::SendInitial => Decision::PerformSend(StepKind::Initial),
        LifecycleState::SendFollowup => Decision::PerformSend(StepKind::FollowUp),
        LifecycleState::Wait => match entity.next_action_at {
            Some(due) if due <= now => {
                if entity.step_count < entity.max_steps {
                    Decision::BeginSend(StepKind::FollowUp)
                } else {
                    Decision::Exhaust
                }
            }
            _ => Decision::Idle,
        },
        // is_terminal() covered these above.
        LifecycleState::Escalated | LifecycleState::Exhausted | LifecycleState::Skipped => {
            Decision::Idle
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Contact, Notice};
    use crate::types::Tier;
    use uuid::Uuid;

    fn entity(tier: Tier, now: DateTime<Utc>) -> Entity {
        Entity::new(
            Uuid::new_v4(),
            Contact::new("Ada Lovelace", "ada@acme.test"),
            tier,
            now,
        )
    }

    fn sent_notice() -> Notice {
        Notice {
            message: "sent".into(),
            urgent: false,
        }
    }

    #[test]
    fn assess_with_budget_begins_initial_send() {
        let now = Utc::now();
        let e = entity(Tier::Hot, now);
        assert_eq!(decide(&e, now), Decision::BeginSend(StepKind::Initial));
    }

    #[test]
    fn unqualified_assess_skips() {
        let now = Utc::now();
        let e = entity(Tier::Unqualified, now);
        assert_eq!(decide(&e, now), Decision::Skip);
    }

    #[test]
    fn send_owed_states_perform_send() {
        let now = Utc::now();
        let mut e = entity(Tier::Hot, now);
        e.begin_send(StepKind::Initial, now);
        assert_eq!(decide(&e, now), Decision::PerformSend(StepKind::Initial));

        e.record_send(sent_notice(), now);
        e.begin_send(StepKind::FollowUp, now);
        assert_eq!(decide(&e, now), Decision::PerformSend(StepKind::FollowUp));
    }

    #[test]
    fn wait_before_deadline_is_idle() {
        let now = Utc::now();
        let mut e = entity(Tier::Hot, now);
        e.begin_send(StepKind::Initial, now);
        e.record_send(sent_notice(), now);
        // Deadline is now + 4h; one minute later nothing is due.
        let later = now + chrono::Duration::minutes(1);
        assert_eq!(decide(&e, later), Decision::Idle);
    }

    #[test]
    fn wait_past_deadline_begins_followup() {
        let now = Utc::now();
        let mut e = entity(Tier::Hot, now);
        e.begin_send(StepKind::Initial, now);
        e.record_send(sent_notice(), now);
        let due = now + chrono::Duration::hours(4);
        assert_eq!(decide(&e, due), Decision::BeginSend(StepKind::FollowUp));
    }

    #[test]
    fn wait_past_deadline_with_spent_budget_exhausts() {
        let now = Utc::now();
        let mut e = entity(Tier::Cold, now);
        e.begin_send(StepKind::Initial, now);
        e.record_send(sent_notice(), now);
        e.begin_send(StepKind::FollowUp, now);
        e.record_send(sent_notice(), now);
        assert_eq!(e.step_count, e.max_steps);
        let due = now + chrono::Duration::hours(48);
        assert_eq!(decide(&e, due), Decision::Exhaust);
    }

    #[test]
    fn response_preempts_every_nonterminal_state() {
        let now = Utc::now();
        for prepare in [
            |_: &mut Entity, _: DateTime<Utc>| {},
            |e: &mut Entity, now: DateTime<Utc>| e.begin_send(StepKind::Initial, now),
            |e: &mut Entity, now: DateTime<Utc>| {
                e.begin_send(StepKind::Initial, now);
                e.record_send(
                    Notice {
                        message: "sent".into(),
                        urgent: false,
                    },
                    now,
                );
            },
        ] {
            let mut e = entity(Tier::Warm, now);
            prepare(&mut e, now);
            e.mark_responded(now);
            assert_eq!(decide(&e, now), Decision::Escalate);
        }
    }

    #[test]
    fn terminal_states_are_idle_even_when_responded() {
        let now = Utc::now();
        let mut e = entity(Tier::Hot, now);
        e.mark_responded(now);
        e.escalate(
            Notice {
                message: "replied".into(),
                urgent: true,
            },
            now,
        );
        assert_eq!(decide(&e, now), Decision::Idle);
    }

    #[test]
    fn step_count_never_exceeds_budget() {
        // Drive a HOT entity through its whole campaign via decide().
        let t0 = Utc::now();
        let mut e = entity(Tier::Hot, t0);
        let mut now = t0;
        let mut sends = 0u32;
        loop {
            match decide(&e, now) {
                Decision::BeginSend(kind) => e.begin_send(kind, now),
                Decision::PerformSend(_) => {
                    e.record_send(sent_notice(), now);
                    sends += 1;
                }
                Decision::Idle => now = e.next_action_at.expect("non-terminal must schedule"),
                Decision::Exhaust => {
                    e.exhaust(
                        Notice {
                            message: "exhausted".into(),
                            urgent: false,
                        },
                        now,
                    );
                    break;
                }
                other => panic!("unexpected decision {other:?}"),
            }
            assert!(e.step_count <= e.max_steps);
        }
        assert_eq!(sends, 5);
        assert_eq!(e.step_count, e.max_steps);
        // Five sends at 4h spacing: final send at t0+16h, exhausted at t0+20h.
        assert_eq!(e.last_transition_at, t0 + chrono::Duration::hours(20));
    }
}
