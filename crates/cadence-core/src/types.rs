use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Qualification bucket assigned by the scorer at ingestion.
///
/// Immutable once set; drives the cadence policy for the whole campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Scorching,
    Hot,
    Warm,
    Cool,
    Cold,
    Unqualified,
}

impl Tier {
    pub fn all() -> &'static [Tier] {
        &[
            Tier::Scorching,
            Tier::Hot,
            Tier::Warm,
            Tier::Cool,
            Tier::Cold,
            Tier::Unqualified,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Scorching => "scorching",
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cool => "cool",
            Tier::Cold => "cold",
            Tier::Unqualified => "unqualified",
        }
    }

    /// HOT and above qualify for multi-contact campaign expansion.
    pub fn qualifies_for_expansion(self) -> bool {
        matches!(self, Tier::Scorching | Tier::Hot)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scorching" => Ok(Tier::Scorching),
            "hot" => Ok(Tier::Hot),
            "warm" => Ok(Tier::Warm),
            "cool" => Ok(Tier::Cool),
            "cold" => Ok(Tier::Cold),
            "unqualified" => Ok(Tier::Unqualified),
            _ => Err(crate::error::CoreError::InvalidTier(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Persisted state of one follow-up lifecycle.
///
/// `SendInitial` and `SendFollowup` mean "a send is owed now" — they are
/// committed before the outbound call so a crash mid-send resumes at the
/// same step. The notify step is not a state of its own: an owed
/// notification is carried as data on the entity (`pending_notice`) and
/// flushed after the transition that created it commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Assess,
    SendInitial,
    Wait,
    SendFollowup,
    Escalated,
    Exhausted,
    Skipped,
}

impl LifecycleState {
    pub fn all() -> &'static [LifecycleState] {
        &[
            LifecycleState::Assess,
            LifecycleState::SendInitial,
            LifecycleState::Wait,
            LifecycleState::SendFollowup,
            LifecycleState::Escalated,
            LifecycleState::Exhausted,
            LifecycleState::Skipped,
        ]
    }

    /// Terminal states receive no further scheduling, ever.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Escalated | LifecycleState::Exhausted | LifecycleState::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Assess => "assess",
            LifecycleState::SendInitial => "send_initial",
            LifecycleState::Wait => "wait",
            LifecycleState::SendFollowup => "send_followup",
            LifecycleState::Escalated => "escalated",
            LifecycleState::Exhausted => "exhausted",
            LifecycleState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// Which outbound message a send step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Initial,
    FollowUp,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Initial => "initial",
            StepKind::FollowUp => "follow_up",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::str::FromStr;

    #[test]
    fn tier_roundtrip() {
        for tier in Tier::all() {
            let parsed = Tier::from_str(tier.as_str()).unwrap();
            assert_eq!(*tier, parsed);
        }
    }

    #[test]
    fn unknown_tier_is_creation_time_error() {
        let err = Tier::from_str("lukewarm").unwrap_err();
        assert!(matches!(err, CoreError::InvalidTier(_)));
    }

    #[test]
    fn expansion_qualification() {
        assert!(Tier::Scorching.qualifies_for_expansion());
        assert!(Tier::Hot.qualifies_for_expansion());
        assert!(!Tier::Warm.qualifies_for_expansion());
        assert!(!Tier::Cold.qualifies_for_expansion());
        assert!(!Tier::Unqualified.qualifies_for_expansion());
    }

    #[test]
    fn terminal_states() {
        assert!(LifecycleState::Escalated.is_terminal());
        assert!(LifecycleState::Exhausted.is_terminal());
        assert!(LifecycleState::Skipped.is_terminal());
        assert!(!LifecycleState::Assess.is_terminal());
        assert!(!LifecycleState::Wait.is_terminal());
        assert!(!LifecycleState::SendInitial.is_terminal());
        assert!(!LifecycleState::SendFollowup.is_terminal());
    }

    #[test]
    fn state_serde_snake_case() {
        let json = serde_json::to_string(&LifecycleState::SendFollowup).unwrap();
        assert_eq!(json, "\"send_followup\"");
    }
}
