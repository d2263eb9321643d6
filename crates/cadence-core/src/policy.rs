//! Cadence policy — the pure mapping from tier to outreach rhythm.
//!
//! Fixed at entity creation: `max_steps` is frozen onto the entity record so
//! later policy changes never retroactively alter an in-flight campaign.

use crate::types::Tier;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// Outreach rhythm for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Gap between consecutive sends.
    pub interval: Duration,
    /// Total send budget (initial send included).
    pub max_steps: u32,
    /// Whether a response escalates with an urgent (@-mention) notification
    /// rather than a normal one. Both still terminate the lifecycle.
    pub escalate_urgent: bool,
}

const HOUR: u64 = 3600;

/// Policy table. Pure; no state.
pub fn cadence_for(tier: Tier) -> Cadence {
    match tier {
        Tier::Scorching | Tier::Hot => Cadence {
            interval: Duration::from_secs(4 * HOUR),
            max_steps: 5,
            escalate_urgent: true,
        },
        Tier::Warm => Cadence {
            interval: Duration::from_secs(24 * HOUR),
            max_steps: 3,
            escalate_urgent: true,
        },
        Tier::Cool | Tier::Cold => Cadence {
            interval: Duration::from_secs(48 * HOUR),
            max_steps: 2,
            escalate_urgent: false,
        },
        Tier::Unqualified => Cadence {
            interval: Duration::ZERO,
            max_steps: 0,
            escalate_urgent: false,
        },
    }
}

impl Cadence {
    /// Interval as a chrono duration, for deadline arithmetic on timestamps.
    pub fn interval_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.interval).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
