//! External collaborator interfaces.
//!
//! The orchestrator core treats scoring, outbound dispatch, notifications,
//! and contact discovery as black boxes behind these traits. Implementations
//! live with the embedding process (the CLI ships local file-backed
//! adapters; tests use recording fakes).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use cadence_core::entity::Contact;
use cadence_core::types::{StepKind, Tier};

// ─── CapabilityError ──────────────────────────────────────────────────────

/// Failure taxonomy for collaborator calls.
///
/// `Transient` failures are retried with bounded backoff, then the lifecycle
/// proceeds with a degraded annotation. `Permanent` failures (invalid
/// recipient and the like) are never retried and never block progression.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

// ─── Send ─────────────────────────────────────────────────────────────────

/// One outbound message request.
///
/// `(entity_id, step_count)` is the idempotency key: `step_count` is the
/// value *before* the send commits, so a crash-and-replay of the same step
/// presents the same key to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub entity_id: Uuid,
    pub step_count: u32,
    pub kind: StepKind,
    pub contact: Contact,
    pub tier: Tier,
    /// For expansion siblings: the original inquirer's name, so the first
    /// send can open with "your colleague X recently inquired…".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colleague: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub provider_ref: String,
}

#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, req: &SendRequest) -> CapabilityResult<SendReceipt>;
}

// ─── Notify ───────────────────────────────────────────────────────────────

/// Threaded human-facing notification channel.
///
/// The first post for an entity passes `thread = None` and the returned
/// thread ref is persisted for reuse on every subsequent post.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        thread: Option<&str>,
        message: &str,
        urgent: bool,
    ) -> CapabilityResult<String>;
}

// ─── Discover ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredContact {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn discover(&self, org_id: &str) -> CapabilityResult<Vec<DiscoveredContact>>;
}

// ─── Score ────────────────────────────────────────────────────────────────

/// Raw inbound lead, as handed to the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    pub name: String,
    pub email: String,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredLead {
    pub score: u32,
    pub tier: Tier,
    pub reasoning: String,
}

#[async_trait]
pub trait LeadScorer: Send + Sync {
    async fn score(&self, lead: &LeadRecord) -> CapabilityResult<ScoredLead>;
}

// ─── Tests ────────────────────────────────────────────────────────────────
