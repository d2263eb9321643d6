//! Response listener — out-of-band escalation on inbound replies.
//!
//! Consumes response events from the embedding process (webhook surface,
//! CLI injection, tests) and applies them to the store. A response
//! preempts a waiting lifecycle at any time; the next scheduler tick for
//! that entity is a no-op confirmation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use cadence_core::error::CoreError;
use cadence_core::store::LifecycleStore;

use crate::error::Result;
use crate::executor::{ResponseOutcome, StepExecutor};

// ─── ResponseEvent ────────────────────────────────────────────────────────

/// How an inbound signal addresses its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseTarget {
    Entity { entity_id: Uuid },
    Contact { org_id: String, email: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub target: ResponseTarget,
    pub responded_at: DateTime<Utc>,
}

// ─── ResponseListener ─────────────────────────────────────────────────────

pub struct ResponseListener {
    store: Arc<LifecycleStore>,
    executor: Arc<StepExecutor>,
}

impl ResponseListener {
    pub fn new(store: Arc<LifecycleStore>, executor: Arc<StepExecutor>) -> Self {
        Self { store, executor }
    }

    /// Drain the event channel until the sender side closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<ResponseEvent>) {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.handle(event).await {
                warn!("response event failed: {e}");
            }
        }
        info!("response channel closed; listener stopping");
    }

    /// Apply one event. Duplicate signals and signals for terminal or
    /// unknown entities are no-ops.
    pub async fn handle(&self, event: ResponseEvent) -> Result<Option<ResponseOutcome>> {
        let entity_id = match self.resolve(&event)? {
            Some(id) => id,
            None => return Ok(None),
        };
        let outcome = self
            .executor
            .apply_response(entity_id, event.responded_at, Utc::now())
            .await?;
        Ok(Some(outcome))
    }

    fn resolve(&self, event: &ResponseEvent) -> Result<Option<Uuid>> {
        match &event.target {
            ResponseTarget::Entity { entity_id } => match self.store.get(*entity_id) {
                Ok(entity) => Ok(Some(entity.id)),
                Err(CoreError::EntityNotFound(id)) => {
                    warn!("response for unknown entity {id} ignored");
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            },
            ResponseTarget::Contact { org_id, email } => {
                match self.store.find_by_contact(org_id, email)? {
                    Some(entity) => Ok(Some(entity.id)),
                    None => {
                        warn!("response for unknown contact {email} at {org_id} ignored");
                        Ok(None)
                    }
                }
            }
        }
    }
}
