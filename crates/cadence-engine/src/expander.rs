//! Campaign expander — "contact a colleague" multi-contact extension.
//!
//! When a HOT-or-above lead commits its first wait, the expander asks the
//! contact-discovery collaborator for more people at the same organization
//! and spawns a sibling lifecycle per new contact. Two guards keep outreach
//! polite: the account's `expanded_at` stamp is claimed atomically so
//! discovery runs at most once per account, and the account contact set
//! rejects any contact already being pursued.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::entity::{Contact, Entity};
use cadence_core::error::CoreError;
use cadence_core::store::LifecycleStore;

use crate::capability::ContactDirectory;
use crate::error::Result;
use crate::retry::{with_retry, RetryPolicy};

// ─── ExpansionReport ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ExpansionReport {
    /// Contacts the directory returned.
    pub discovered: usize,
    /// Sibling lifecycles actually created.
    pub created: usize,
}

// ─── CampaignExpander ─────────────────────────────────────────────────────

pub struct CampaignExpander {
    store: Arc<LifecycleStore>,
    directory: Arc<dyn ContactDirectory>,
    retry: RetryPolicy,
}

impl CampaignExpander {
    pub fn new(
        store: Arc<LifecycleStore>,
        directory: Arc<dyn ContactDirectory>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            directory,
            retry,
        }
    }

    /// Discover colleagues of `trigger`'s contact and create sibling
    /// lifecycles. Idempotent: repeat calls for the same account create
    /// nothing.
    pub async fn expand(
        &self,
        account_id: Uuid,
        trigger: &Entity,
        now: DateTime<Utc>,
    ) -> Result<ExpansionReport> {
        let account = self.store.get_account(account_id)?;
        if account.expanded_at.is_some() {
            debug!("account {account_id} already expanded; skipping discovery");
            return Ok(ExpansionReport::default());
        }
        // Claim the discovery cycle before the slow external call so a
        // racing sibling step can't trigger a second round of outreach.
        if !self.store.try_mark_expanded(account_id, now)? {
            debug!("account {account_id} expansion claimed by another worker");
            return Ok(ExpansionReport::default());
        }

        let contacts = match with_retry(&self.retry, "discover", || {
            self.directory.discover(&account.org_id)
        })
        .await
        {
            Ok(contacts) => contacts,
            Err(err) => {
                warn!(
                    "contact discovery degraded for org {}: {err}",
                    account.org_id
                );
                return Ok(ExpansionReport::default());
            }
        };

        // Fresh contact set: the trigger entity itself was appended at
        // creation, and siblings may have landed since the first read.
        let account = self.store.get_account(account_id)?;
        let mut report = ExpansionReport {
            discovered: contacts.len(),
            created: 0,
        };
        for discovered in contacts {
            let contact = Contact::new(discovered.name, discovered.email);
            if account.has_contact(&contact.normalized_email()) {
                debug!(
                    "contact {} already pursued on account {account_id}",
                    contact.email
                );
                continue;
            }
            let sibling = Entity::new(account_id, contact, trigger.tier, now)
                .with_referrer(trigger.id);
            match self.store.create_entity(&sibling) {
                Ok(()) => {
                    info!(
                        "created sibling lifecycle {} for {} <{}> on account {account_id}",
                        sibling.id, sibling.contact.name, sibling.contact.email
                    );
                    report.created += 1;
                }
                // Duplicate email inside one discovery batch.
                Err(CoreError::ContactExists(email)) => {
                    debug!("contact {email} already pursued on account {account_id}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(report)
    }
}
