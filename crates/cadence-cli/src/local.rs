//! Local file-backed collaborator adapters.
//!
//! These make the binary operable end-to-end without any network
//! integration: sends append to an outbox journal, notifications append to a
//! notices journal, discovery reads a per-org roster file, and scoring maps
//! an operator-supplied tier. Real deployments replace these with provider
//! adapters behind the same traits.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_core::types::Tier;
use cadence_core::{io, paths};
use cadence_engine::{
    CapabilityError, CapabilityResult, ContactDirectory, DiscoveredContact, LeadRecord,
    LeadScorer, Notifier, Outbound, ScoredLead, SendReceipt, SendRequest,
};

fn io_err(e: cadence_core::CoreError) -> CapabilityError {
    CapabilityError::Transient(e.to_string())
}

// ---------------------------------------------------------------------------
// OutboxSender
// ---------------------------------------------------------------------------

/// Appends every outbound message to `.cadence/outbox.jsonl`.
pub struct OutboxSender {
    path: PathBuf,
}

#[derive(Serialize)]
struct OutboxLine<'a> {
    sent_at: chrono::DateTime<Utc>,
    #[serde(flatten)]
    request: &'a SendRequest,
}

impl OutboxSender {
    pub fn new(root: &std::path::Path) -> Self {
        Self {
            path: paths::outbox_path(root),
        }
    }
}

#[async_trait]
impl Outbound for OutboxSender {
    async fn send(&self, req: &SendRequest) -> CapabilityResult<SendReceipt> {
        let line = serde_json::to_string(&OutboxLine {
            sent_at: Utc::now(),
            request: req,
        })
        .map_err(|e| CapabilityError::Permanent(e.to_string()))?;
        io::append_text(&self.path, &format!("{line}\n")).map_err(io_err)?;
        Ok(SendReceipt {
            provider_ref: format!("outbox-{}-{}", req.entity_id, req.step_count),
        })
    }
}

// ---------------------------------------------------------------------------
// JournalNotifier
// ---------------------------------------------------------------------------

/// Appends notices to `.cadence/notices.jsonl`, one thread ref per entity
/// journey.
pub struct JournalNotifier {
    path: PathBuf,
}

#[derive(Serialize)]
struct NoticeLine<'a> {
    posted_at: chrono::DateTime<Utc>,
    thread: &'a str,
    urgent: bool,
    message: &'a str,
}

impl JournalNotifier {
    pub fn new(root: &std::path::Path) -> Self {
        Self {
            path: paths::notices_path(root),
        }
    }
}

#[async_trait]
impl Notifier for JournalNotifier {
    async fn notify(
        &self,
        thread: Option<&str>,
        message: &str,
        urgent: bool,
    ) -> CapabilityResult<String> {
        let thread = match thread {
            Some(t) => t.to_string(),
            None => format!("thread-{}", Uuid::new_v4()),
        };
        let line = serde_json::to_string(&NoticeLine {
            posted_at: Utc::now(),
            thread: &thread,
            urgent,
            message,
        })
        .map_err(|e| CapabilityError::Permanent(e.to_string()))?;
        io::append_text(&self.path, &format!("{line}\n")).map_err(io_err)?;
        Ok(thread)
    }
}

// ---------------------------------------------------------------------------
// RosterDirectory
// ---------------------------------------------------------------------------

/// Reads additional contacts for an organization from
/// `.cadence/rosters/<org>.yaml`. A missing roster means no colleagues are
/// known — not an error.
pub struct RosterDirectory {
    root: PathBuf,
}

#[derive(Deserialize)]
struct RosterEntry {
    name: String,
    email: String,
    #[serde(default)]
    title: Option<String>,
}

impl RosterDirectory {
    pub fn new(root: &std::path::Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

#[async_trait]
impl ContactDirectory for RosterDirectory {
    async fn discover(&self, org_id: &str) -> CapabilityResult<Vec<DiscoveredContact>> {
        let path = paths::roster_path(&self.root, org_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|e| CapabilityError::Transient(e.to_string()))?;
        let entries: Vec<RosterEntry> = serde_yaml::from_str(&data)
            .map_err(|e| CapabilityError::Permanent(format!("roster {org_id}: {e}")))?;
        Ok(entries
            .into_iter()
            .map(|e| DiscoveredContact {
                name: e.name,
                email: e.email,
                title: e.title,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FixedScorer
// ---------------------------------------------------------------------------

/// Operator-supplied qualification, standing in for the scoring service.
pub struct FixedScorer {
    pub tier: Tier,
    pub score: u32,
    pub reasoning: String,
}

#[async_trait]
impl LeadScorer for FixedScorer {
    async fn score(&self, _lead: &LeadRecord) -> CapabilityResult<ScoredLead> {
        Ok(ScoredLead {
            score: self.score,
            tier: self.tier,
            reasoning: self.reasoning.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::entity::Contact;
    use cadence_core::types::StepKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn outbox_appends_one_line_per_send() {
        let dir = TempDir::new().unwrap();
        let sender = OutboxSender::new(dir.path());
        let req = SendRequest {
            entity_id: Uuid::new_v4(),
            step_count: 0,
            kind: StepKind::Initial,
            contact: Contact::new("Ada Lovelace", "ada@acme.test"),
            tier: Tier::Hot,
            colleague: None,
        };
        sender.send(&req).await.unwrap();
        sender.send(&req).await.unwrap();
        let content = std::fs::read_to_string(paths::outbox_path(dir.path())).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("ada@acme.test"));
    }

    #[tokio::test]
    async fn notifier_creates_then_reuses_thread() {
        let dir = TempDir::new().unwrap();
        let notifier = JournalNotifier::new(dir.path());
        let thread = notifier.notify(None, "first", false).await.unwrap();
        let again = notifier.notify(Some(&thread), "second", true).await.unwrap();
        assert_eq!(thread, again);
        let content = std::fs::read_to_string(paths::notices_path(dir.path())).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn missing_roster_discovers_nothing() {
        let dir = TempDir::new().unwrap();
        let directory = RosterDirectory::new(dir.path());
        let contacts = directory.discover("acme.test").await.unwrap();
        assert!(contacts.is_empty());
    }

    #[tokio::test]
    async fn roster_yaml_parses() {
        let dir = TempDir::new().unwrap();
        let path = paths::roster_path(dir.path(), "acme.test");
        io::atomic_write(
            &path,
            b"- name: Grace Hopper\n  email: grace@acme.test\n  title: VP Engineering\n",
        )
        .unwrap();
        let directory = RosterDirectory::new(dir.path());
        let contacts = directory.discover("acme.test").await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].email, "grace@acme.test");
        assert_eq!(contacts[0].title.as_deref(), Some("VP Engineering"));
    }
}
