//! Account — the grouping of lifecycles pursuing the same organization.
//!
//! The campaign expander consults the account's contact set to avoid
//! creating duplicate sibling lifecycles, and its `expanded_at` stamp to run
//! discovery at most once per account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// External organization identifier (domain or CRM id).
    pub org_id: String,
    /// Member lifecycles, appended in creation order — never rewritten.
    pub entity_ids: Vec<Uuid>,
    /// Normalized emails already being pursued on this account.
    pub contact_emails: Vec<String>,
    /// Set when a discovery cycle ran; the at-most-once expansion guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(org_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.into(),
            entity_ids: Vec::new(),
            contact_emails: Vec::new(),
            expanded_at: None,
            created_at: now,
        }
    }

    pub fn has_contact(&self, normalized_email: &str) -> bool {
        self.contact_emails.iter().any(|e| e == normalized_email)
    }

    pub fn push_member(&mut self, entity_id: Uuid, normalized_email: String) {
        self.entity_ids.push(entity_id);
        if !self.has_contact(&normalized_email) {
            self.contact_emails.push(normalized_email);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_member_dedupes_contacts() {
        let mut acct = Account::new("acme.test", Utc::now());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        acct.push_member(a, "ada@acme.test".into());
        acct.push_member(b, "ada@acme.test".into());
        assert_eq!(acct.entity_ids.len(), 2);
        assert_eq!(acct.contact_emails.len(), 1);
    }

    #[test]
    fn has_contact_exact_match() {
        let mut acct = Account::new("acme.test", Utc::now());
        acct.push_member(Uuid::new_v4(), "ada@acme.test".into());
        assert!(acct.has_contact("ada@acme.test"));
        assert!(!acct.has_contact("grace@acme.test"));
    }
}
