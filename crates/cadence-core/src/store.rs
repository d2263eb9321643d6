//! Persistent lifecycle state store using redb.
//!
//! # Table design
//!
//! `ENTITIES` maps the 16-byte entity uuid to a JSON-encoded record. A
//! secondary `DUE` index uses a 24-byte composite key:
//! ```text
//! [ next_action_at ms: u64 big-endian (8 bytes) | entity uuid: 16 bytes ]
//! ```
//! Because the timestamp occupies the high bytes in big-endian encoding,
//! byte ordering equals deadline ordering: a single range scan
//! `..=due_upper_bound(now)` returns every due entity in `next_action_at`
//! ascending order, which bounds catch-up latency after downtime. The index
//! is maintained in the same write transaction as every entity write, so it
//! never holds a stale key.
//!
//! # Concurrency
//!
//! All mutation goes through `compare_and_swap`: the version check runs
//! inside the write transaction, so a stale writer aborts without touching
//! the record. No lock spans more than one entity.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::account::Account;
use crate::entity::Entity;
use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

/// Key: entity uuid (16 bytes). Value: JSON-encoded Entity.
const ENTITIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entities");
/// Key: 24-byte composite (deadline ms big-endian ++ uuid). Value: entity uuid.
const DUE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("due");
/// Key: account uuid (16 bytes). Value: JSON-encoded Account.
const ACCOUNTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("accounts");
/// Key: organization id string. Value: account uuid (16 bytes).
const ORG_ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("org_accounts");

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn due_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].copy_from_slice(id.as_bytes());
    key
}

/// Upper bound for a range scan returning all entities due by `now`.
///
/// The uuid suffix is `0xff` × 16, greater than any valid uuid, so every
/// entity with `deadline_ms <= now_ms` is included.
fn due_upper_bound(now: DateTime<Utc>) -> [u8; 24] {
    let mut key = [0u8; 24];
    let ms = now.timestamp_millis().max(0) as u64;
    key[..8].copy_from_slice(&ms.to_be_bytes());
    key[8..].fill(0xff);
    key
}

fn db_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// LifecycleStore
// ---------------------------------------------------------------------------

/// Durable store for entity lifecycles and their accounts.
pub struct LifecycleStore {
    db: Database,
}

impl LifecycleStore {
    /// Open or create the redb database at `path`, ensuring all tables
    /// exist before any reads.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(ENTITIES).map_err(db_err)?;
        wt.open_table(DUE).map_err(db_err)?;
        wt.open_table(ACCOUNTS).map_err(db_err)?;
        wt.open_table(ORG_ACCOUNTS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Entity operations
    // -----------------------------------------------------------------------

    /// Insert a new entity and append it to its account's member set in one
    /// transaction.
    ///
    /// Fails with `EntityExists` on id collision and `ContactExists` when
    /// the contact's normalized email is already pursued on the account —
    /// the unique constraint that makes creation idempotent for callers.
    pub fn create_entity(&self, entity: &Entity) -> Result<()> {
        let email = entity.contact.normalized_email();
        let value = serde_json::to_vec(entity)?;

        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut entities = wt.open_table(ENTITIES).map_err(db_err)?;
            if entities
                .get(entity.id.as_bytes().as_slice())
                .map_err(db_err)?
                .is_some()
            {
                return Err(CoreError::EntityExists(entity.id));
            }

            let mut accounts = wt.open_table(ACCOUNTS).map_err(db_err)?;
            let mut account = read_account(&accounts, entity.account_id)?;
            if account.has_contact(&email) {
                return Err(CoreError::ContactExists(email));
            }
            account.push_member(entity.id, email);
            accounts
                .insert(
                    account.id.as_bytes().as_slice(),
                    serde_json::to_vec(&account)?.as_slice(),
                )
                .map_err(db_err)?;

            entities
                .insert(entity.id.as_bytes().as_slice(), value.as_slice())
                .map_err(db_err)?;

            if let Some(due) = schedulable_at(entity) {
                let mut index = wt.open_table(DUE).map_err(db_err)?;
                index
                    .insert(
                        due_key(due, entity.id).as_slice(),
                        entity.id.as_bytes().as_slice(),
                    )
                    .map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// Fresh read of one entity.
    pub fn get(&self, id: Uuid) -> Result<Entity> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ENTITIES).map_err(db_err)?;
        let value = table
            .get(id.as_bytes().as_slice())
            .map_err(db_err)?
            .ok_or(CoreError::EntityNotFound(id))?;
        Ok(serde_json::from_slice(value.value())?)
    }

    /// Apply one state transition atomically.
    ///
    /// Reads the current record inside the write transaction, verifies
    /// `version == expected_version`, applies `mutator`, increments the
    /// version, and rewrites both the record and its due-index key. A stale
    /// `expected_version` aborts with `VersionConflict`; the caller must
    /// re-read and recompute the transition from fresh state.
    pub fn compare_and_swap(
        &self,
        id: Uuid,
        expected_version: u64,
        mutator: impl FnOnce(&mut Entity),
    ) -> Result<Entity> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let next = {
            let mut entities = wt.open_table(ENTITIES).map_err(db_err)?;
            let current: Entity = {
                let value = entities
                    .get(id.as_bytes().as_slice())
                    .map_err(db_err)?
                    .ok_or(CoreError::EntityNotFound(id))?;
                serde_json::from_slice(value.value())?
            };
            if current.version != expected_version {
                // Dropping the uncommitted transaction aborts it.
                return Err(CoreError::VersionConflict {
                    id,
                    expected: expected_version,
                    actual: current.version,
                });
            }

            let mut next = current.clone();
            mutator(&mut next);
            next.version = current.version + 1;

            entities
                .insert(id.as_bytes().as_slice(), serde_json::to_vec(&next)?.as_slice())
                .map_err(db_err)?;

            let mut index = wt.open_table(DUE).map_err(db_err)?;
            if let Some(old) = schedulable_at(&current) {
                index.remove(due_key(old, id).as_slice()).map_err(db_err)?;
            }
            if let Some(new) = schedulable_at(&next) {
                index
                    .insert(due_key(new, id).as_slice(), id.as_bytes().as_slice())
                    .map_err(db_err)?;
            }
            next
        };
        wt.commit().map_err(db_err)?;
        Ok(next)
    }

    /// All non-terminal entities with `next_action_at <= now`, deadline
    /// ascending.
    pub fn query_due(&self, now: DateTime<Utc>) -> Result<Vec<Entity>> {
        let upper = due_upper_bound(now);
        let rt = self.db.begin_read().map_err(db_err)?;
        let index = rt.open_table(DUE).map_err(db_err)?;
        let entities = rt.open_table(ENTITIES).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in index.range(..=upper.as_slice()).map_err(db_err)? {
            let (key, _) = entry.map_err(db_err)?;
            let id = Uuid::from_slice(&key.value()[8..]).map_err(db_err)?;
            let Some(value) = entities.get(id.as_bytes().as_slice()).map_err(db_err)? else {
                continue;
            };
            let entity: Entity = serde_json::from_slice(value.value())?;
            // Terminal entities never carry a due key, but filter anyway.
            if !entity.state.is_terminal() {
                result.push(entity);
            }
        }
        Ok(result)
    }

    /// Entities carrying an owed notification, for startup recovery.
    pub fn scan_pending_notices(&self) -> Result<Vec<Entity>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|e| e.pending_notice.is_some())
            .collect())
    }

    /// All entities, newest first.
    pub fn list_all(&self) -> Result<Vec<Entity>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ENTITIES).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            result.push(serde_json::from_slice::<Entity>(value.value())?);
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Account operations
    // -----------------------------------------------------------------------

    /// The account for an organization, created lazily on first use.
    pub fn account_for_org(&self, org_id: &str, now: DateTime<Utc>) -> Result<Account> {
        if let Some(existing) = self.find_account_by_org(org_id)? {
            return Ok(existing);
        }
        let account = Account::new(org_id, now);
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut orgs = wt.open_table(ORG_ACCOUNTS).map_err(db_err)?;
            // Lost a creation race: keep the winner.
            if let Some(existing) = orgs.get(org_id).map_err(db_err)? {
                let id = Uuid::from_slice(existing.value()).map_err(db_err)?;
                drop(existing);
                let accounts = wt.open_table(ACCOUNTS).map_err(db_err)?;
                return read_account(&accounts, id);
            }
            orgs.insert(org_id, account.id.as_bytes().as_slice())
                .map_err(db_err)?;
            let mut accounts = wt.open_table(ACCOUNTS).map_err(db_err)?;
            accounts
                .insert(
                    account.id.as_bytes().as_slice(),
                    serde_json::to_vec(&account)?.as_slice(),
                )
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(account)
    }

    pub fn get_account(&self, id: Uuid) -> Result<Account> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ACCOUNTS).map_err(db_err)?;
        read_account(&table, id)
    }

    pub fn find_account_by_org(&self, org_id: &str) -> Result<Option<Account>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let orgs = rt.open_table(ORG_ACCOUNTS).map_err(db_err)?;
        let Some(value) = orgs.get(org_id).map_err(db_err)? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(value.value()).map_err(db_err)?;
        let accounts = rt.open_table(ACCOUNTS).map_err(db_err)?;
        read_account(&accounts, id).map(Some)
    }

    /// Claim the account's single discovery cycle.
    ///
    /// Returns `true` for exactly one caller; everyone else sees the stamp
    /// and backs off, which is what makes expansion run at most once per
    /// account.
    pub fn try_mark_expanded(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let claimed = {
            let mut accounts = wt.open_table(ACCOUNTS).map_err(db_err)?;
            let mut account = read_account(&accounts, account_id)?;
            if account.expanded_at.is_some() {
                false
            } else {
                account.expanded_at = Some(now);
                accounts
                    .insert(
                        account.id.as_bytes().as_slice(),
                        serde_json::to_vec(&account)?.as_slice(),
                    )
                    .map_err(db_err)?;
                true
            }
        };
        wt.commit().map_err(db_err)?;
        Ok(claimed)
    }

    /// Resolve a response event keyed by organization + contact email.
    pub fn find_by_contact(&self, org_id: &str, email: &str) -> Result<Option<Entity>> {
        let Some(account) = self.find_account_by_org(org_id)? else {
            return Ok(None);
        };
        let normalized = email.trim().to_ascii_lowercase();
        for id in &account.entity_ids {
            let entity = self.get(*id)?;
            if entity.contact.normalized_email() == normalized {
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }
}

/// The deadline under which an entity appears in the due index: terminal
/// rows are retained for audit but never scheduled.
fn schedulable_at(entity: &Entity) -> Option<DateTime<Utc>> {
    if entity.state.is_terminal() {
        None
    } else {
        entity.next_action_at
    }
}

fn read_account<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    id: Uuid,
) -> Result<Account> {
    let value = table
        .get(id.as_bytes().as_slice())
        .map_err(db_err)?
        .ok_or(CoreError::AccountNotFound(id))?;
    Ok(serde_json::from_slice(value.value())?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
