pub mod init;
pub mod lead;
pub mod orchestrate;
pub mod respond;
pub mod state;
pub mod tick;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use cadence_core::config::EngineConfig;
use cadence_core::error::CoreError;
use cadence_core::paths;
use cadence_core::store::LifecycleStore;
use cadence_engine::{CampaignExpander, RetryPolicy, Scheduler, StepExecutor};

use crate::local::{JournalNotifier, OutboxSender, RosterDirectory};

// ---------------------------------------------------------------------------
// Shared wiring
// ---------------------------------------------------------------------------

pub(crate) struct Engine {
    pub store: Arc<LifecycleStore>,
    pub executor: Arc<StepExecutor>,
    pub scheduler: Scheduler,
}

pub(crate) fn open_store(root: &Path) -> anyhow::Result<Arc<LifecycleStore>> {
    if !paths::config_path(root).exists() {
        return Err(CoreError::NotInitialized.into());
    }
    let store = LifecycleStore::open(&paths::store_path(root))
        .context("failed to open lifecycle store")?;
    Ok(Arc::new(store))
}

/// Wire the engine against the local file-backed collaborator adapters.
pub(crate) fn build_engine(root: &Path, config: &EngineConfig) -> anyhow::Result<Engine> {
    let store = open_store(root)?;
    let retry = RetryPolicy::from_config(config);
    let outbound = Arc::new(OutboxSender::new(root));
    let notifier = Arc::new(JournalNotifier::new(root));
    let directory = Arc::new(RosterDirectory::new(root));
    let expander = Arc::new(CampaignExpander::new(
        store.clone(),
        directory,
        retry.clone(),
    ));
    let executor = Arc::new(StepExecutor::new(
        store.clone(),
        outbound,
        notifier,
        Some(expander),
        retry,
    ));
    let scheduler = Scheduler::new(store.clone(), executor.clone(), config);
    Ok(Engine {
        store,
        executor,
        scheduler,
    })
}

pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

pub(crate) fn parse_instant(s: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match s {
        Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("'{raw}' is not an RFC 3339 timestamp"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
