use std::path::Path;

use anyhow::Context;

use cadence_core::config::EngineConfig;
use cadence_core::store::LifecycleStore;
use cadence_core::{io, paths};

pub fn run(root: &Path) -> anyhow::Result<()> {
    io::ensure_dir(&paths::cadence_dir(root))?;
    io::ensure_dir(&paths::rosters_dir(root))?;

    let config = EngineConfig::default();
    let yaml = serde_yaml::to_string(&config)?;
    let wrote = io::write_if_missing(&paths::config_path(root), yaml.as_bytes())?;

    // Creates the database and its tables if absent.
    LifecycleStore::open(&paths::store_path(root)).context("failed to create lifecycle store")?;

    if wrote {
        println!("Initialized cadence in {}", root.display());
    } else {
        println!("cadence already initialized in {}", root.display());
    }
    Ok(())
}
