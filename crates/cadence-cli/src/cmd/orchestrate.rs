use std::path::Path;

use tokio::sync::mpsc;
use tracing::info;

use cadence_core::config::EngineConfig;
use cadence_engine::ResponseListener;

use crate::cmd::{build_engine, runtime};

/// Run recovery, then the scheduler loop and response listener until
/// ctrl-c. The response channel is held open for embedding surfaces
/// (webhook bridges); operators inject responses with `cadence respond`.
pub fn run(root: &Path) -> anyhow::Result<()> {
    let config = EngineConfig::load(root)?;
    for warning in config.validate() {
        tracing::warn!("config: {}", warning.message);
    }

    runtime()?.block_on(async {
        let engine = build_engine(root, &config)?;

        let recovered = engine.scheduler.recover().await?;
        if recovered > 0 {
            info!("recovered {recovered} owed notification(s) from a prior run");
        }

        let (_tx, rx) = mpsc::channel(64);
        let listener = ResponseListener::new(engine.store.clone(), engine.executor.clone());

        info!(
            "orchestrator running (tick every {:?}, {} worker slots) — ctrl-c to stop",
            config.tick_interval(),
            config.max_workers
        );
        tokio::select! {
            _ = engine.scheduler.run() => {}
            _ = listener.run(rx) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down; in-flight steps resume from the store on restart");
            }
        }
        anyhow::Ok(())
    })
}
