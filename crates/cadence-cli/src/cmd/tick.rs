use std::path::Path;

use serde_json::json;

use cadence_core::config::EngineConfig;

use crate::cmd::{build_engine, parse_instant, runtime};

pub fn run(root: &Path, now: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = EngineConfig::load(root)?;
    for warning in config.validate() {
        tracing::warn!("config: {}", warning.message);
    }
    let now = parse_instant(now)?;

    let (recovered, summary) = runtime()?.block_on(async {
        let engine = build_engine(root, &config)?;
        let recovered = engine.scheduler.recover().await?;
        let summary = engine.scheduler.tick(now).await?;
        anyhow::Ok((recovered, summary))
    })?;

    if json {
        println!(
            "{}",
            json!({ "recovered_notices": recovered, "tick": summary })
        );
    } else {
        println!(
            "Tick at {now}: {} submitted, {} completed, {} failed ({} notice(s) recovered)",
            summary.submitted, summary.completed, summary.failed, recovered
        );
    }
    Ok(())
}
