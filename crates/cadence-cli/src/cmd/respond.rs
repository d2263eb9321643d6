use std::path::Path;

use anyhow::{bail, Context};
use serde_json::json;
use uuid::Uuid;

use cadence_core::config::EngineConfig;
use cadence_engine::{ResponseEvent, ResponseListener, ResponseOutcome, ResponseTarget};

use crate::cmd::{build_engine, parse_instant, runtime};

pub fn run(
    root: &Path,
    entity_id: Option<&str>,
    org: Option<&str>,
    email: Option<&str>,
    at: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let config = EngineConfig::load(root)?;
    let responded_at = parse_instant(at)?;

    let target = match (entity_id, org, email) {
        (Some(id), _, _) => ResponseTarget::Entity {
            entity_id: Uuid::parse_str(id)
                .with_context(|| format!("'{id}' is not an entity id"))?,
        },
        (None, Some(org), Some(email)) => ResponseTarget::Contact {
            org_id: org.to_string(),
            email: email.to_string(),
        },
        _ => bail!("provide an entity id, or --org together with --email"),
    };

    let outcome = runtime()?.block_on(async {
        let engine = build_engine(root, &config)?;
        let listener = ResponseListener::new(engine.store.clone(), engine.executor.clone());
        let event = ResponseEvent {
            target,
            responded_at,
        };
        anyhow::Ok(listener.handle(event).await?)
    })?;

    if json {
        let label = match outcome {
            Some(ResponseOutcome::Escalated) => "escalated",
            Some(ResponseOutcome::AlreadyTerminal) => "already_terminal",
            None => "unmatched",
        };
        println!("{}", json!({ "outcome": label }));
        return Ok(());
    }
    match outcome {
        Some(ResponseOutcome::Escalated) => println!("Response recorded — lifecycle escalated."),
        Some(ResponseOutcome::AlreadyTerminal) => {
            println!("Lifecycle already terminal; duplicate or late signal ignored.")
        }
        None => println!("No matching lifecycle; signal ignored."),
    }
    Ok(())
}
