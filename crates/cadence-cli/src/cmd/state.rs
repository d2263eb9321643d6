use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::Utc;
use serde_json::json;

use cadence_core::types::LifecycleState;

use crate::cmd::open_store;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let entities = store.list_all()?;
    let due_now = store.query_due(Utc::now())?.len();

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for state in LifecycleState::all() {
        counts.insert(state.as_str(), 0);
    }
    let mut accounts = HashSet::new();
    let mut responded = 0usize;
    for e in &entities {
        *counts.entry(e.state.as_str()).or_default() += 1;
        accounts.insert(e.account_id);
        if e.responded {
            responded += 1;
        }
    }

    if json {
        println!(
            "{}",
            json!({
                "lifecycles": entities.len(),
                "accounts": accounts.len(),
                "responded": responded,
                "due_now": due_now,
                "states": counts,
            })
        );
        return Ok(());
    }

    println!(
        "{} lifecycle(s) across {} account(s) — {} due now, {} responded",
        entities.len(),
        accounts.len(),
        due_now,
        responded
    );
    for (state, count) in counts {
        if count > 0 {
            println!("  {state:<13} {count}");
        }
    }
    Ok(())
}
