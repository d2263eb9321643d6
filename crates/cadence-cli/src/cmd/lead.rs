use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use uuid::Uuid;

use cadence_core::entity::{Contact, Entity};
use cadence_core::types::Tier;
use cadence_engine::{LeadRecord, LeadScorer};

use crate::cmd::{open_store, runtime};
use crate::local::FixedScorer;

#[derive(Subcommand)]
pub enum LeadSubcommand {
    /// Score and ingest a new lead, creating its follow-up lifecycle
    Add {
        /// Contact name
        #[arg(long)]
        name: String,

        /// Contact email
        #[arg(long)]
        email: String,

        /// Organization id (groups contacts into an account)
        #[arg(long)]
        org: String,

        /// Qualification tier: scorching, hot, warm, cool, cold, unqualified
        #[arg(long)]
        tier: String,

        /// Score 0-100
        #[arg(long, default_value_t = 50)]
        score: u32,

        /// Scoring rationale
        #[arg(long, default_value = "operator-assigned tier")]
        reasoning: String,
    },

    /// List all lifecycles, newest first
    List,

    /// Show one lifecycle in full
    Show { id: String },
}

pub fn run(root: &Path, subcommand: LeadSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        LeadSubcommand::Add {
            name,
            email,
            org,
            tier,
            score,
            reasoning,
        } => add(root, &name, &email, &org, &tier, score, &reasoning, json),
        LeadSubcommand::List => list(root, json),
        LeadSubcommand::Show { id } => show(root, &id),
    }
}

#[allow(clippy::too_many_arguments)]
fn add(
    root: &Path,
    name: &str,
    email: &str,
    org: &str,
    tier: &str,
    score: u32,
    reasoning: &str,
    json: bool,
) -> anyhow::Result<()> {
    // Unknown tier strings are a creation-time error, never tolerated
    // downstream.
    let tier = Tier::from_str(tier)?;

    let scorer = FixedScorer {
        tier,
        score,
        reasoning: reasoning.to_string(),
    };
    let record = LeadRecord {
        name: name.to_string(),
        email: email.to_string(),
        org_id: org.to_string(),
        notes: None,
    };
    let scored = runtime()?
        .block_on(scorer.score(&record))
        .context("scoring failed")?;

    let store = open_store(root)?;
    let now = Utc::now();
    let account = store.account_for_org(org, now)?;
    let entity = Entity::new(account.id, Contact::new(name, email), scored.tier, now)
        .with_score(scored.score, scored.reasoning);
    store.create_entity(&entity)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entity)?);
    } else {
        println!(
            "Created {} lifecycle {} for {} <{}> on account {} ({} sends budgeted)",
            entity.tier, entity.id, name, email, org, entity.max_steps
        );
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let entities = store.list_all()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entities)?);
        return Ok(());
    }
    if entities.is_empty() {
        println!("No lifecycles yet — add one with 'cadence lead add'.");
        return Ok(());
    }
    for e in entities {
        println!(
            "{}  {:<10} {:<13} {}/{} sends  {} <{}>",
            e.id,
            e.tier,
            e.state,
            e.step_count,
            e.max_steps,
            e.contact.name,
            e.contact.email
        );
    }
    Ok(())
}

fn show(root: &Path, id: &str) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let id = Uuid::parse_str(id).with_context(|| format!("'{id}' is not an entity id"))?;
    let entity = store.get(id)?;
    println!("{}", serde_json::to_string_pretty(&entity)?);
    Ok(())
}
