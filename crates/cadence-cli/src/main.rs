mod cmd;
mod local;
mod root;

use clap::{Parser, Subcommand};
use cmd::lead::LeadSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cadence",
    about = "Lead follow-up orchestrator — score leads, drive multi-week outreach cadences, escalate responses",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .cadence/)
    #[arg(long, global = true, env = "CADENCE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize cadence in the current project
    Init,

    /// Manage lead lifecycles
    Lead {
        #[command(subcommand)]
        subcommand: LeadSubcommand,
    },

    /// Inject a response event for an entity or a contact
    Respond {
        /// Entity id (omit when using --org/--email)
        entity_id: Option<String>,

        /// Organization id, paired with --email
        #[arg(long, requires = "email")]
        org: Option<String>,

        /// Contact email, paired with --org
        #[arg(long, requires = "org")]
        email: Option<String>,

        /// Response timestamp (RFC 3339; default now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Run one scheduler pass (cron-friendly)
    Tick {
        /// Pretend the tick fires at this instant (RFC 3339; default now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Run recovery, then the scheduler loop until ctrl-c
    Orchestrate,

    /// Show lifecycle counts and due work
    State,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Orchestrate | Commands::Tick { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Lead { subcommand } => cmd::lead::run(&root, subcommand, cli.json),
        Commands::Respond {
            entity_id,
            org,
            email,
            at,
        } => cmd::respond::run(
            &root,
            entity_id.as_deref(),
            org.as_deref(),
            email.as_deref(),
            at.as_deref(),
            cli.json,
        ),
        Commands::Tick { now } => cmd::tick::run(&root, now.as_deref(), cli.json),
        Commands::Orchestrate => cmd::orchestrate::run(&root),
        Commands::State => cmd::state::run(&root, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
