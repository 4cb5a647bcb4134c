//! Registry inspection tool.
//!
//! Reads a persisted registry file without booting any feature:
//! - `inspect`: list interaction handlers and scheduled jobs with their status
//! - `prune`: drop expired interaction handlers and save the file

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use plugin_host::host::{RegistryState, RegistryStore};
use plugin_host::observability::init_tracing;
use plugin_host::types::intent_type_of;
use plugin_host::{Config, Interactions};

#[derive(Debug, Parser)]
#[command(name = "plugin-host", version, about = "Inspect a persisted plugin host registry")]
struct Cli {
    /// Registry file. Defaults to the path from the config file.
    #[arg(long, env = "PLUGIN_HOST_STORE")]
    store: Option<PathBuf>,

    /// JSON config file providing `storage.registry_path`.
    #[arg(long, env = "PLUGIN_HOST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print interaction handlers and scheduled jobs.
    Inspect,
    /// Remove expired interaction handlers and save.
    Prune,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let path = match (cli.store, cli.config) {
        (Some(store), _) => store,
        (None, Some(config)) => Config::from_file(config)?.storage.registry_path,
        (None, None) => Config::default().storage.registry_path,
    };
    let store = RegistryStore::open(&path)?;
    let now = Utc::now();

    match cli.command {
        Command::Inspect => print!("{}", render(&store.snapshot(), now)),
        Command::Prune => {
            let interactions: Interactions<()> = Interactions::new();
            let before = store.snapshot().interaction_handlers.len();
            interactions.set_handlers(&store.snapshot().interaction_handlers);
            let live = interactions.handlers();
            let removed = before - live.len();
            store.save_interactions(live)?;
            println!("pruned {} expired handler(s) from {}", removed, path.display());
        }
    }
    Ok(())
}

fn render(state: &RegistryState, now: DateTime<Utc>) -> String {
    let mut out = format!("interaction handlers ({}):\n", state.interaction_handlers.len());
    for (token, intent) in &state.interaction_handlers {
        let status = match intent.expires_at() {
            None => "no expiry".to_string(),
            Some(at) if at <= now => format!("expired at {}", at),
            Some(at) => format!("expires at {}", at),
        };
        out.push_str(&format!(
            "  {}  type={}  prefix={}  {}\n",
            token,
            intent.intent_type,
            intent_type_of(token.as_str()).unwrap_or("-"),
            status
        ));
    }

    out.push_str(&format!("scheduled jobs ({}):\n", state.cron_jobs.len()));
    for (job_id, intent) in &state.cron_jobs {
        let status = if intent.is_due_at(now) {
            "overdue"
        } else {
            "pending"
        };
        out.push_str(&format!(
            "  {}  type={}  prefix={}  {} at {}\n",
            job_id,
            intent.intent_type,
            intent_type_of(job_id.as_str()).unwrap_or("-"),
            status,
            intent.execution_time
        ));
    }
    out
}
