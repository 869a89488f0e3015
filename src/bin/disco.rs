//! disco CLI: run the weekly workflows, or inspect what they persisted.

use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use disco_rs::clock::SystemAlarmClock;
use disco_rs::config::Config;
use disco_rs::engine::{Collaborators, Engine, Unclassified};
use disco_rs::mail::LogOutbox;
use disco_rs::store::{FileStore, SnapshotStore};
use disco_rs::telemetry::{TelemetryConfig, init_telemetry};
use disco_rs::workflows::{LunchtimeDisco, SaturdayDisco, lunchtime, saturday};
use tracing::info;

#[derive(Parser)]
#[command(name = "disco", about = "Weekly game workflows that survive restarts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run both workflows until Ctrl-C
    Serve,
    /// Print a workflow's persisted snapshot as JSON
    Snapshot {
        workflow: WorkflowName,
    },
    /// Print the next anchor instants for both workflows
    Anchor,
}

#[derive(Clone, Copy, ValueEnum)]
enum WorkflowName {
    Saturday,
    Lunchtime,
}

impl WorkflowName {
    fn key(self) -> &'static str {
        match self {
            WorkflowName::Saturday => saturday::KEY,
            WorkflowName::Lunchtime => lunchtime::KEY,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve => cmd_serve(config).await,
        Command::Snapshot { workflow } => cmd_snapshot(&config, workflow).await,
        Command::Anchor => {
            cmd_anchor(&config);
            Ok(())
        }
    }
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_config(&config))?;

    let store: Arc<dyn SnapshotStore> =
        Arc::new(FileStore::open(&config.store_dir, &config.env).await?);
    let outbox = Arc::new(LogOutbox);
    let saturday = SaturdayDisco::new(
        config.saturday_addresses(),
        config.timezone,
        &config.settings.saturday,
    )?;
    let lunchtime = LunchtimeDisco::new(
        config.lunchtime_addresses(),
        config.timezone,
        &config.settings.lunchtime,
    )?;

    let saturday = Engine::start(
        saturday,
        SystemAlarmClock::new(),
        Collaborators {
            store: Arc::clone(&store),
            outbox: outbox.clone(),
            interpreter: Arc::new(Unclassified),
        },
    )
    .await?;

    let lunchtime = Engine::start(
        lunchtime,
        SystemAlarmClock::new(),
        Collaborators {
            store,
            outbox,
            interpreter: Arc::new(Unclassified),
        },
    )
    .await;
    let lunchtime = match lunchtime {
        Ok(handle) => handle,
        Err(e) => {
            saturday.shutdown().await;
            return Err(e.into());
        }
    };

    info!(env = %config.env, store = %config.store_dir.display(), "disco is running");
    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");

    saturday.shutdown().await;
    lunchtime.shutdown().await;
    Ok(())
}

async fn cmd_snapshot(config: &Config, workflow: WorkflowName) -> anyhow::Result<()> {
    let store = FileStore::open(&config.store_dir, &config.env).await?;
    let bytes = store.get(workflow.key()).await?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn cmd_anchor(config: &Config) {
    let now = Utc::now();
    let tz = config.timezone;
    let saturday = saturday::ANCHOR.next_after(now, tz).with_timezone(&tz);
    let lunchtime = lunchtime::ANCHOR.next_after(now, tz).with_timezone(&tz);
    println!("{:<10}  {}", "saturday", saturday.format("%A %-m/%-d %-I:%M%P %Z"));
    println!("{:<10}  {}", "lunchtime", lunchtime.format("%A %-m/%-d %-I:%M%P %Z"));
}
