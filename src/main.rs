//! # Wamark — WhatsApp group auto-reaction bot
//!
//! Watches selected group chats for messages mentioning roster names and
//! answers each exactly once, with per-group cooldowns and a global
//! per-minute budget. Also replays missed backlog and runs checkpointed
//! bulk campaigns. Controlled over a local HTTP API.
//!
//! Usage:
//!   wamark                       # Start with ~/.wamark/config.toml
//!   wamark --port 8080           # Custom control port
//!   wamark --data-dir ./data     # Custom store location

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wamark_core::config::WamarkConfig;
use wamark_core::traits::{Gateway, NullGateway};
use wamark_core::types::{ClientEntry, ReactSettings};
use wamark_engine::{BulkRunner, EngineState, Reconciler, Scheduler};
use wamark_gateway::AppState;
use wamark_store::{JsonStore, StateTracker};

#[derive(Parser)]
#[command(name = "wamark", version, about = "✅ Wamark — WhatsApp group auto-reaction bot")]
struct Cli {
    /// Config file path (default: ~/.wamark/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control server host override
    #[arg(long)]
    host: Option<String>,

    /// Control server port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Store directory override
    #[arg(long)]
    data_dir: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "wamark=debug,wamark_engine=debug,wamark_gateway=debug,tower_http=debug"
    } else {
        "wamark=info,wamark_engine=info,wamark_gateway=info,wamark_store=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => WamarkConfig::load_from(path)?,
        None => WamarkConfig::load()?,
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let data_dir = PathBuf::from(&config.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    // three stores, one file each: control-surface state, bulk campaign
    // state, and the dispatch bookkeeping (done/lastChecked/cool keys)
    let app_store = Arc::new(JsonStore::open(&data_dir.join("app-store.json")));
    let bulk_store = Arc::new(JsonStore::open(&data_dir.join("bulk-store.json")));
    let tracker = StateTracker::new(Arc::new(JsonStore::open(&data_dir.join("wbot-state.json"))));

    // engine state seeded from the persisted control-surface values,
    // falling back to the config file
    let settings = app_store
        .get("settings")
        .and_then(|v| serde_json::from_value::<ReactSettings>(v).ok())
        .unwrap_or_else(|| config.react.clone());
    let roster = app_store
        .get("clients")
        .and_then(|v| serde_json::from_value::<Vec<ClientEntry>>(v).ok())
        .unwrap_or_default();
    let selected = app_store
        .get("selectedGroupIds")
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .unwrap_or_default();
    let engine = Arc::new(EngineState::new(settings, roster, selected));

    // transport placeholder: a session-backed gateway slots in here
    let gateway: Arc<dyn Gateway> = Arc::new(NullGateway);

    let scheduler = Scheduler::new(gateway.clone(), tracker.clone(), engine.clone());
    let reconciler = Reconciler::new(
        gateway.clone(),
        tracker.clone(),
        engine.clone(),
        scheduler.clone(),
        config.backlog.page_size,
        config.backlog.limit_per_chat,
    );
    let bulk = BulkRunner::new(gateway.clone(), bulk_store.clone());
    bulk.load_checkpoint();

    // live push events feed the dispatch queue for as long as the
    // gateway's stream lasts
    let live = scheduler.clone();
    tokio::spawn(async move {
        if let Err(e) = live.run_live_adapter().await {
            tracing::warn!("⚠️ live adapter unavailable: {e}");
        }
    });

    println!("✅ Wamark v{}", env!("CARGO_PKG_VERSION"));
    println!("   🌐 Control API: http://{}:{}", config.server.host, config.server.port);
    println!("   📂 Data Dir:    {}", data_dir.display());
    println!();

    let state = Arc::new(AppState {
        gateway,
        scheduler,
        reconciler,
        bulk,
        engine,
        tracker,
        app_store,
        bulk_store,
        bulk_defaults: config.bulk.clone(),
    });

    wamark_gateway::serve(&config.server.host, config.server.port, state).await
}
