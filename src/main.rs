//! # firestore-source CLI
//!
//! Pulls Firestore collections (or replays the offline snapshot) and writes
//! the resulting nodes as JSON lines for a downstream site pipeline.
//!
//! ## Usage
//!
//! ```bash
//! firestore-source --config ./config/firestore-source.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sync` | Fetch or replay depending on `OFFLINE_FIRESTORE` and the snapshot |
//! | `fetch` | Always fetch from Firestore and rewrite the snapshot |
//! | `replay` | Always replay the offline snapshot |
//! | `sources` | List configured collections and snapshot status |
//! | `digest <id>` | Print the content digest for a document id |
//!
//! ## Examples
//!
//! ```bash
//! # Normal build: fetch and refresh the snapshot
//! firestore-source sync > nodes.ndjson
//!
//! # Offline build from the last snapshot
//! OFFLINE_FIRESTORE=1 firestore-source sync --out nodes.ndjson
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use firestore_source::config::{self, Config, LoggingConfig};
use firestore_source::firestore::FirestoreConnection;
use firestore_source::ingest::{self, LoadMode, LoadReport};
use firestore_source::logger;
use firestore_source::node::content_digest;
use firestore_source::sink::JsonLinesSink;
use firestore_source::snapshot::OfflineSnapshot;
use firestore_source::sources;
use firestore_source::traits::TracingReporter;

/// Build-time Firestore ingestion with offline snapshot replay.
#[derive(Parser)]
#[command(
    name = "firestore-source",
    about = "Pull Firestore collections into content nodes, with offline snapshot replay",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/firestore-source.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch from Firestore, or replay the snapshot when offline mode is on
    /// and a snapshot exists.
    Sync {
        /// Write nodes to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Fetch from Firestore regardless of offline mode.
    Fetch {
        /// Write nodes to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Replay the offline snapshot regardless of offline mode.
    Replay {
        /// Write nodes to this file instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List configured collections and the offline snapshot status.
    Sources,

    /// Print the content digest for a document id.
    Digest {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Digest { id } = &cli.command {
        println!("{}", content_digest(id));
        return Ok(());
    }

    let cfg = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            logger::initialize(&LoggingConfig::default());
            return Err(e);
        }
    };
    logger::initialize(&cfg.logging);

    match cli.command {
        Commands::Sync { out } => {
            let offline = ingest::offline_mode_requested(&cfg.offline.env_var);
            run(&cfg, out.as_deref(), Mode::Dispatch { offline }).await?;
        }
        Commands::Fetch { out } => {
            run(&cfg, out.as_deref(), Mode::Remote).await?;
        }
        Commands::Replay { out } => {
            run(&cfg, out.as_deref(), Mode::Replay).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Digest { .. } => unreachable!(),
    }

    Ok(())
}

enum Mode {
    Dispatch { offline: bool },
    Remote,
    Replay,
}

async fn run(cfg: &Config, out: Option<&Path>, mode: Mode) -> Result<()> {
    let writer: Box<dyn Write + Send> = match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Box::new(std::fs::File::create(path)?)
        }
        None => Box::new(std::io::stdout()),
    };
    let sink = JsonLinesSink::new(BufWriter::new(writer));

    let types = cfg.collection_specs();
    let snapshot = OfflineSnapshot::new(&cfg.offline.snapshot_path);
    let reporter = TracingReporter;

    let report = match mode {
        Mode::Dispatch { offline } => {
            let store = FirestoreConnection::from_config(&cfg.firestore)?;
            ingest::source_nodes(&store, &types, &snapshot, offline, &sink, &reporter).await?
        }
        Mode::Remote => {
            let store = FirestoreConnection::from_config(&cfg.firestore)?;
            ingest::load_from_remote(&store, &types, &snapshot, &sink, &reporter).await?
        }
        Mode::Replay => {
            if !snapshot.exists() {
                bail!(
                    "No offline snapshot at {}. Run `firestore-source fetch` first.",
                    snapshot.path().display()
                );
            }
            ingest::load_from_file(&types, &snapshot, &sink).await?
        }
    };

    sink.into_inner()?.flush()?;
    print_summary(&report, &snapshot);
    Ok(())
}

fn print_summary(report: &LoadReport, snapshot: &OfflineSnapshot) {
    let mode = match report.mode {
        LoadMode::Remote => "remote",
        LoadMode::Replay => "replay",
        LoadMode::Unavailable => "unavailable",
    };
    eprintln!("source {}", mode);
    eprintln!("  nodes created: {}", report.nodes_created);
    eprintln!("  snapshot: {}", snapshot.path().display());
    eprintln!("ok");
}
