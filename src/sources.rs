use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::ingest::offline_mode_requested;
use crate::snapshot::OfflineSnapshot;

/// Print configured collections and the offline snapshot status.
pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<32} {:<24} MAP", "COLLECTION", "TYPE");
    for t in &config.types {
        let map = if t.fields.is_none() && t.rename.is_empty() {
            "identity"
        } else {
            "custom"
        };
        println!("{:<32} {:<24} {}", t.collection, t.node_type, map);
    }

    let snapshot = OfflineSnapshot::new(&config.offline.snapshot_path);
    println!();
    println!("snapshot: {}", snapshot.path().display());
    if snapshot.exists() {
        let lines = snapshot.read_lines()?.len();
        let modified = std::fs::metadata(snapshot.path())
            .and_then(|m| m.modified())
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        println!("  nodes: {}", lines);
        println!("  modified: {}", modified);
    } else {
        println!("  not present");
    }

    let offline = offline_mode_requested(&config.offline.env_var);
    println!(
        "offline mode ({}): {}",
        config.offline.env_var,
        if offline { "on" } else { "off" }
    );

    Ok(())
}
