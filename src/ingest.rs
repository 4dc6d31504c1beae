//! Ingestion orchestration.
//!
//! Chooses between a remote fetch and an offline snapshot replay, then drives
//! the chosen loader:
//!
//! ```text
//! source_nodes ──▶ load_from_remote ──▶ snapshot.append + sink.create_node
//!              └─▶ load_from_file   ──▶ sink.create_node
//! ```
//!
//! Exactly one loader runs per call.

use anyhow::Result;
use futures::future::try_join_all;

use crate::models::CollectionSpec;
use crate::node::build_node;
use crate::snapshot::{parse_line, OfflineSnapshot};
use crate::traits::{DocumentStore, NodeSink, Reporter};

/// Which loader ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Fetched from the remote store.
    Remote,
    /// Replayed from the offline snapshot.
    Replay,
    /// The remote connection failed; nothing was emitted.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub mode: LoadMode,
    pub nodes_created: usize,
}

/// True when `env_var` is set to a non-empty value.
pub fn offline_mode_requested(env_var: &str) -> bool {
    std::env::var_os(env_var).is_some_and(|v| !v.is_empty())
}

/// Pick and run a loader.
///
/// With `offline` set and an existing snapshot the snapshot is replayed;
/// otherwise the remote store is fetched (which also rewrites the snapshot).
pub async fn source_nodes(
    store: &dyn DocumentStore,
    types: &[CollectionSpec],
    snapshot: &OfflineSnapshot,
    offline: bool,
    sink: &dyn NodeSink,
    reporter: &dyn Reporter,
) -> Result<LoadReport> {
    if offline {
        reporter.warn("Firestore source offline mode is ON!!!");
    }

    if offline && snapshot.exists() {
        load_from_file(types, snapshot, sink).await
    } else {
        load_from_remote(store, types, snapshot, sink, reporter).await
    }
}

/// Fetch every configured collection, persist each node to the snapshot and
/// hand it to the sink.
///
/// A connection failure is reported as a warning and yields
/// [`LoadMode::Unavailable`] with no error. Any later failure aborts the run.
pub async fn load_from_remote(
    store: &dyn DocumentStore,
    types: &[CollectionSpec],
    snapshot: &OfflineSnapshot,
    sink: &dyn NodeSink,
    reporter: &dyn Reporter,
) -> Result<LoadReport> {
    if let Err(e) = store.connect().await {
        reporter.warn(&format!(
            "Could not initialize Firestore. Please check the `credential` setting: {:#}",
            e
        ));
        return Ok(LoadReport {
            mode: LoadMode::Unavailable,
            nodes_created: 0,
        });
    }

    snapshot.reset()?;

    let fetches = types.iter().map(|spec| async move {
        let docs = store.fetch_collection(&spec.collection).await?;
        let mut created = 0usize;
        for doc in docs {
            let node = build_node(doc, spec);
            snapshot.append(&node)?;
            sink.create_node(node)?;
            created += 1;
        }
        Ok::<usize, anyhow::Error>(created)
    });

    let nodes_created: usize = try_join_all(fetches).await?.into_iter().sum();

    tracing::info!(
        collections = types.len(),
        nodes = nodes_created,
        snapshot = %snapshot.path().display(),
        "Loaded nodes from Firestore"
    );

    Ok(LoadReport {
        mode: LoadMode::Remote,
        nodes_created,
    })
}

/// Replay the offline snapshot to the sink.
///
/// Every spec in `types` replays the whole file; the snapshot does not record
/// which collection a line came from, so only single-collection setups
/// round-trip exactly.
pub async fn load_from_file(
    types: &[CollectionSpec],
    snapshot: &OfflineSnapshot,
    sink: &dyn NodeSink,
) -> Result<LoadReport> {
    let lines = snapshot.read_lines()?;

    let mut nodes_created = 0usize;
    // TODO: tag snapshot lines with their collection so each spec replays only its own nodes.
    for _spec in types {
        for (i, line) in lines.iter().enumerate() {
            let node = parse_line(line, i + 1)?;
            sink.create_node(node)?;
            nodes_created += 1;
        }
    }

    tracing::info!(
        lines = lines.len(),
        nodes = nodes_created,
        snapshot = %snapshot.path().display(),
        "Replayed nodes from offline snapshot"
    );

    Ok(LoadReport {
        mode: LoadMode::Replay,
        nodes_created,
    })
}
