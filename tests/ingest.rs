//! Integration tests for loader dispatch, remote fetch, and snapshot replay.
//!
//! The remote store, node sink, and reporter are in-memory fakes so these run
//! without network access.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use firestore_source::ingest::{
    load_from_file, load_from_remote, source_nodes, LoadMode, LoadReport,
};
use firestore_source::models::{CollectionSpec, Document, NodeMap, NodePayload, Record};
use firestore_source::node::content_digest;
use firestore_source::snapshot::OfflineSnapshot;
use firestore_source::traits::{DocumentStore, NodeSink, Reporter};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

// ─── Fakes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct InMemoryStore {
    collections: HashMap<String, Vec<Document>>,
    fail_connect: bool,
    fail_fetch: bool,
    connect_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl InMemoryStore {
    fn with(mut self, collection: &str, docs: Vec<Document>) -> Self {
        self.collections.insert(collection.to_string(), docs);
        self
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            bail!("invalid credential");
        }
        Ok(())
    }

    async fn fetch_collection(&self, collection: &str) -> Result<Vec<Document>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            bail!("network unreachable");
        }
        self.collections
            .get(collection)
            .cloned()
            .ok_or_else(|| anyhow!("no such collection: {}", collection))
    }
}

#[derive(Default)]
struct RecordingSink {
    nodes: Mutex<Vec<NodePayload>>,
}

impl RecordingSink {
    fn nodes(&self) -> Vec<NodePayload> {
        self.nodes.lock().unwrap().clone()
    }
}

impl NodeSink for RecordingSink {
    fn create_node(&self, node: NodePayload) -> Result<()> {
        self.nodes.lock().unwrap().push(node);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingReporter {
    warnings: Mutex<Vec<String>>,
}

impl RecordingReporter {
    fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn doc(id: &str, fields: Value) -> Document {
    Document {
        id: id.to_string(),
        fields: fields.as_object().cloned().unwrap(),
    }
}

fn two_posts() -> Vec<Document> {
    vec![
        doc("a", json!({"title": "Alpha", "views": 10})),
        doc("b", json!({"title": "Beta", "views": 20})),
    ]
}

fn snapshot_in(tmp: &TempDir) -> OfflineSnapshot {
    OfflineSnapshot::new(tmp.path().join(".cache/offline-firestore.txt"))
}

fn snapshot_ids(snapshot: &OfflineSnapshot) -> Vec<String> {
    let mut ids: Vec<String> = fs::read_to_string(snapshot.path())
        .unwrap()
        .lines()
        .map(|l| {
            let v: Value = serde_json::from_str(l).unwrap();
            v["id"].as_str().unwrap().to_string()
        })
        .collect();
    ids.sort();
    ids
}

fn sorted_ids(nodes: &[NodePayload]) -> Vec<String> {
    let mut ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    ids.sort();
    ids
}

// ─── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_run_emits_and_persists_every_document() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let store = InMemoryStore::default().with("posts", two_posts());
    let types = vec![CollectionSpec::new("posts", "Post")];
    let sink = RecordingSink::default();
    let reporter = RecordingReporter::default();

    let report = source_nodes(&store, &types, &snapshot, false, &sink, &reporter)
        .await
        .unwrap();

    assert_eq!(
        report,
        LoadReport {
            mode: LoadMode::Remote,
            nodes_created: 2
        }
    );
    assert_eq!(sorted_ids(&sink.nodes()), vec!["a", "b"]);
    assert_eq!(snapshot_ids(&snapshot), vec!["a", "b"]);
    assert!(reporter.warnings().is_empty());
}

#[tokio::test]
async fn test_nodes_carry_id_digest_and_type() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let store = InMemoryStore::default()
        .with("posts", two_posts())
        .with("authors", vec![doc("z", json!({"name": "Zed"}))]);
    let types = vec![
        CollectionSpec::new("posts", "Post"),
        CollectionSpec::new("authors", "Author"),
    ];
    let sink = RecordingSink::default();

    load_from_remote(
        &store,
        &types,
        &snapshot,
        &sink,
        &RecordingReporter::default(),
    )
    .await
    .unwrap();

    let nodes = sink.nodes();
    assert_eq!(nodes.len(), 3);
    for node in &nodes {
        assert_eq!(node.internal.content_digest, content_digest(&node.id));
        assert_eq!(node.parent, None);
        assert!(node.children.is_empty());
        let expected_type = if node.id == "z" { "Author" } else { "Post" };
        assert_eq!(node.internal.node_type, expected_type);
    }
}

#[tokio::test]
async fn test_map_is_applied_before_envelope() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let store = InMemoryStore::default().with("posts", two_posts());
    let types = vec![
        CollectionSpec::new("posts", "Post").with_map(NodeMap::new(|mut r: Record| {
            r.remove("views");
            r.insert("id".to_string(), json!("overwritten"));
            r
        })),
    ];
    let sink = RecordingSink::default();

    load_from_remote(
        &store,
        &types,
        &snapshot,
        &sink,
        &RecordingReporter::default(),
    )
    .await
    .unwrap();

    for node in sink.nodes() {
        assert_ne!(node.id, "overwritten");
        assert!(node.fields.contains_key("title"));
        assert!(!node.fields.contains_key("views"));
    }
}

#[tokio::test]
async fn test_offline_without_snapshot_falls_back_to_remote() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let store = InMemoryStore::default().with("posts", two_posts());
    let types = vec![CollectionSpec::new("posts", "Post")];
    let sink = RecordingSink::default();
    let reporter = RecordingReporter::default();

    let report = source_nodes(&store, &types, &snapshot, true, &sink, &reporter)
        .await
        .unwrap();

    assert_eq!(report.mode, LoadMode::Remote);
    assert_eq!(report.nodes_created, 2);
    assert_eq!(snapshot_ids(&snapshot), vec!["a", "b"]);
    assert_eq!(reporter.warnings().len(), 1);
    assert!(reporter.warnings()[0].contains("offline mode"));
}

#[tokio::test]
async fn test_offline_replays_full_snapshot_for_every_spec() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let bootstrap = InMemoryStore::default().with("posts", two_posts());
    let single = vec![CollectionSpec::new("posts", "Post")];
    load_from_remote(
        &bootstrap,
        &single,
        &snapshot,
        &RecordingSink::default(),
        &RecordingReporter::default(),
    )
    .await
    .unwrap();

    let store = InMemoryStore::default();
    let types = vec![
        CollectionSpec::new("posts", "Post"),
        CollectionSpec::new("authors", "Author"),
    ];
    let sink = RecordingSink::default();
    let reporter = RecordingReporter::default();

    let report = source_nodes(&store, &types, &snapshot, true, &sink, &reporter)
        .await
        .unwrap();

    assert_eq!(report.mode, LoadMode::Replay);
    assert_eq!(report.nodes_created, 4);
    let ids: Vec<String> = sink.nodes().iter().map(|n| n.id.clone()).collect();
    assert_eq!(ids, vec!["a", "b", "a", "b"]);
    assert_eq!(store.connect_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 0);
    assert_eq!(reporter.warnings().len(), 1);
}

#[tokio::test]
async fn test_connection_failure_is_swallowed_with_one_warning() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let store = InMemoryStore {
        fail_connect: true,
        ..Default::default()
    }
    .with("posts", two_posts());
    let types = vec![CollectionSpec::new("posts", "Post")];
    let sink = RecordingSink::default();
    let reporter = RecordingReporter::default();

    let report = source_nodes(&store, &types, &snapshot, false, &sink, &reporter)
        .await
        .unwrap();

    assert_eq!(
        report,
        LoadReport {
            mode: LoadMode::Unavailable,
            nodes_created: 0
        }
    );
    assert!(sink.nodes().is_empty());
    let warnings = reporter.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("Could not initialize Firestore"));
    assert!(warnings[0].contains("invalid credential"));
    assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connection_failure_keeps_existing_snapshot() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    fs::create_dir_all(snapshot.path().parent().unwrap()).unwrap();
    fs::write(snapshot.path(), "{\"previous\":true}\n").unwrap();

    let store = InMemoryStore {
        fail_connect: true,
        ..Default::default()
    };
    load_from_remote(
        &store,
        &[CollectionSpec::new("posts", "Post")],
        &snapshot,
        &RecordingSink::default(),
        &RecordingReporter::default(),
    )
    .await
    .unwrap();

    assert_eq!(
        fs::read_to_string(snapshot.path()).unwrap(),
        "{\"previous\":true}\n"
    );
}

#[tokio::test]
async fn test_malformed_snapshot_line_fails_replay() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    fs::create_dir_all(snapshot.path().parent().unwrap()).unwrap();
    fs::write(snapshot.path(), "{\"id\": \"a\", broken\n").unwrap();

    let err = load_from_file(
        &[CollectionSpec::new("posts", "Post")],
        &snapshot,
        &RecordingSink::default(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("line 1"));
    assert!(err.downcast_ref::<serde_json::Error>().is_some());
}

#[tokio::test]
async fn test_fetch_failure_aborts_run() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let store = InMemoryStore {
        fail_fetch: true,
        ..Default::default()
    };
    let reporter = RecordingReporter::default();

    let err = source_nodes(
        &store,
        &[CollectionSpec::new("posts", "Post")],
        &snapshot,
        false,
        &RecordingSink::default(),
        &reporter,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("network unreachable"));
    assert!(reporter.warnings().is_empty());
}

#[tokio::test]
async fn test_second_remote_run_replaces_snapshot() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let types = vec![CollectionSpec::new("posts", "Post")];

    let first = InMemoryStore::default().with("posts", two_posts());
    load_from_remote(
        &first,
        &types,
        &snapshot,
        &RecordingSink::default(),
        &RecordingReporter::default(),
    )
    .await
    .unwrap();

    let second = InMemoryStore::default().with("posts", vec![doc("c", json!({"title": "Gamma"}))]);
    load_from_remote(
        &second,
        &types,
        &snapshot,
        &RecordingSink::default(),
        &RecordingReporter::default(),
    )
    .await
    .unwrap();

    assert_eq!(snapshot_ids(&snapshot), vec!["c"]);
}

#[tokio::test]
async fn test_replay_reproduces_remote_nodes() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    let types = vec![CollectionSpec::new("posts", "Post")];
    let store = InMemoryStore::default().with(
        "posts",
        vec![
            doc("a", json!({"nested": {"list": [1, 2.5, "x", null]}, "flag": true})),
            doc("b", json!({"empty": {}, "text": "héllo\nworld"})),
        ],
    );

    let remote_sink = RecordingSink::default();
    load_from_remote(
        &store,
        &types,
        &snapshot,
        &remote_sink,
        &RecordingReporter::default(),
    )
    .await
    .unwrap();

    let replay_sink = RecordingSink::default();
    load_from_file(&types, &snapshot, &replay_sink).await.unwrap();

    assert_eq!(replay_sink.nodes(), remote_sink.nodes());
}

#[tokio::test]
async fn test_blank_snapshot_line_fails_replay() {
    let tmp = TempDir::new().unwrap();
    let snapshot = snapshot_in(&tmp);
    fs::create_dir_all(snapshot.path().parent().unwrap()).unwrap();
    let line = json!({
        "id": "a", "parent": null, "children": [],
        "internal": {"type": "Post", "contentDigest": content_digest("a")}
    });
    fs::write(snapshot.path(), format!("{}\n\n", line)).unwrap();

    let err = load_from_file(
        &[CollectionSpec::new("posts", "Post")],
        &snapshot,
        &RecordingSink::default(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("line 2"));
    assert!(err.downcast_ref::<serde_json::Error>().is_some());
}

#[tokio::test]
async fn test_exactly_one_loader_runs() {
    for (offline, snapshot_present) in [(false, false), (false, true), (true, false), (true, true)] {
        let tmp = TempDir::new().unwrap();
        let snapshot = snapshot_in(&tmp);
        if snapshot_present {
            fs::create_dir_all(snapshot.path().parent().unwrap()).unwrap();
            let line = json!({
                "id": "old", "parent": null, "children": [],
                "internal": {"type": "Post", "contentDigest": content_digest("old")}
            });
            fs::write(snapshot.path(), format!("{}\n", line)).unwrap();
        }

        let store = InMemoryStore::default().with("posts", two_posts());
        let sink = RecordingSink::default();
        let report = source_nodes(
            &store,
            &[CollectionSpec::new("posts", "Post")],
            &snapshot,
            offline,
            &sink,
            &RecordingReporter::default(),
        )
        .await
        .unwrap();

        let remote_ran = store.connect_calls.load(Ordering::SeqCst) > 0;
        if offline && snapshot_present {
            assert_eq!(report.mode, LoadMode::Replay);
            assert!(!remote_ran);
            assert_eq!(sorted_ids(&sink.nodes()), vec!["old"]);
        } else {
            assert_eq!(report.mode, LoadMode::Remote);
            assert!(remote_ran);
            assert_eq!(sorted_ids(&sink.nodes()), vec!["a", "b"]);
            assert_eq!(snapshot_ids(&snapshot), vec!["a", "b"]);
        }
    }
}
