//! # firestore-source
//!
//! Build-time ingestion of Cloud Firestore collections into generic content
//! nodes, with an offline snapshot for builds that cannot reach the network.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────┐
//!   OFFLINE_FIRESTORE│ source_nodes │ snapshot exists?
//!  ─────────────────▶│  (dispatch)  │───────────────┐
//!                    └──────┬───────┘               │
//!                           ▼                       ▼
//!                  ┌─────────────────┐     ┌─────────────────┐
//!                  │ load_from_remote│     │ load_from_file  │
//!                  │  Firestore REST │     │  NDJSON replay  │
//!                  └───┬─────────┬───┘     └────────┬────────┘
//!                      │         ▼                  │
//!                      │   .cache/offline-          │
//!                      │   firestore.txt            │
//!                      ▼                            ▼
//!                  ┌──────────────────────────────────┐
//!                  │        NodeSink::create_node     │
//!                  └──────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, collection specs, node payloads |
//! | [`node`] | Content digest and node construction |
//! | [`snapshot`] | Offline snapshot file |
//! | [`firestore`] | Firestore REST connector |
//! | [`ingest`] | Loader dispatch, remote fetch, snapshot replay |
//! | [`traits`] | Store, sink, and reporter seams |
//! | [`sink`] | JSON-lines node sink |
//! | [`sources`] | Collection and snapshot listing |
//! | [`logger`] | `tracing` subscriber setup |

pub mod config;
pub mod firestore;
pub mod ingest;
pub mod logger;
pub mod models;
pub mod node;
pub mod sink;
pub mod snapshot;
pub mod sources;
pub mod traits;
