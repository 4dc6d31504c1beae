//! Seams between the loaders and their collaborators.
//!
//! The loaders never talk to Firestore, the site pipeline, or the log
//! directly; they go through these traits so each side can be swapped.
//!
//! ```text
//!  ┌───────────────┐    ┌──────────────┐    ┌────────────┐
//!  │ DocumentStore │──▶│   loaders     │──▶│  NodeSink   │
//!  │ Firestore/fake│    │ remote/replay│    │ pipeline   │
//!  └───────────────┘    └──────┬───────┘    └────────────┘
//!                              ▼
//!                         ┌──────────┐
//!                         │ Reporter │
//!                         └──────────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, NodePayload};

// ═══════════════════════════════════════════════════════════════════════
// DocumentStore Trait
// ═══════════════════════════════════════════════════════════════════════

/// A remote document database the remote loader reads from.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use firestore_source::models::Document;
/// use firestore_source::traits::DocumentStore;
///
/// struct EmptyStore;
///
/// #[async_trait]
/// impl DocumentStore for EmptyStore {
///     async fn connect(&self) -> Result<()> { Ok(()) }
///
///     async fn fetch_collection(&self, _collection: &str) -> Result<Vec<Document>> {
///         Ok(vec![])
///     }
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Establish the connection. Must be idempotent: a second call on a
    /// connected store returns `Ok(())` without reconnecting.
    async fn connect(&self) -> Result<()>;

    /// Fetch every document currently in `collection`.
    async fn fetch_collection(&self, collection: &str) -> Result<Vec<Document>>;
}

// ═══════════════════════════════════════════════════════════════════════
// NodeSink Trait
// ═══════════════════════════════════════════════════════════════════════

/// The downstream pipeline's "create node" capability.
pub trait NodeSink: Send + Sync {
    fn create_node(&self, node: NodePayload) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// Reporter Trait
// ═══════════════════════════════════════════════════════════════════════

/// Operator-facing warnings (offline mode notice, connection failures).
pub trait Reporter: Send + Sync {
    fn warn(&self, message: &str);
}

/// Reporter that forwards to `tracing` at WARN level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}
