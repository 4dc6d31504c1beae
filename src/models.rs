//! Core data models used throughout firestore-source.
//!
//! These types represent the documents fetched from the remote store, the
//! per-collection settings that tag them, and the node payloads handed to the
//! downstream site pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A document's field set as a JSON object.
pub type Record = Map<String, Value>;

/// Raw document fetched from a remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id (last segment of the resource name).
    pub id: String,
    pub fields: Record,
}

/// Pure transform applied to a document's fields before node fields are overlaid.
#[derive(Clone)]
pub struct NodeMap(Arc<dyn Fn(Record) -> Record + Send + Sync>);

impl NodeMap {
    /// The pass-through transform.
    pub fn identity() -> Self {
        Self(Arc::new(|record| record))
    }

    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Record) -> Record + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, record: Record) -> Record {
        (self.0)(record)
    }
}

impl Default for NodeMap {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for NodeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NodeMap(..)")
    }
}

/// One configured collection: where to read from and how to tag its nodes.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    /// Remote collection name or path (e.g. `"posts"`, `"users/u1/posts"`).
    pub collection: String,
    /// Node type label written to `internal.type`.
    pub node_type: String,
    pub map: NodeMap,
}

impl CollectionSpec {
    /// Create a spec with the identity map.
    pub fn new(collection: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            node_type: node_type.into(),
            map: NodeMap::identity(),
        }
    }

    pub fn with_map(mut self, map: NodeMap) -> Self {
        self.map = map;
        self
    }
}

/// Bookkeeping fields the downstream pipeline reads from every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInternal {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(rename = "contentDigest")]
    pub content_digest: String,
}

/// A node as handed to the sink and persisted to the offline snapshot.
///
/// Serializes as one flat JSON object: the mapped document fields followed by
/// `id`, `parent`, `children` and `internal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    #[serde(flatten)]
    pub fields: Record,
    pub id: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub internal: NodeInternal,
}
