//! Node construction: content digest and identity overlay.

use md5::{Digest, Md5};

use crate::models::{CollectionSpec, Document, NodeInternal, NodePayload};

/// Keys owned by the node envelope. Mapped fields with these names are
/// replaced by the envelope values.
const RESERVED_KEYS: [&str; 4] = ["id", "parent", "children", "internal"];

/// Hex MD5 of the document id.
///
/// The digest covers the id only, so a document whose content changes under
/// the same id keeps its digest.
pub fn content_digest(id: &str) -> String {
    hex::encode(Md5::digest(id.as_bytes()))
}

/// Build the node for a fetched document: apply the spec's map, then overlay
/// `id`, `parent`, `children` and `internal`.
pub fn build_node(doc: Document, spec: &CollectionSpec) -> NodePayload {
    let mut fields = spec.map.apply(doc.fields);
    for key in RESERVED_KEYS {
        fields.remove(key);
    }

    let content_digest = content_digest(&doc.id);
    NodePayload {
        fields,
        id: doc.id,
        parent: None,
        children: Vec::new(),
        internal: NodeInternal {
            node_type: spec.node_type.clone(),
            content_digest,
        },
    }
}
