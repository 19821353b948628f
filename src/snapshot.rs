// File: snapshot.rs
//
// The purpose of this file is to define the snapshot document that
// captures the whole overlay for durability, and to rebuild node state
// from one.

use crate::error::OverlayError;
use crate::node::{Node, StoredItem};
use crate::ring::Ring;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// The only document version this crate reads or writes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A self-contained capture of the overlay: ring parameter, every node
/// with its links and fingers, and every stored item with its value
/// base64-encoded. Any serde serializer can encode it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotDoc {
    pub version: u32,
    pub m: u32,
    pub created_at: u64,
    pub nodes: Vec<NodeRecord>,
}

/// One node's links, fingers, and store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: u64,
    pub successor_id: u64,
    pub predecessor_id: Option<u64>,
    pub finger_ids: Vec<u64>,
    pub store: Vec<ItemRecord>,
}

/// One stored item; `value` is base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemRecord {
    pub key: u64,
    pub name: String,
    pub value: String,
}

impl SnapshotDoc {
    /// Encodes the document as JSON, the default interchange encoding.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a document from JSON.
    pub fn from_json(text: &str) -> Result<SnapshotDoc, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Captures the live node table into a document. Nodes come out in id
/// order and each store in (key, name) order, so capturing the same
/// state twice yields the same document apart from `created_at`.
pub(crate) fn capture(ring: Ring, nodes: &BTreeMap<u64, Node>) -> SnapshotDoc {
    let mut records = Vec::with_capacity(nodes.len());
    for (id, node) in nodes {
        let mut store: Vec<ItemRecord> = node
            .store_iter()
            .map(|(name, item)| ItemRecord {
                key: item.key,
                name: name.clone(),
                value: base64::encode(&item.value),
            })
            .collect();
        store.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.name.cmp(&b.name)));
        records.push(NodeRecord {
            id: *id,
            successor_id: node.successor(),
            predecessor_id: node.predecessor(),
            finger_ids: node.finger_nodes(),
            store,
        });
    }
    SnapshotDoc {
        version: SNAPSHOT_VERSION,
        m: ring.m(),
        created_at: unix_now(),
        nodes: records,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Rebuilds a node table from a document, verbatim. Checks the version
/// and the document's referential integrity; the semantic invariants
/// are the caller's health check to run on the result.
pub(crate) fn rebuild(doc: &SnapshotDoc) -> Result<(Ring, BTreeMap<u64, Node>), OverlayError> {
    if doc.version != SNAPSHOT_VERSION {
        return Err(OverlayError::SnapshotVersionMismatch(doc.version));
    }
    if doc.m < 1 || doc.m > 32 {
        return Err(OverlayError::SnapshotInconsistent(format!(
            "ring exponent {} outside [1, 32]",
            doc.m
        )));
    }
    let ring = Ring::new(doc.m);

    let mut ids = BTreeSet::new();
    for record in &doc.nodes {
        if record.id >= ring.size() {
            return Err(OverlayError::SnapshotInconsistent(format!(
                "node id {} outside the ring",
                record.id
            )));
        }
        if !ids.insert(record.id) {
            return Err(OverlayError::SnapshotInconsistent(format!(
                "node id {} appears twice",
                record.id
            )));
        }
    }

    let mut nodes = BTreeMap::new();
    for record in &doc.nodes {
        if !ids.contains(&record.successor_id) {
            return Err(OverlayError::SnapshotInconsistent(format!(
                "node {} names an unknown successor {}",
                record.id, record.successor_id
            )));
        }
        if let Some(pred) = record.predecessor_id {
            if !ids.contains(&pred) {
                return Err(OverlayError::SnapshotInconsistent(format!(
                    "node {} names an unknown predecessor {}",
                    record.id, pred
                )));
            }
        }
        if record.finger_ids.len() != ring.m() as usize {
            return Err(OverlayError::SnapshotInconsistent(format!(
                "node {} carries {} fingers, ring needs {}",
                record.id,
                record.finger_ids.len(),
                ring.m()
            )));
        }
        for target in &record.finger_ids {
            if !ids.contains(target) {
                return Err(OverlayError::SnapshotInconsistent(format!(
                    "node {} fingers an unknown node {}",
                    record.id, target
                )));
            }
        }
        let mut items = Vec::with_capacity(record.store.len());
        for item in &record.store {
            let value = base64::decode(&item.value).map_err(|_| {
                OverlayError::SnapshotInconsistent(format!(
                    "value for {:?} on node {} is not base64",
                    item.name, record.id
                ))
            })?;
            items.push((item.name.clone(), StoredItem { key: item.key, value }));
        }
        nodes.insert(
            record.id,
            Node::from_parts(
                ring,
                record.id,
                record.successor_id,
                record.predecessor_id,
                &record.finger_ids,
                items,
            ),
        );
    }
    Ok((ring, nodes))
}
