// File: graph.rs
//
// The purpose of this file is to project the overlay into labeled
// edges and store annotations that a renderer can draw.

use serde::Serialize;

/// The label on an exported edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EdgeRole {
    Successor,
    Predecessor,
    Finger(u32),
}

/// One directed, labeled edge of the overlay graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: u64,
    pub role: EdgeRole,
    pub to: u64,
}

/// One stored item, attached to the node that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreAnnotation {
    pub node: u64,
    pub key: u64,
    pub name: String,
}

/// The full projection: every successor, predecessor, and finger edge
/// plus every store annotation, in node-id order. Duplicate edges are
/// kept; a consumer may collapse them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphView {
    pub edges: Vec<GraphEdge>,
    pub stores: Vec<StoreAnnotation>,
}

impl GraphView {
    /// The successor edge target for a node, if the node was exported.
    pub fn successor_of(&self, id: u64) -> Option<u64> {
        self.edges
            .iter()
            .find(|e| e.from == id && e.role == EdgeRole::Successor)
            .map(|e| e.to)
    }

    /// The keys annotated on one node, in ascending order.
    pub fn keys_on(&self, id: u64) -> Vec<u64> {
        self.stores
            .iter()
            .filter(|s| s.node == id)
            .map(|s| s.key)
            .collect()
    }
}
