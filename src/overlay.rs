// File: overlay.rs
//
// The purpose of this file is to coordinate the ring: construction,
// joins and leaves with key migration, routed lookups and placement,
// the stabilization sweep, health checking, and snapshot/restore.

use crate::codec::ValueCodec;
use crate::error::OverlayError;
use crate::event::{Event, EventSink, NullSink, OpKind};
use crate::graph::{EdgeRole, GraphEdge, GraphView, StoreAnnotation};
use crate::node::{Node, NodeView};
use crate::ring::Ring;
use crate::snapshot::{self, SnapshotDoc};
use log::{debug, warn};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Construction-time options for an overlay.
pub struct OverlayConfig {
    m: u32,
    initial_ids: Vec<u64>,
    stabilization_passes_cap: Option<u32>,
    sink: Option<Box<dyn EventSink>>,
    value_codec: Option<Box<dyn ValueCodec>>,
}

impl OverlayConfig {
    /// Options for a ring of size `2^m`, starting empty.
    pub fn new(m: u32) -> OverlayConfig {
        OverlayConfig {
            m,
            initial_ids: Vec::new(),
            stabilization_passes_cap: None,
            sink: None,
            value_codec: None,
        }
    }

    /// Node ids to link into the ring at construction.
    pub fn initial_ids<I>(mut self, ids: I) -> OverlayConfig
    where
        I: IntoIterator<Item = u64>,
    {
        self.initial_ids = ids.into_iter().collect();
        self
    }

    /// Upper bound on `rebalance` sweeps. Defaults to `m + 2`, which is
    /// `ceil(log2(ring size)) + 2`.
    pub fn stabilization_passes_cap(mut self, cap: u32) -> OverlayConfig {
        self.stabilization_passes_cap = Some(cap);
        self
    }

    /// The sink that observes every operation. Defaults to a sink that
    /// discards everything.
    pub fn sink(mut self, sink: Box<dyn EventSink>) -> OverlayConfig {
        self.sink = Some(sink);
        self
    }

    /// A codec that stored values pass through on put and get.
    pub fn value_codec(mut self, codec: Box<dyn ValueCodec>) -> OverlayConfig {
        self.value_codec = Some(codec);
        self
    }
}

/// Violation counts per invariant class, produced by `health_check`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Successor/predecessor links that are not symmetric.
    pub link_violations: usize,
    /// Nodes the successor cycle fails to cover, plus one if the walk
    /// does not close.
    pub cycle_violations: usize,
    /// Fingers that do not point at the true successor of their start.
    pub finger_violations: usize,
    /// Stored items that do not live on the successor of their key.
    pub residency_violations: usize,
}

impl HealthReport {
    pub fn total(&self) -> usize {
        self.link_violations
            + self.cycle_violations
            + self.finger_violations
            + self.residency_violations
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// The overlay: every live node, reached through one lock in the same
/// shape the rest of the crate's callers expect. All operations run to
/// completion before the next begins; read-only projections share the
/// lock in read mode.
pub struct Overlay {
    inner: Arc<RwLock<OverlayInner>>,
}

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay").finish_non_exhaustive()
    }
}

struct OverlayInner {
    ring: Ring,
    nodes: BTreeMap<u64, Node>,
    seq: u64,
    passes_cap: u32,
    sink: Box<dyn EventSink>,
    codec: Option<Box<dyn ValueCodec>>,
}

impl Overlay {
    /// Builds an overlay from options: validates the ring exponent and
    /// the initial ids, links the ids into a single ring in sorted
    /// order, and initializes every finger table exactly.
    ///
    /// # Arguments
    ///
    /// * `config` - the construction options
    pub fn new(config: OverlayConfig) -> Result<Overlay, OverlayError> {
        if config.m < 1 || config.m > 32 {
            return Err(OverlayError::RingExponentOutOfRange(config.m));
        }
        let ring = Ring::new(config.m);

        let mut sorted = Vec::with_capacity(config.initial_ids.len());
        for id in &config.initial_ids {
            if *id >= ring.size() {
                return Err(OverlayError::IdOutOfRange {
                    id: *id,
                    size: ring.size(),
                });
            }
            if sorted.contains(id) {
                return Err(OverlayError::IdConflict(*id));
            }
            sorted.push(*id);
        }
        sorted.sort();

        let mut nodes = BTreeMap::new();
        for (i, id) in sorted.iter().enumerate() {
            let succ = sorted[(i + 1) % sorted.len()];
            let pred = sorted[(i + sorted.len() - 1) % sorted.len()];
            let mut node = Node::new(ring, *id);
            node.set_successor(succ);
            node.set_predecessor(Some(pred));
            for f in 0..ring.m() {
                let start = ring.finger_start(*id, f);
                let owner = sorted
                    .iter()
                    .find(|&&candidate| candidate >= start)
                    .copied()
                    .unwrap_or(sorted[0]);
                node.set_finger(f, owner);
            }
            nodes.insert(*id, node);
        }

        let mut inner = OverlayInner {
            ring,
            nodes,
            seq: 0,
            passes_cap: config.stabilization_passes_cap.unwrap_or(ring.m() + 2),
            sink: config.sink.unwrap_or_else(|| Box::new(NullSink)),
            codec: config.value_codec,
        };
        inner.emit(OpKind::Create, sorted, 0, None, None);
        Ok(Overlay {
            inner: Arc::new(RwLock::new(inner)),
        })
    }

    /// Adds a node at `id`: join through an introducer, one
    /// stabilization sweep to settle the neighbor links, fresh fingers
    /// for the newcomer, and key migration off its successor. Either
    /// every side effect lands or the error left the overlay untouched.
    ///
    /// # Arguments
    ///
    /// * `id` - the position the new node takes
    pub fn insert_node(&self, id: u64) -> Result<(), OverlayError> {
        self.inner.write().insert_node(id)
    }

    /// Removes the node at `id`, migrating its keys to its successor
    /// and healing the links and fingers that pointed at it. Removing
    /// the last node is refused.
    ///
    /// # Arguments
    ///
    /// * `id` - the departing node
    pub fn remove_node(&self, id: u64) -> Result<(), OverlayError> {
        self.inner.write().remove_node(id)
    }

    /// Stores a value under a name at the name's owner, routing from
    /// the lowest live node. Returns the owner's id.
    pub fn put(&self, name: &str, value: &[u8]) -> Result<u64, OverlayError> {
        let mut inner = self.inner.write();
        match inner.first_id() {
            Some(entry) => inner.put_from(entry, name, value),
            None => Err(OverlayError::NodeNotFound(inner.ring.hash(name))),
        }
    }

    /// Stores a value, routing from an explicit entry node.
    pub fn put_from(&self, entry: u64, name: &str, value: &[u8]) -> Result<u64, OverlayError> {
        self.inner.write().put_from(entry, name, value)
    }

    /// Fetches the value stored under a name, routing from the lowest
    /// live node. `None` when nothing is stored under the name, or the
    /// overlay is empty.
    pub fn lookup(&self, name: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.write();
        match inner.first_id() {
            Some(entry) => inner.lookup_from(entry, name).unwrap_or(None),
            None => None,
        }
    }

    /// Fetches a value, routing from an explicit entry node.
    pub fn lookup_from(&self, entry: u64, name: &str) -> Result<Option<Vec<u8>>, OverlayError> {
        self.inner.write().lookup_from(entry, name)
    }

    /// Deletes the value stored under a name, returning it.
    pub fn delete(&self, name: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.write();
        match inner.first_id() {
            Some(entry) => inner.delete_from(entry, name).unwrap_or(None),
            None => None,
        }
    }

    /// Deletes a value, routing from an explicit entry node.
    pub fn delete_from(&self, entry: u64, name: &str) -> Result<Option<Vec<u8>>, OverlayError> {
        self.inner.write().delete_from(entry, name)
    }

    /// One maintenance pass: stabilize every node, then fix every
    /// finger of every node. Returns whether anything moved.
    pub fn stabilize_all(&self) -> bool {
        let mut inner = self.inner.write();
        let changed = inner.sweep();
        inner.emit(OpKind::Stabilize, Vec::new(), 0, None, None);
        changed
    }

    /// Sweeps until a pass makes no change, bounded by the configured
    /// pass cap. Returns the number of sweeps run, the quiet one
    /// included.
    pub fn rebalance(&self) -> Result<u32, OverlayError> {
        let mut inner = self.inner.write();
        for pass in 0..inner.passes_cap {
            if !inner.sweep() {
                inner.emit(OpKind::Rebalance, Vec::new(), 0, None, None);
                return Ok(pass + 1);
            }
        }
        let cap = inner.passes_cap;
        inner.emit(
            OpKind::Rebalance,
            Vec::new(),
            0,
            None,
            Some("stabilization divergence"),
        );
        Err(OverlayError::RebalanceDivergence(cap))
    }

    /// Verifies the structural invariants: link symmetry, the single
    /// successor cycle, one random finger per node, and the residency
    /// of every stored name. Counts violations; never repairs.
    pub fn health_check(&self) -> HealthReport {
        let mut inner = self.inner.write();
        let report = check_state(&inner.ring, &inner.nodes, false);
        let error = if report.is_clean() {
            None
        } else {
            Some("invariant violations found")
        };
        inner.emit(OpKind::HealthCheck, Vec::new(), 0, None, error);
        report
    }

    /// Captures the whole overlay as a snapshot document.
    pub fn snapshot(&self) -> SnapshotDoc {
        let mut inner = self.inner.write();
        let doc = snapshot::capture(inner.ring, &inner.nodes);
        inner.emit(OpKind::Snapshot, Vec::new(), 0, None, None);
        doc
    }

    /// Replaces the overlay with the state in a document. The document
    /// must carry the live ring exponent (unless the overlay is empty)
    /// and must pass a full invariant check before anything is swapped
    /// in; on any error the prior overlay is untouched.
    ///
    /// # Arguments
    ///
    /// * `doc` - the document to restore from
    pub fn restore(&self, doc: &SnapshotDoc) -> Result<(), OverlayError> {
        let mut inner = self.inner.write();
        if !inner.nodes.is_empty() && doc.m != inner.ring.m() {
            return Err(OverlayError::SnapshotInconsistent(format!(
                "document ring exponent {} does not match live ring {}",
                doc.m,
                inner.ring.m()
            )));
        }
        let (ring, nodes) = snapshot::rebuild(doc)?;
        let report = check_state(&ring, &nodes, true);
        if !report.is_clean() {
            inner.emit(
                OpKind::Restore,
                Vec::new(),
                0,
                None,
                Some("snapshot failed verification"),
            );
            return Err(OverlayError::SnapshotInconsistent(format!(
                "{} invariant violations in document",
                report.total()
            )));
        }
        inner.ring = ring;
        inner.nodes = nodes;
        inner.emit(OpKind::Restore, Vec::new(), 0, None, None);
        Ok(())
    }

    /// Projects the overlay into labeled edges and store annotations.
    pub fn export_graph(&self) -> GraphView {
        let inner = self.inner.read();
        let mut view = GraphView::default();
        for (id, node) in &inner.nodes {
            view.edges.push(GraphEdge {
                from: *id,
                role: EdgeRole::Successor,
                to: node.successor(),
            });
            if let Some(pred) = node.predecessor() {
                view.edges.push(GraphEdge {
                    from: *id,
                    role: EdgeRole::Predecessor,
                    to: pred,
                });
            }
            for (i, target) in node.finger_nodes().into_iter().enumerate() {
                view.edges.push(GraphEdge {
                    from: *id,
                    role: EdgeRole::Finger(i as u32),
                    to: target,
                });
            }
            let mut stores: Vec<StoreAnnotation> = node
                .store_iter()
                .map(|(name, item)| StoreAnnotation {
                    node: *id,
                    key: item.key,
                    name: name.clone(),
                })
                .collect();
            stores.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.name.cmp(&b.name)));
            view.stores.extend(stores);
        }
        view
    }

    pub fn m(&self) -> u32 {
        self.inner.read().ring.m()
    }

    pub fn ring(&self) -> Ring {
        self.inner.read().ring
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }

    pub fn node_ids(&self) -> Vec<u64> {
        self.inner.read().nodes.keys().copied().collect()
    }

    pub fn keys_total(&self) -> u64 {
        self.inner.read().total_keys()
    }

    /// The sequence number of the last recorded operation.
    pub fn sequence(&self) -> u64 {
        self.inner.read().seq
    }

    /// A read-only view of one node.
    pub fn node_view(&self, id: u64) -> Option<NodeView> {
        self.inner.read().nodes.get(&id).map(|node| node.view())
    }
}

impl OverlayInner {
    fn first_id(&self) -> Option<u64> {
        self.nodes.keys().next().copied()
    }

    fn total_keys(&self) -> u64 {
        self.nodes.values().map(|node| node.key_count() as u64).sum()
    }

    /// Records one operation with the sink, stamping it with the next
    /// sequence number and the current gauges.
    fn emit(
        &mut self,
        kind: OpKind,
        ids: Vec<u64>,
        hops: u32,
        elapsed: Option<Duration>,
        error: Option<&'static str>,
    ) {
        self.seq += 1;
        let event = Event {
            seq: self.seq,
            kind,
            ids,
            hops,
            elapsed,
            error,
            total_nodes: self.nodes.len() as u64,
            total_keys: self.total_keys(),
        };
        self.sink.record(&event);
    }

    /// Routes from `entry` to the node responsible for `key`. Each step
    /// onto a closer preceding finger counts as one hop; handing back
    /// the successor at the end does not. Fingers pointing at departed
    /// nodes are skipped and counted as stale; the next sweep repairs
    /// them.
    ///
    /// # Arguments
    ///
    /// * `entry` - the node the query starts at
    /// * `key` - the id being resolved
    fn find_successor(&self, entry: u64, key: u64) -> (u64, u32, u32) {
        let mut current = entry;
        let mut hops = 0u32;
        let mut stale = 0u32;
        loop {
            let node = match self.nodes.get(&current) {
                Some(node) => node,
                None => return (current, hops, stale + 1),
            };
            let succ = node.successor();
            if self.ring.in_half_open(key, current, succ) {
                return (succ, hops, stale);
            }
            let nodes = &self.nodes;
            let next = node.closest_preceding_finger(key, |candidate| {
                let live = nodes.contains_key(&candidate);
                if !live {
                    stale += 1;
                }
                live
            });
            if next == current {
                // no finger strictly precedes the key; the successor is
                // the best remaining answer
                return (succ, hops, stale);
            }
            current = next;
            hops += 1;
        }
    }

    /// One stabilization step for one node: adopt the successor's
    /// predecessor when it sits between the two, then notify the
    /// successor. Returns whether any link moved.
    fn stabilize_node(&mut self, id: u64) -> bool {
        let succ = match self.nodes.get(&id) {
            Some(node) => node.successor(),
            None => return false,
        };
        let mut changed = false;
        if let Some(x) = self.nodes.get(&succ).and_then(|s| s.predecessor()) {
            if self.ring.in_open(x, id, succ) {
                if self.nodes.contains_key(&x) {
                    if let Some(node) = self.nodes.get_mut(&id) {
                        node.set_successor(x);
                        changed = true;
                    }
                } else {
                    warn!("node {} sees departed node {} behind successor {}", id, x, succ);
                }
            }
        }
        let succ_now = match self.nodes.get(&id) {
            Some(node) => node.successor(),
            None => return changed,
        };
        if let Some(succ_node) = self.nodes.get_mut(&succ_now) {
            changed |= succ_node.notify(id);
        }
        changed
    }

    /// Repoints finger `i` of a node at the successor of its start.
    fn fix_finger(&mut self, id: u64, i: u32) -> bool {
        let start = match self.nodes.get(&id) {
            Some(node) => node.finger_start(i),
            None => return false,
        };
        let (owner, _, stale) = self.find_successor(id, start);
        if stale > 0 {
            warn!("node {} routed past {} stale finger references", id, stale);
        }
        if !self.nodes.contains_key(&owner) {
            return false;
        }
        match self.nodes.get_mut(&id) {
            Some(node) => node.set_finger(i, owner),
            None => false,
        }
    }

    /// One full maintenance pass over every node.
    fn sweep(&mut self) -> bool {
        let ids: Vec<u64> = self.nodes.keys().copied().collect();
        let mut changed = false;
        for id in &ids {
            changed |= self.stabilize_node(*id);
        }
        let m = self.ring.m();
        for id in &ids {
            for i in 0..m {
                changed |= self.fix_finger(*id, i);
            }
        }
        changed
    }

    fn insert_node(&mut self, id: u64) -> Result<(), OverlayError> {
        if id >= self.ring.size() {
            return Err(OverlayError::IdOutOfRange {
                id,
                size: self.ring.size(),
            });
        }
        if self.nodes.contains_key(&id) {
            return Err(OverlayError::IdConflict(id));
        }
        let introducer = match self.first_id() {
            Some(introducer) => introducer,
            None => {
                // first node: a singleton ring pointing everywhere at itself
                let mut node = Node::new(self.ring, id);
                node.set_predecessor(Some(id));
                self.nodes.insert(id, node);
                debug!("node {} bootstrapped the ring", id);
                self.emit(OpKind::NodeJoin, vec![id], 0, None, None);
                return Ok(());
            }
        };

        let (succ, hops, stale) = self.find_successor(introducer, id);
        let mut node = Node::new(self.ring, id);
        // every finger leans on the successor until the sweep sharpens it
        node.fill_fingers(succ);
        self.nodes.insert(id, node);

        // one sweep, newcomer first: the successor learns its new
        // predecessor, then the old predecessor re-aims at the newcomer
        self.stabilize_node(id);
        let others: Vec<u64> = self.nodes.keys().copied().filter(|n| *n != id).collect();
        for other in others {
            self.stabilize_node(other);
        }
        for i in 0..self.ring.m() {
            self.fix_finger(id, i);
        }

        // the newcomer now owns (predecessor, id]; pull those keys off
        // the successor in one step
        let pred = self.nodes.get(&id).and_then(|n| n.predecessor());
        let succ_now = self.nodes.get(&id).map(|n| n.successor());
        if let (Some(pred), Some(succ_now)) = (pred, succ_now) {
            if succ_now != id {
                let moved = match self.nodes.get_mut(&succ_now) {
                    Some(heir) => heir.take_range(pred, id),
                    None => Vec::new(),
                };
                if !moved.is_empty() {
                    debug!("{} keys moved from {} to joining node {}", moved.len(), succ_now, id);
                }
                if let Some(newcomer) = self.nodes.get_mut(&id) {
                    newcomer.adopt(moved);
                }
            }
        }

        self.emit(OpKind::NodeJoin, vec![id, succ], hops, None, stale_tag(stale));
        Ok(())
    }

    fn remove_node(&mut self, id: u64) -> Result<(), OverlayError> {
        if !self.nodes.contains_key(&id) {
            return Err(OverlayError::NodeNotFound(id));
        }
        if self.nodes.len() == 1 {
            return Err(OverlayError::LastNodeRemoval);
        }
        let mut leaving = match self.nodes.remove(&id) {
            Some(node) => node,
            None => return Err(OverlayError::NodeNotFound(id)),
        };

        // the table is authoritative for the ring neighbors; the links
        // on the departing node may be stale
        let succ = self
            .nodes
            .range((Excluded(id), Unbounded))
            .next()
            .map(|(n, _)| *n)
            .or_else(|| self.first_id());
        let pred = self
            .nodes
            .range(..id)
            .next_back()
            .map(|(n, _)| *n)
            .or_else(|| self.nodes.keys().next_back().copied());

        if let (Some(succ), Some(pred)) = (succ, pred) {
            if leaving.successor() != succ {
                warn!("departing node {} held stale successor {}", id, leaving.successor());
            }
            // keys drain to the successor before the node disappears
            let items = leaving.take_all();
            let moved = items.len();
            if let Some(heir) = self.nodes.get_mut(&succ) {
                heir.adopt(items);
            }
            // close the ring around the gap
            if let Some(node) = self.nodes.get_mut(&pred) {
                node.set_successor(succ);
            }
            if let Some(node) = self.nodes.get_mut(&succ) {
                node.set_predecessor(Some(pred));
            }
            // fingers that aimed at the departed node get refreshed
            let ids: Vec<u64> = self.nodes.keys().copied().collect();
            let m = self.ring.m();
            for n in ids {
                for i in 0..m {
                    let target = match self.nodes.get(&n) {
                        Some(node) => node.finger(i),
                        None => continue,
                    };
                    if target == id {
                        self.fix_finger(n, i);
                    }
                }
            }
            debug!("node {} left, {} keys moved to {}", id, moved, succ);
            self.emit(OpKind::NodeLeave, vec![id, succ], 0, None, None);
        }
        Ok(())
    }

    fn put_from(&mut self, entry: u64, name: &str, value: &[u8]) -> Result<u64, OverlayError> {
        if !self.nodes.contains_key(&entry) {
            return Err(OverlayError::NodeNotFound(entry));
        }
        let started = Instant::now();
        let key = self.ring.hash(name);
        let (owner, hops, stale) = self.find_successor(entry, key);
        let wrapped = self.encode_value(value);
        match self.nodes.get_mut(&owner) {
            Some(node) => {
                node.put_local(name, key, wrapped);
            }
            None => return Err(OverlayError::NodeNotFound(owner)),
        }
        self.emit(
            OpKind::Put,
            vec![entry, owner],
            hops,
            Some(started.elapsed()),
            stale_tag(stale),
        );
        Ok(owner)
    }

    fn lookup_from(&mut self, entry: u64, name: &str) -> Result<Option<Vec<u8>>, OverlayError> {
        if !self.nodes.contains_key(&entry) {
            return Err(OverlayError::NodeNotFound(entry));
        }
        let started = Instant::now();
        let key = self.ring.hash(name);
        let (owner, hops, stale) = self.find_successor(entry, key);
        let found = match self.nodes.get(&owner).and_then(|node| node.get_local(name)) {
            Some(item) => Some(self.decode_value(item.value.clone())),
            None => None,
        };
        if let Some(node) = self.nodes.get_mut(&entry) {
            node.record_lookup(hops);
        }
        self.emit(
            OpKind::Lookup,
            vec![entry, owner],
            hops,
            Some(started.elapsed()),
            stale_tag(stale),
        );
        Ok(found)
    }

    fn delete_from(&mut self, entry: u64, name: &str) -> Result<Option<Vec<u8>>, OverlayError> {
        if !self.nodes.contains_key(&entry) {
            return Err(OverlayError::NodeNotFound(entry));
        }
        let started = Instant::now();
        let key = self.ring.hash(name);
        let (owner, hops, stale) = self.find_successor(entry, key);
        let removed = self
            .nodes
            .get_mut(&owner)
            .and_then(|node| node.delete_local(name));
        let removed = removed.map(|item| self.decode_value(item.value));
        self.emit(
            OpKind::Delete,
            vec![entry, owner],
            hops,
            Some(started.elapsed()),
            stale_tag(stale),
        );
        Ok(removed)
    }

    fn encode_value(&self, value: &[u8]) -> Vec<u8> {
        match &self.codec {
            Some(codec) => codec.wrap(value),
            None => value.to_vec(),
        }
    }

    fn decode_value(&self, value: Vec<u8>) -> Vec<u8> {
        match &self.codec {
            Some(codec) => codec.unwrap(&value),
            None => value,
        }
    }
}

fn stale_tag(stale: u32) -> Option<&'static str> {
    if stale > 0 {
        Some("stale finger reference skipped")
    } else {
        None
    }
}

/// The true successor of `key` by the table: smallest id at or past it,
/// wrapping to the lowest.
fn table_owner(nodes: &BTreeMap<u64, Node>, key: u64) -> Option<u64> {
    nodes
        .range(key..)
        .next()
        .map(|(id, _)| *id)
        .or_else(|| nodes.keys().next().copied())
}

/// Counts invariant violations in a node table. `full_fingers` checks
/// every finger (restore does); otherwise one random finger per node.
fn check_state(ring: &Ring, nodes: &BTreeMap<u64, Node>, full_fingers: bool) -> HealthReport {
    let mut report = HealthReport::default();
    let start = match nodes.keys().next() {
        Some(start) => *start,
        None => return report,
    };

    // my successor's predecessor must be me
    for (id, node) in nodes {
        match nodes.get(&node.successor()) {
            Some(succ) => {
                if succ.predecessor() != Some(*id) {
                    report.link_violations += 1;
                }
            }
            None => report.link_violations += 1,
        }
    }

    // successors must walk one cycle through every node
    let mut visited = HashSet::new();
    let mut current = start;
    loop {
        if !visited.insert(current) {
            break;
        }
        current = match nodes.get(&current) {
            Some(node) => node.successor(),
            None => break,
        };
    }
    report.cycle_violations += nodes.len() - visited.len();
    if current != start {
        report.cycle_violations += 1;
    }

    // fingers must point at the true successor of their start
    let mut rng = rand::thread_rng();
    for (_, node) in nodes {
        let indices: Vec<u32> = if full_fingers {
            (0..ring.m()).collect()
        } else {
            vec![rng.gen_range(0, ring.m())]
        };
        for i in indices {
            let owner = table_owner(nodes, node.finger_start(i));
            if owner != Some(node.finger(i)) {
                report.finger_violations += 1;
            }
        }
    }

    // every stored name must live on the successor of its hash
    for (id, node) in nodes {
        for (name, item) in node.store_iter() {
            let key = ring.hash(name);
            if key != item.key || table_owner(nodes, key) != Some(*id) {
                report.residency_violations += 1;
            }
        }
    }
    report
}
