// File: node.rs
//
// The purpose of this file is to hold the per-node state: identity,
// neighbor links, the finger table, the local key/value store, and the
// node's own counters.

use crate::ring::Ring;
use std::collections::HashMap;

/// One finger table entry: the start of the interval it covers and the
/// node currently believed to be the successor of that start.
#[derive(Debug)]
pub(crate) struct FingerEntry {
    pub start: u64,
    pub node: u64,
}

/// A value stored under a name, with the name's ring key cached so
/// migration never has to re-hash.
#[derive(Debug)]
pub(crate) struct StoredItem {
    pub key: u64,
    pub value: Vec<u8>,
}

/// A participant on the ring. Neighbors and fingers are held as plain
/// ids; the overlay owns the id table and resolves them at use, so a
/// departed node is gone the moment its table entry is.
#[derive(Debug)]
pub(crate) struct Node {
    ring: Ring,
    id: u64,
    successor: u64,
    predecessor: Option<u64>,
    fingers: Vec<FingerEntry>,
    store: HashMap<String, StoredItem>,
    lookups: u64,
    lookup_hops: u64,
    bytes_stored: u64,
}

impl Node {
    /// Returns a new node initialized as if it were alone on the ring:
    /// its own successor, no predecessor, every finger pointing home.
    ///
    /// # Arguments
    ///
    /// * `ring` - the identifier circle the node lives on
    /// * `id` - the node's position on it
    pub fn new(ring: Ring, id: u64) -> Node {
        let fingers = (0..ring.m())
            .map(|i| FingerEntry {
                start: ring.finger_start(id, i),
                node: id,
            })
            .collect();
        Node {
            ring,
            id,
            successor: id,
            predecessor: None,
            fingers,
            store: HashMap::new(),
            lookups: 0,
            lookup_hops: 0,
            bytes_stored: 0,
        }
    }

    /// Rebuilds a node from snapshot parts, links and store verbatim.
    pub fn from_parts(
        ring: Ring,
        id: u64,
        successor: u64,
        predecessor: Option<u64>,
        finger_ids: &[u64],
        items: Vec<(String, StoredItem)>,
    ) -> Node {
        let mut node = Node::new(ring, id);
        node.successor = successor;
        node.predecessor = predecessor;
        for (i, target) in finger_ids.iter().enumerate() {
            node.fingers[i].node = *target;
        }
        node.adopt(items);
        node
    }

    pub fn successor(&self) -> u64 {
        self.successor
    }

    /// Sets the node's successor. The first finger is the successor by
    /// definition, so it follows along.
    pub fn set_successor(&mut self, succ: u64) {
        self.fingers[0].node = succ;
        self.successor = succ;
    }

    pub fn predecessor(&self) -> Option<u64> {
        self.predecessor
    }

    pub fn set_predecessor(&mut self, pred: Option<u64>) {
        self.predecessor = pred;
    }

    /// Points every finger at `target`. A joining node starts out this
    /// way and lets stabilization sharpen the table afterwards.
    pub fn fill_fingers(&mut self, target: u64) {
        for finger in self.fingers.iter_mut() {
            finger.node = target;
        }
        self.successor = target;
    }

    pub fn finger(&self, i: u32) -> u64 {
        self.fingers[i as usize].node
    }

    pub fn finger_start(&self, i: u32) -> u64 {
        self.fingers[i as usize].start
    }

    /// Repoints finger `i`; returns whether the entry actually moved.
    pub fn set_finger(&mut self, i: u32, node: u64) -> bool {
        let moved = self.fingers[i as usize].node != node;
        self.fingers[i as usize].node = node;
        if i == 0 {
            self.successor = node;
        }
        moved
    }

    pub fn finger_nodes(&self) -> Vec<u64> {
        self.fingers.iter().map(|f| f.node).collect()
    }

    /// Finds the closest preceding finger for `key`: scanning the table
    /// from the widest interval down, the first finger strictly between
    /// this node and the key. Fingers rejected by `live` are skipped;
    /// the node itself is returned when nothing qualifies.
    ///
    /// # Arguments
    ///
    /// * `key` - the id being routed towards
    /// * `live` - whether a finger target can still be resolved
    pub fn closest_preceding_finger<F>(&self, key: u64, mut live: F) -> u64
    where
        F: FnMut(u64) -> bool,
    {
        for finger in self.fingers.iter().rev() {
            if self.ring.in_open(finger.node, self.id, key) && live(finger.node) {
                return finger.node;
            }
        }
        self.id
    }

    /// A node thinks it might be this node's predecessor. Accepts the
    /// candidate if there is no predecessor yet or the candidate sits
    /// between the current one and this node. Returns whether the link
    /// changed.
    ///
    /// # Arguments
    ///
    /// * `candidate` - the node claiming to precede this one
    pub fn notify(&mut self, candidate: u64) -> bool {
        let accept = match self.predecessor {
            None => true,
            Some(pred) => self.ring.in_open(candidate, pred, self.id),
        };
        if accept && self.predecessor != Some(candidate) {
            self.predecessor = Some(candidate);
            return true;
        }
        false
    }

    /// Stores a value under a name, returning the value it replaced.
    ///
    /// # Arguments
    ///
    /// * `name` - the name being stored
    /// * `key` - the name's ring key
    /// * `value` - the bytes to store
    pub fn put_local(&mut self, name: &str, key: u64, value: Vec<u8>) -> Option<Vec<u8>> {
        self.bytes_stored += value.len() as u64;
        let old = self
            .store
            .insert(String::from(name), StoredItem { key, value });
        if let Some(item) = &old {
            self.bytes_stored -= item.value.len() as u64;
        }
        old.map(|item| item.value)
    }

    /// Returns the stored item for a name, if this node holds it.
    pub fn get_local(&self, name: &str) -> Option<&StoredItem> {
        self.store.get(name)
    }

    /// Removes and returns the stored item for a name.
    pub fn delete_local(&mut self, name: &str) -> Option<StoredItem> {
        let removed = self.store.remove(name);
        if let Some(item) = &removed {
            self.bytes_stored -= item.value.len() as u64;
        }
        removed
    }

    /// Removes and returns every item whose key falls in `(min, max]`
    /// clockwise. This is the migration step when ownership of a
    /// subrange moves to another node.
    ///
    /// # Arguments
    ///
    /// * `min` - excluded lower bound of the departing range
    /// * `max` - included upper bound of the departing range
    pub fn take_range(&mut self, min: u64, max: u64) -> Vec<(String, StoredItem)> {
        let ring = self.ring;
        let names: Vec<String> = self
            .store
            .iter()
            .filter(|(_, item)| ring.in_half_open(item.key, min, max))
            .map(|(name, _)| name.clone())
            .collect();
        let mut moved = Vec::with_capacity(names.len());
        for name in names {
            if let Some(item) = self.delete_local(&name) {
                moved.push((name, item));
            }
        }
        moved
    }

    /// Removes and returns the whole store. Used when the node leaves.
    pub fn take_all(&mut self) -> Vec<(String, StoredItem)> {
        self.bytes_stored = 0;
        self.store.drain().collect()
    }

    /// Absorbs items migrated from another node.
    pub fn adopt(&mut self, items: Vec<(String, StoredItem)>) {
        for (name, item) in items {
            self.put_local(&name, item.key, item.value);
        }
    }

    pub fn store_iter(&self) -> impl Iterator<Item = (&String, &StoredItem)> {
        self.store.iter()
    }

    pub fn key_count(&self) -> usize {
        self.store.len()
    }

    pub fn bytes_stored(&self) -> u64 {
        self.bytes_stored
    }

    /// Accounts one lookup routed from this node.
    pub fn record_lookup(&mut self, hops: u32) {
        self.lookups += 1;
        self.lookup_hops += u64::from(hops);
    }

    pub fn view(&self) -> NodeView {
        NodeView {
            id: self.id,
            successor: self.successor,
            predecessor: self.predecessor,
            fingers: self.finger_nodes(),
            keys: self.key_count(),
            bytes_stored: self.bytes_stored(),
            lookups: self.lookups,
            lookup_hops: self.lookup_hops,
        }
    }
}

/// Read-only projection of a node for callers outside the crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub id: u64,
    pub successor: u64,
    pub predecessor: Option<u64>,
    pub fingers: Vec<u64>,
    pub keys: usize,
    pub bytes_stored: u64,
    pub lookups: u64,
    pub lookup_hops: u64,
}
