// File: event.rs
//
// The purpose of this file is to define the event records the overlay
// emits for every operation, and the sinks that consume them.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// The kind of operation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Create,
    NodeJoin,
    NodeLeave,
    Put,
    Lookup,
    Delete,
    Stabilize,
    Rebalance,
    Snapshot,
    Restore,
    HealthCheck,
}

/// One observed operation. `ids` carries the nodes involved (entry point
/// first, owner last for routed operations), `hops` the routing hop
/// count, and `error` a tag for anomalies that were absorbed rather
/// than surfaced. `total_nodes` and `total_keys` are gauges read at the
/// moment the event was recorded.
#[derive(Debug, Clone)]
pub struct Event {
    pub seq: u64,
    pub kind: OpKind,
    pub ids: Vec<u64>,
    pub hops: u32,
    pub elapsed: Option<Duration>,
    pub error: Option<&'static str>,
    pub total_nodes: u64,
    pub total_keys: u64,
}

/// A passive observer of overlay operations. Implementations must not
/// block and have no way to fail: `record` returns nothing, and
/// anything going wrong inside a sink stays inside the sink.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Discards every event. The default sink.
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &Event) {}
}

/// Aggregated view of everything a `CounterSink` has seen.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub total_nodes: u64,
    pub total_keys: u64,
    pub operations_total: HashMap<OpKind, u64>,
    pub lookup_hops: u64,
    pub node_load: HashMap<u64, u64>,
}

/// A sink that folds events into counters: operation totals by kind,
/// cumulative lookup hops, placements per node, and the latest node and
/// key gauges.
pub struct CounterSink {
    inner: Mutex<Counters>,
}

impl CounterSink {
    pub fn new() -> CounterSink {
        CounterSink {
            inner: Mutex::new(Counters::default()),
        }
    }

    /// A copy of the current counter state.
    pub fn counters(&self) -> Counters {
        self.inner.lock().clone()
    }
}

impl Default for CounterSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for CounterSink {
    fn record(&self, event: &Event) {
        let mut counters = self.inner.lock();
        *counters.operations_total.entry(event.kind).or_insert(0) += 1;
        counters.total_nodes = event.total_nodes;
        counters.total_keys = event.total_keys;
        if event.kind == OpKind::Lookup {
            counters.lookup_hops += u64::from(event.hops);
        }
        if event.kind == OpKind::Put {
            if let Some(owner) = event.ids.last() {
                *counters.node_load.entry(*owner).or_insert(0) += 1;
            }
        }
    }
}
