// File: lib.rs
//
// A single-process simulation of a Chord distributed hash table:
// nodes partition an identifier circle, lookups route through finger
// tables in O(log N) hops, and a stabilization protocol keeps the ring
// and its data intact across joins and leaves.

mod codec;
mod error;
mod event;
mod graph;
mod node;
mod overlay;
mod ring;
mod snapshot;

pub use crate::codec::ValueCodec;
pub use crate::error::OverlayError;
pub use crate::event::{CounterSink, Counters, Event, EventSink, NullSink, OpKind};
pub use crate::graph::{EdgeRole, GraphEdge, GraphView, StoreAnnotation};
pub use crate::node::NodeView;
pub use crate::overlay::{HealthReport, Overlay, OverlayConfig};
pub use crate::ring::Ring;
pub use crate::snapshot::{ItemRecord, NodeRecord, SnapshotDoc, SNAPSHOT_VERSION};
