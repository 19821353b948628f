// File: protocol.rs
//
// End-to-end protocol tests: placement, migration under joins and
// leaves, routing bounds, durability, and the observer surfaces. All
// expectations are derived from a naive sorted-id model of the ring,
// never from precomputed digests.

use gyre::{
    CounterSink, Event, EventSink, OpKind, Overlay, OverlayConfig, OverlayError, Ring, ValueCodec,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A sink that keeps every event for later inspection.
#[derive(Clone, Default)]
struct CaptureSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl CaptureSink {
    fn events(&self) -> Vec<Event> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl EventSink for CaptureSink {
    fn record(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Lets a test hold on to a `CounterSink` it has handed to an overlay.
struct SharedCounter(Arc<CounterSink>);

impl EventSink for SharedCounter {
    fn record(&self, event: &Event) {
        self.0.record(event);
    }
}

/// A toy at-rest transform.
struct XorCodec(u8);

impl ValueCodec for XorCodec {
    fn wrap(&self, value: &[u8]) -> Vec<u8> {
        value.iter().map(|byte| byte ^ self.0).collect()
    }

    fn unwrap(&self, value: &[u8]) -> Vec<u8> {
        value.iter().map(|byte| byte ^ self.0).collect()
    }
}

fn ring_of(m: u32, ids: &[u64]) -> Overlay {
    Overlay::new(OverlayConfig::new(m).initial_ids(ids.iter().copied())).unwrap()
}

/// Searches for a name that hashes onto exactly this key.
fn name_with_key(ring: Ring, key: u64) -> String {
    (0u64..)
        .map(|salt| format!("name-{}-{}", key, salt))
        .find(|name| ring.hash(name) == key)
        .unwrap()
}

/// The reference model: the owner of a key is the smallest id at or
/// past it, wrapping to the lowest.
fn naive_owner(ids: &[u64], key: u64) -> u64 {
    let mut sorted = ids.to_vec();
    sorted.sort();
    sorted
        .iter()
        .copied()
        .find(|id| *id >= key)
        .unwrap_or(sorted[0])
}

/// Every stored key must sit on the node the model names.
fn assert_residency(overlay: &Overlay) {
    let ids = overlay.node_ids();
    for item in overlay.export_graph().stores {
        assert_eq!(
            item.node,
            naive_owner(&ids, item.key),
            "key {} sits on the wrong node",
            item.key
        );
    }
}

/// Walking successors from the lowest node must visit every node once
/// and come back around.
fn assert_single_cycle(overlay: &Overlay) {
    let ids = overlay.node_ids();
    let start = ids[0];
    let mut visited = HashSet::new();
    let mut current = start;
    loop {
        assert!(
            visited.insert(current),
            "successor walk revisited {} before covering the ring",
            current
        );
        current = overlay.node_view(current).unwrap().successor;
        if current == start {
            break;
        }
    }
    assert_eq!(visited.len(), ids.len(), "successor cycle skipped nodes");
}

#[test]
fn lookup_wraps_on_the_minimal_ring() {
    let overlay = ring_of(3, &[0, 2, 4]);
    let owner = overlay.put("alpha", b"A").unwrap();
    let key = overlay.ring().hash("alpha");
    assert_eq!(owner, naive_owner(&[0, 2, 4], key));
    assert_eq!(overlay.lookup("alpha"), Some(b"A".to_vec()));
    // the answer must not depend on where the query enters
    for entry in overlay.node_ids() {
        assert_eq!(
            overlay.lookup_from(entry, "alpha").unwrap(),
            Some(b"A".to_vec())
        );
    }
}

#[test]
fn join_and_leave_migrate_exactly_the_affected_range() {
    let overlay = ring_of(3, &[0, 4]);
    let ring = overlay.ring();
    let names: Vec<(u64, String)> = [1u64, 3, 5, 7]
        .iter()
        .map(|key| (*key, name_with_key(ring, *key)))
        .collect();
    for (key, name) in &names {
        overlay.put(name, format!("v{}", key).as_bytes()).unwrap();
    }
    assert_residency(&overlay);
    let graph = overlay.export_graph();
    assert_eq!(graph.keys_on(4), vec![1, 3]);
    assert_eq!(graph.keys_on(0), vec![5, 7]);

    // a newcomer splits its successor's range and takes only its share
    overlay.insert_node(2).unwrap();
    assert_residency(&overlay);
    let graph = overlay.export_graph();
    assert_eq!(graph.keys_on(2), vec![1]);
    assert_eq!(graph.keys_on(4), vec![3]);
    assert_eq!(graph.keys_on(0), vec![5, 7]);
    for (key, name) in &names {
        for entry in overlay.node_ids() {
            assert_eq!(
                overlay.lookup_from(entry, name).unwrap(),
                Some(format!("v{}", key).into_bytes()),
                "{} lost after the join",
                name
            );
        }
    }

    // the leaver hands everything back to its successor
    overlay.remove_node(2).unwrap();
    assert_residency(&overlay);
    let graph = overlay.export_graph();
    assert_eq!(graph.keys_on(4), vec![1, 3]);
    assert_eq!(graph.keys_on(0), vec![5, 7]);
    for (key, name) in &names {
        assert_eq!(
            overlay.lookup(name),
            Some(format!("v{}", key).into_bytes()),
            "{} lost after the leave",
            name
        );
    }
    assert!(overlay.health_check().is_clean());
}

#[test]
fn lookups_stay_within_the_hop_bound() {
    let sink = CaptureSink::default();
    let overlay = Overlay::new(
        OverlayConfig::new(6)
            .initial_ids(0u64..32)
            .sink(Box::new(sink.clone())),
    )
    .unwrap();

    let names: Vec<String> = (0..200).map(|i| format!("item-{}", i)).collect();
    for name in &names {
        overlay.put(name, name.as_bytes()).unwrap();
    }
    for name in &names {
        assert_eq!(
            overlay.lookup_from(0, name).unwrap(),
            Some(name.clone().into_bytes())
        );
    }

    let lookups: Vec<Event> = sink
        .events()
        .into_iter()
        .filter(|event| event.kind == OpKind::Lookup)
        .collect();
    assert_eq!(lookups.len(), 200);
    for event in &lookups {
        assert!(event.hops <= 6, "a lookup took {} hops", event.hops);
    }
}

#[test]
fn snapshot_restores_into_an_empty_overlay() {
    let overlay = ring_of(4, &[1, 6, 11]);
    for i in 0..6 {
        let name = format!("fruit-{}", i);
        overlay.put(&name, name.to_uppercase().as_bytes()).unwrap();
    }
    let doc = overlay.snapshot();

    let restored = Overlay::new(OverlayConfig::new(4)).unwrap();
    restored.restore(&doc).unwrap();
    assert!(restored.health_check().is_clean());
    assert_eq!(restored.node_ids(), overlay.node_ids());
    for i in 0..6 {
        let name = format!("fruit-{}", i);
        assert_eq!(
            restored.lookup(&name),
            Some(name.to_uppercase().into_bytes())
        );
    }

    // capturing the restored overlay reproduces the document
    let recaptured = restored.snapshot();
    assert_eq!(recaptured.m, doc.m);
    assert_eq!(recaptured.nodes, doc.nodes);
}

#[test]
fn failed_inserts_leave_no_trace() {
    let overlay = ring_of(4, &[0, 5, 10]);
    overlay.put("pepper", b"red").unwrap();
    let before = overlay.snapshot();

    assert_eq!(
        overlay.insert_node(5).unwrap_err(),
        OverlayError::IdConflict(5)
    );
    assert_eq!(
        overlay.insert_node(16).unwrap_err(),
        OverlayError::IdOutOfRange { id: 16, size: 16 }
    );

    let after = overlay.snapshot();
    assert_eq!(after.nodes, before.nodes);
}

#[test]
fn the_ring_survives_random_churn() {
    let mut rng = StdRng::seed_from_u64(0x00C0_FFEE);
    let overlay = ring_of(8, &[10, 80, 150, 220]);
    let mut stored = Vec::new();
    for i in 0..24 {
        let name = format!("item-{}", i);
        let value = format!("value-{}", i).into_bytes();
        overlay.put(&name, &value).unwrap();
        stored.push((name, value));
    }

    for _ in 0..50 {
        let ids = overlay.node_ids();
        let grow = ids.len() == 1 || rng.gen_bool(0.6);
        if grow {
            let id = loop {
                let candidate = rng.gen_range(0, 256);
                if !ids.contains(&candidate) {
                    break candidate;
                }
            };
            overlay.insert_node(id).unwrap();
        } else {
            let id = ids[rng.gen_range(0, ids.len())];
            overlay.remove_node(id).unwrap();
        }

        assert_single_cycle(&overlay);
        assert_residency(&overlay);
        let ids = overlay.node_ids();
        for (name, value) in &stored {
            let entry = ids[rng.gen_range(0, ids.len())];
            assert_eq!(
                overlay.lookup_from(entry, name).unwrap(),
                Some(value.clone()),
                "{} lost during churn",
                name
            );
        }
    }

    overlay.rebalance().unwrap();
    assert!(overlay.health_check().is_clean());

    // after convergence every finger is the true successor of its start
    let ring = overlay.ring();
    let ids = overlay.node_ids();
    for id in &ids {
        let view = overlay.node_view(*id).unwrap();
        for (i, finger) in view.fingers.iter().enumerate() {
            assert_eq!(
                *finger,
                naive_owner(&ids, ring.finger_start(*id, i as u32)),
                "finger {} of node {} is off target",
                i,
                id
            );
        }
    }
}

#[test]
fn stored_values_pass_through_the_codec() {
    let overlay = Overlay::new(
        OverlayConfig::new(4)
            .initial_ids(vec![0, 8])
            .value_codec(Box::new(XorCodec(0x5a))),
    )
    .unwrap();
    overlay.put("secret", b"plain").unwrap();
    assert_eq!(overlay.lookup("secret"), Some(b"plain".to_vec()));

    // at rest the bytes are wrapped
    let doc = overlay.snapshot();
    let item = doc
        .nodes
        .iter()
        .flat_map(|node| node.store.iter())
        .find(|item| item.name == "secret")
        .unwrap();
    let at_rest = base64::decode(&item.value).unwrap();
    assert_ne!(at_rest, b"plain".to_vec());
    assert_eq!(XorCodec(0x5a).unwrap(&at_rest), b"plain".to_vec());

    assert_eq!(overlay.delete("secret"), Some(b"plain".to_vec()));
    assert_eq!(overlay.lookup("secret"), None);
}

#[test]
fn the_counter_sink_sees_the_traffic() {
    let counters = Arc::new(CounterSink::new());
    let overlay = Overlay::new(
        OverlayConfig::new(3)
            .initial_ids(vec![0, 4])
            .sink(Box::new(SharedCounter(Arc::clone(&counters)))),
    )
    .unwrap();
    overlay.put("a", b"1").unwrap();
    overlay.put("b", b"2").unwrap();
    assert!(overlay.lookup("a").is_some());
    assert!(overlay.lookup("b").is_some());
    assert!(overlay.lookup("missing").is_none());
    assert!(overlay.delete("a").is_some());

    let seen = counters.counters();
    assert_eq!(seen.operations_total[&OpKind::Put], 2);
    assert_eq!(seen.operations_total[&OpKind::Lookup], 3);
    assert_eq!(seen.operations_total[&OpKind::Delete], 1);
    assert_eq!(seen.total_nodes, 2);
    assert_eq!(seen.total_keys, 1);
    assert_eq!(seen.node_load.values().sum::<u64>(), 2);
}

#[test]
fn restore_rejects_what_it_cannot_verify() {
    let source = ring_of(4, &[0, 8]);
    source.put("kept", b"value").unwrap();
    let doc = source.snapshot();

    // the live ring exponent must match
    let other = ring_of(5, &[3]);
    assert!(matches!(
        other.restore(&doc).unwrap_err(),
        OverlayError::SnapshotInconsistent(_)
    ));
    assert_eq!(other.m(), 5);
    assert_eq!(other.node_ids(), vec![3]);

    // unknown versions are refused outright
    let mut versioned = doc.clone();
    versioned.version = 3;
    let empty = Overlay::new(OverlayConfig::new(4)).unwrap();
    assert_eq!(
        empty.restore(&versioned).unwrap_err(),
        OverlayError::SnapshotVersionMismatch(3)
    );

    // a document whose keys sit on the wrong nodes fails verification
    // and changes nothing
    let mut misplaced = doc.clone();
    let swapped = misplaced.nodes[0].store.clone();
    misplaced.nodes[0].store = misplaced.nodes[1].store.clone();
    misplaced.nodes[1].store = swapped;
    assert!(matches!(
        empty.restore(&misplaced).unwrap_err(),
        OverlayError::SnapshotInconsistent(_)
    ));
    assert!(empty.is_empty());
}

#[test]
fn entry_nodes_account_their_lookups() {
    let overlay = ring_of(3, &[0, 2, 4]);
    overlay.put("alpha", b"A").unwrap();
    overlay.lookup_from(2, "alpha").unwrap();
    overlay.lookup_from(2, "alpha").unwrap();
    let view = overlay.node_view(2).unwrap();
    assert_eq!(view.lookups, 2);
    assert_eq!(overlay.node_view(0).unwrap().lookups, 0);
}
