//! Lifecycle integration tests
//!
//! Shared ownership, weak observation and two-phase teardown through the
//! public API only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tinytorch::runtime::scenario::run_lifecycle;
use tinytorch::{impl_intrusive_target, impl_upcast, make_intrusive, IntrusivePtr, RefCounts, WeakIntrusivePtr};

#[derive(Default)]
struct Events {
    released: AtomicUsize,
    destroyed: AtomicUsize,
}

struct Graph {
    counts: RefCounts,
    nodes: Mutex<Vec<String>>,
    events: Arc<Events>,
}

impl Graph {
    fn new(events: &Arc<Events>) -> Self {
        Self {
            counts: RefCounts::new(),
            nodes: Mutex::new(vec!["input".to_string(), "output".to_string()]),
            events: Arc::clone(events),
        }
    }

    fn clear(&self) {
        self.nodes.lock().clear();
        self.events.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl_intrusive_target!(Graph, counts, release = clear);

impl Drop for Graph {
    fn drop(&mut self) {
        self.events.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

trait Named: tinytorch::IntrusiveTarget {
    fn name(&self) -> String;
}

impl Named for Graph {
    fn name(&self) -> String {
        self.nodes.lock().join("->")
    }
}

impl_upcast!(Graph => dyn Named);

#[test]
fn test_scenario_reports_expected_counts() {
    let report = run_lifecycle().unwrap();
    let counts: Vec<Option<(usize, usize)>> = report.steps.iter().map(|s| s.counts).collect();

    assert_eq!(
        counts,
        vec![Some((1, 1)), Some((2, 1)), Some((2, 2)), Some((1, 2)), Some((0, 1)), None]
    );
    assert!(report.expired_after_strong_drop);
    assert!(report.lock_after_strong_drop_empty);

    let drop_b = &report.steps[4];
    assert_eq!(drop_b.storage_released, 1);
    assert_eq!(drop_b.destroyed, 0);
    let last = report.steps.last().unwrap();
    assert_eq!(last.destroyed, 1);
}

#[test]
fn test_parent_child_graph_with_weak_back_edges() {
    let events = Arc::new(Events::default());
    let parent = make_intrusive(Graph::new(&events));
    let back_edges: Vec<WeakIntrusivePtr<Graph>> = (0..3).map(|_| parent.downgrade()).collect();

    assert_eq!(parent.weak_use_count(), 4);
    for edge in &back_edges {
        assert_eq!(edge.lock().name(), "input->output");
    }

    drop(parent);
    assert_eq!(events.released.load(Ordering::SeqCst), 1);
    assert!(back_edges.iter().all(WeakIntrusivePtr::expired));

    drop(back_edges);
    assert_eq!(events.destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_trait_object_handles_share_counts() {
    let events = Arc::new(Events::default());
    let graph = make_intrusive(Graph::new(&events));
    let named: IntrusivePtr<dyn Named> = graph.clone().upcast();

    assert_eq!(graph.use_count(), 2);
    assert_eq!(named.name(), "input->output");

    let weak = named.downgrade();
    drop(graph);
    drop(named);
    assert!(weak.expired());
    assert_eq!(events.released.load(Ordering::SeqCst), 1);

    drop(weak);
    assert_eq!(events.destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_pointers_as_hash_keys() {
    use std::collections::HashSet;

    let events = Arc::new(Events::default());
    let a = make_intrusive(Graph::new(&events));
    let b = make_intrusive(Graph::new(&events));

    let set: HashSet<_> = [a.clone(), b.clone(), a.clone()].into_iter().collect();
    assert_eq!(set.len(), 2);
    assert!(set.contains(&a));

    drop(set);
    assert_eq!(a.use_count(), 1);
}
