//! Error handling integration tests
//!
//! Invariant violations surface as panics carrying a `TracedError`.

use tinytorch::runtime::intrusive::CountInit;
use tinytorch::util::error::{catch_fatal, track_fatal};
use tinytorch::{impl_intrusive_target, IntrusivePtr, RefCountError, RefCounts};

#[derive(Debug, Default)]
struct Slot {
    counts: RefCounts,
}

impl_intrusive_target!(Slot, counts);

#[test]
fn test_adopting_owned_object_is_fatal() {
    let p = IntrusivePtr::new(Slot::default());
    let raw = p.as_ptr().unwrap().as_ptr();

    let err = catch_fatal(|| unsafe { IntrusivePtr::from_raw(raw, CountInit::Initialize) }).unwrap_err();
    assert_eq!(err.kind(), &RefCountError::AlreadyOwned { strong: 1, weak: 1 });
    assert_eq!(err.origin(), "RefCounts::initialize");
    assert_eq!(p.use_count(), 1);
}

#[test]
fn test_try_from_raw_returns_error() {
    let p = IntrusivePtr::new(Slot::default());
    let raw = p.as_ptr().unwrap().as_ptr();

    let err = unsafe { IntrusivePtr::try_from_raw(raw, CountInit::Initialize) }.unwrap_err();
    assert!(matches!(err.kind(), RefCountError::AlreadyOwned { .. }));
}

#[test]
fn test_dropping_owned_counts_is_fatal() {
    let err = catch_fatal(|| {
        let counts = RefCounts::new();
        counts.increase_strong();
        drop(counts);
    })
    .unwrap_err();

    assert_eq!(err.kind(), &RefCountError::NonZeroOnDrop { strong: 1, weak: 0 });
    assert!(err.to_string().contains("(both should be 0)"));
}

#[test]
fn test_handler_sites_accumulate() {
    let err = catch_fatal(|| {
        track_fatal("Engine::backward", || {
            track_fatal("Graph::teardown", || {
                let counts = RefCounts::new();
                counts.increase_weak();
            })
        })
    })
    .unwrap_err();

    let trace: Vec<&str> = err.trace().collect();
    assert_eq!(trace, vec!["RefCounts::drop", "Graph::teardown", "Engine::backward"]);
    assert!(err.to_string().ends_with("\n  at Engine::backward"));
}
