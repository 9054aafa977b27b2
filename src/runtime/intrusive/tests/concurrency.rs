//! 并发测试
//!
//! 多线程下的计数一致性以及 lock() 与最后一次强引用释放之间的竞争

use super::*;
use crate::runtime::intrusive::WeakIntrusivePtr;
use crate::util::config::{ordering_policy, set_ordering_policy, OrderingPolicy};
use std::sync::Barrier;
use std::thread;

const THREADS: usize = 8;

#[test]
fn test_concurrent_clone_and_drop_balances() {
    let counters = Arc::new(Counters::default());
    let p = tensor(&counters);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..1_000 {
                    let copy = p.clone();
                    let weak = copy.downgrade();
                    assert!(copy.use_count() >= 2);
                    drop(weak);
                    drop(copy);
                }
            });
        }
    });

    assert_eq!(p.use_count(), 1);
    assert_eq!(p.weak_use_count(), 1);
    assert_eq!(counters.destroyed(), 0);
}

#[test]
fn test_concurrent_last_release_happens_once() {
    let counters = Arc::new(Counters::default());

    for _ in 0..100 {
        let p = tensor(&counters);
        let barrier = Barrier::new(THREADS);
        let copies: Vec<_> = (0..THREADS).map(|_| p.clone()).collect();
        drop(p);

        thread::scope(|s| {
            for copy in copies {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    drop(copy);
                });
            }
        });
    }

    assert_eq!(counters.destroyed(), 100);
    assert_eq!(counters.released(), 0);
}

#[test]
fn test_lock_races_final_release() {
    let counters = Arc::new(Counters::default());
    let rounds = 200;

    for _ in 0..rounds {
        let strong = tensor(&counters);
        let weak = strong.downgrade();
        let barrier = Barrier::new(2);

        thread::scope(|s| {
            s.spawn(|| {
                barrier.wait();
                drop(strong);
            });
            s.spawn(|| {
                barrier.wait();
                loop {
                    let locked = weak.lock();
                    if locked.is_null() {
                        assert!(weak.expired());
                        break;
                    }
                    // a successful upgrade always sees the payload
                    assert_eq!(locked.len(), Some(3));
                }
            });
        });

        assert!(weak.expired());
        drop(weak);
    }

    assert_eq!(counters.destroyed(), rounds);
    assert_eq!(counters.released(), rounds);
}

#[test]
fn test_weak_handoff_between_threads() {
    let counters = Arc::new(Counters::default());
    let strong = tensor(&counters);
    let weaks: Vec<WeakIntrusivePtr<Tensor>> = (0..THREADS).map(|_| strong.downgrade()).collect();

    let handles: Vec<_> = weaks
        .into_iter()
        .map(|weak| {
            thread::spawn(move || {
                let locked = weak.lock();
                locked.defined()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(strong.use_count(), 1);
    assert_eq!(strong.weak_use_count(), 1);
}

#[test]
fn test_acq_rel_policy_keeps_protocol() {
    let previous = ordering_policy();
    set_ordering_policy(OrderingPolicy::AcqRel);

    let counters = Arc::new(Counters::default());
    let strong = tensor(&counters);
    let weak = strong.downgrade();

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..500 {
                    let locked = weak.lock();
                    assert!(locked.defined());
                }
            });
        }
    });

    drop(strong);
    assert_eq!(counters.released(), 1);
    drop(weak);
    assert_eq!(counters.destroyed(), 1);

    set_ordering_policy(previous);
}
