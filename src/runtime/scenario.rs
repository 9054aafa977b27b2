//! Lifecycle scenario and concurrent stress runs.
//!
//! Both drive [`Probe`] objects whose teardown hooks bump shared counters, so
//! a run can prove that every object had its storage released at most once
//! and was deallocated exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, ensure, Result};
use crossbeam::channel;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info};

use crate::impl_intrusive_target;
use crate::runtime::intrusive::{IntrusivePtr, RefCounts, WeakIntrusivePtr};

/// Teardown statistics shared by a family of probes.
#[derive(Debug, Default)]
pub struct ProbeStats {
    /// Probes constructed
    pub created: AtomicUsize,
    /// `release_storage` invocations
    pub storage_released: AtomicUsize,
    /// Probes deallocated
    pub destroyed: AtomicUsize,
    /// `release_storage` calls on a probe that was already released
    pub double_releases: AtomicUsize,
    /// Successful upgrades that found the payload already released
    pub stale_upgrades: AtomicUsize,
}

impl ProbeStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn storage_released(&self) -> usize {
        self.storage_released.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn double_releases(&self) -> usize {
        self.double_releases.load(Ordering::SeqCst)
    }

    pub fn stale_upgrades(&self) -> usize {
        self.stale_upgrades.load(Ordering::SeqCst)
    }

    /// Probes created but not yet deallocated
    pub fn alive(&self) -> usize {
        self.created().saturating_sub(self.destroyed())
    }
}

/// Managed object with a releasable payload and observable teardown.
#[derive(Debug)]
pub struct Probe {
    counts: RefCounts,
    payload: Mutex<Option<Vec<f32>>>,
    stats: Arc<ProbeStats>,
}

impl Probe {
    pub fn new(
        stats: Arc<ProbeStats>,
        len: usize,
    ) -> Self {
        stats.created.fetch_add(1, Ordering::SeqCst);
        Self {
            counts: RefCounts::new(),
            payload: Mutex::new(Some(vec![1.0; len])),
            stats,
        }
    }

    /// Payload length, `None` after `release_storage`
    pub fn payload_len(&self) -> Option<usize> {
        self.payload.lock().as_ref().map(Vec::len)
    }

    fn free_payload(&self) {
        if self.payload.lock().take().is_none() {
            self.stats.double_releases.fetch_add(1, Ordering::SeqCst);
        }
        self.stats.storage_released.fetch_add(1, Ordering::SeqCst);
    }
}

impl_intrusive_target!(Probe, counts, release = free_payload);

impl Drop for Probe {
    fn drop(&mut self) {
        self.stats.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts observed at one step of the lifecycle scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStep {
    pub label: &'static str,
    /// `(strong, weak)` read through a surviving handle, `None` once the
    /// object has been deallocated and no handle is left to read from
    pub counts: Option<(usize, usize)>,
    pub storage_released: usize,
    pub destroyed: usize,
}

/// Outcome of [`run_lifecycle`]
#[derive(Debug, Clone)]
pub struct LifecycleReport {
    pub steps: Vec<LifecycleStep>,
    pub expired_after_strong_drop: bool,
    pub lock_after_strong_drop_empty: bool,
}

/// Adopt, copy, observe and drop one object, recording counts after each step.
///
/// Walks: adopt A → copy into B → weak W from A → drop A → drop B → drop W.
pub fn run_lifecycle() -> Result<LifecycleReport> {
    let stats = Arc::new(ProbeStats::default());
    let mut steps = Vec::new();
    let record = |steps: &mut Vec<LifecycleStep>, label, counts| {
        steps.push(LifecycleStep {
            label,
            counts,
            storage_released: stats.storage_released(),
            destroyed: stats.destroyed(),
        });
    };

    let a = IntrusivePtr::new(Probe::new(Arc::clone(&stats), 1024));
    record(&mut steps, "adopt A", Some((a.use_count(), a.weak_use_count())));

    let b = a.clone();
    record(&mut steps, "copy A into B", Some((b.use_count(), b.weak_use_count())));

    let w = a.downgrade();
    record(&mut steps, "weak W from A", Some((w.use_count(), w.weak_use_count())));

    drop(a);
    record(&mut steps, "drop A", Some((w.use_count(), w.weak_use_count())));

    drop(b);
    record(&mut steps, "drop B", Some((w.use_count(), w.weak_use_count())));

    let expired_after_strong_drop = w.expired();
    let lock_after_strong_drop_empty = w.lock().is_null();

    drop(w);
    record(&mut steps, "drop W", None);

    ensure!(
        stats.storage_released() == 1,
        "release_storage ran {} times",
        stats.storage_released()
    );
    ensure!(stats.destroyed() == 1, "probe deallocated {} times", stats.destroyed());

    Ok(LifecycleReport {
        steps,
        expired_after_strong_drop,
        lock_after_strong_drop_empty,
    })
}

/// Parameters for [`run_stress`]
#[derive(Debug, Clone)]
pub struct StressOptions {
    /// Producer threads; the same number of consumer threads is spawned
    pub threads: usize,
    /// Objects created per producer
    pub iterations: usize,
    /// Extra strong copies made per object, chosen uniformly in `0..=max_clones`
    pub max_clones: usize,
    /// Payload length per probe
    pub payload_len: usize,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            iterations: 10_000,
            max_clones: 3,
            payload_len: 16,
        }
    }
}

/// Outcome of [`run_stress`]
#[derive(Debug, Clone)]
pub struct StressReport {
    pub created: usize,
    pub destroyed: usize,
    pub storage_released: usize,
    pub upgrades: usize,
    pub expired: usize,
    pub elapsed: Duration,
}

/// Race upgrades against final strong releases across threads.
///
/// Producers create probes, hand weak pointers to consumers and drop their
/// strong copies at random points; consumers upgrade and check the payload is
/// still present. Fails if any probe leaked, was released twice, or was
/// upgraded after its storage was released.
pub fn run_stress(options: &StressOptions) -> Result<StressReport> {
    if options.threads == 0 {
        bail!("stress run needs at least one thread");
    }

    let stats = Arc::new(ProbeStats::default());
    let upgrades = AtomicUsize::new(0);
    let expired = AtomicUsize::new(0);
    let (tx, rx) = channel::bounded::<WeakIntrusivePtr<Probe>>(1024);
    let started = Instant::now();

    info!(
        "stress: {} producers x {} iterations",
        options.threads, options.iterations
    );

    crossbeam::scope(|scope| {
        for _ in 0..options.threads {
            let tx = tx.clone();
            let stats = Arc::clone(&stats);
            scope.spawn(move |_| produce(&stats, &tx, options));
        }
        drop(tx);

        for _ in 0..options.threads {
            let rx = rx.clone();
            let stats = &stats;
            let upgrades = &upgrades;
            let expired = &expired;
            scope.spawn(move |_| {
                for weak in rx.iter() {
                    match weak.upgrade() {
                        Some(strong) => {
                            if strong.payload_len().is_none() {
                                stats.stale_upgrades.fetch_add(1, Ordering::SeqCst);
                            }
                            upgrades.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {
                            expired.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    })
    .map_err(|_| anyhow::anyhow!("a stress worker panicked"))?;

    let report = StressReport {
        created: stats.created(),
        destroyed: stats.destroyed(),
        storage_released: stats.storage_released(),
        upgrades: upgrades.into_inner(),
        expired: expired.into_inner(),
        elapsed: started.elapsed(),
    };
    debug!("stress report: {:?}", report);

    ensure!(
        report.created == options.threads * options.iterations,
        "created {} probes, expected {}",
        report.created,
        options.threads * options.iterations
    );
    ensure!(
        report.destroyed == report.created,
        "{} probes leaked",
        stats.alive()
    );
    ensure!(
        report.storage_released <= report.created,
        "release_storage ran {} times for {} probes",
        report.storage_released,
        report.created
    );
    ensure!(stats.double_releases() == 0, "storage released twice");
    ensure!(stats.stale_upgrades() == 0, "upgraded into a released probe");

    Ok(report)
}

fn produce(
    stats: &Arc<ProbeStats>,
    tx: &channel::Sender<WeakIntrusivePtr<Probe>>,
    options: &StressOptions,
) {
    let mut rng = rand::rng();
    for _ in 0..options.iterations {
        let strong = IntrusivePtr::new(Probe::new(Arc::clone(stats), options.payload_len));
        let clones: Vec<_> = (0..rng.random_range(0..=options.max_clones))
            .map(|_| strong.clone())
            .collect();

        if tx.send(strong.downgrade()).is_err() {
            return;
        }

        // Spin briefly so some drops land while a consumer is mid-upgrade.
        for _ in 0..rng.random_range(0..64) {
            std::hint::spin_loop();
        }
        drop(clones);
        drop(strong);
    }
}
