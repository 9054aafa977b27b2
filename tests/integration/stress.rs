//! Stress integration tests
//!
//! Small multi-threaded runs of the upgrade-versus-release race.

use tinytorch::runtime::scenario::{run_stress, StressOptions};

#[test]
fn test_stress_small_run_balances() {
    let options = StressOptions {
        threads: 2,
        iterations: 200,
        max_clones: 2,
        payload_len: 4,
    };
    let report = run_stress(&options).unwrap();

    assert_eq!(report.created, 400);
    assert_eq!(report.destroyed, 400);
    assert!(report.storage_released <= report.created);
    assert_eq!(report.upgrades + report.expired, report.created);
}

#[test]
fn test_stress_single_thread() {
    let options = StressOptions {
        threads: 1,
        iterations: 50,
        ..StressOptions::default()
    };
    let report = run_stress(&options).unwrap();
    assert_eq!(report.destroyed, 50);
}

#[test]
fn test_stress_zero_threads_rejected() {
    let options = StressOptions {
        threads: 0,
        ..StressOptions::default()
    };
    let err = run_stress(&options).unwrap_err();
    assert!(err.to_string().contains("at least one thread"));
}

#[test]
fn test_stress_default_options() {
    let options = StressOptions::default();
    assert_eq!(options.threads, 4);
    assert_eq!(options.iterations, 10_000);
    assert_eq!(options.max_clones, 3);
}
