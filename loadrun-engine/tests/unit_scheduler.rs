use loadrun_common::RunConfig;
use loadrun_engine::scheduler::{IterationCounter, Scheduler};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_should_stop_on_iterations() {
    let s = Scheduler::new(None, Some(5));
    assert!(!s.should_stop(Duration::from_secs(3600), 0));
    assert!(!s.should_stop(Duration::ZERO, 4));
    assert!(s.should_stop(Duration::ZERO, 5));
    assert!(s.should_stop(Duration::ZERO, 6));
}

#[test]
fn test_should_stop_on_duration() {
    let s = Scheduler::new(Some(Duration::from_secs(15)), None);
    assert!(!s.should_stop(Duration::from_millis(14_999), u64::MAX));
    assert!(s.should_stop(Duration::from_secs(15), 0));
}

#[test]
fn test_should_stop_on_whichever_limit_comes_first() {
    let s = Scheduler::new(Some(Duration::from_secs(10)), Some(100));
    assert!(!s.should_stop(Duration::from_secs(1), 1));
    assert!(s.should_stop(Duration::from_secs(1), 100));
    assert!(s.should_stop(Duration::from_secs(10), 1));
}

#[test]
fn test_from_config_and_deadline() {
    let s = Scheduler::from_config(&RunConfig::for_duration(3, Duration::from_secs(2)));
    let start = Instant::now();
    assert_eq!(s.deadline(start), Some(start + Duration::from_secs(2)));

    let s = Scheduler::new(None, Some(10));
    assert_eq!(s.deadline(start), None);
}

#[test]
fn test_max_duration_applies_only_without_duration() {
    let s = Scheduler::from_config(&RunConfig::for_iterations(3, 10).with_max_duration(Duration::from_secs(60)));
    let start = Instant::now();
    assert_eq!(s.deadline(start), Some(start + Duration::from_secs(60)));
    assert!(!s.should_stop(Duration::from_secs(59), 0));
    assert!(s.should_stop(Duration::from_secs(60), 0));

    let s = Scheduler::new(Some(Duration::from_secs(5)), None).with_max_duration(Duration::from_secs(60));
    assert_eq!(s.deadline(start), Some(start + Duration::from_secs(5)));
}

#[test]
fn test_deadline_beyond_instant_range_is_none() {
    let s = Scheduler::new(Some(Duration::MAX), Some(1));
    assert_eq!(s.deadline(Instant::now()), None);
    assert!(!s.should_stop(Duration::from_secs(3600), 0));
}

#[test]
fn test_try_claim_grants_exactly_the_iteration_target() {
    let s = Scheduler::new(None, Some(1_000));
    let counter = Arc::new(IterationCounter::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let counter = counter.clone();
            std::thread::spawn(move || {
                let mut granted = 0u64;
                while s.try_claim(&counter) {
                    granted += 1;
                }
                granted
            })
        })
        .collect();

    let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 1_000);
    assert_eq!(counter.claimed(), 1_000);
}

#[test]
fn test_try_claim_is_unbounded_without_iteration_target() {
    let s = Scheduler::new(Some(Duration::from_secs(1)), None);
    let counter = IterationCounter::default();
    for _ in 0..10_000 {
        assert!(s.try_claim(&counter));
    }
    assert_eq!(counter.claimed(), 10_000);
}

#[test]
fn test_complete_one_returns_running_total() {
    let counter = IterationCounter::default();
    assert_eq!(counter.complete_one(), 1);
    assert_eq!(counter.complete_one(), 2);
    assert_eq!(counter.completed(), 2);
}
