//! Send lock behavior under true concurrent access
//!
//! Each thread opens its own `SendLock` instance over the same directory,
//! the way independent monitor processes would.

use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use weft::sendlock::{SendLock, SendLockConfig};

fn lock_for(dir: &TempDir, cooldown: Duration, force_after: Duration) -> SendLock {
    SendLock::new(
        dir.path(),
        SendLockConfig {
            cooldown,
            force_release_after: force_after,
        },
    )
    .unwrap()
}

#[test]
#[serial]
fn test_mutual_exclusion_under_contention() {
    let dir = TempDir::new().unwrap();
    let holders_inside = AtomicUsize::new(0);
    let violation = AtomicBool::new(false);
    let successes = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for thread_id in 0..8 {
            let dir = &dir;
            let holders_inside = &holders_inside;
            let violation = &violation;
            let successes = &successes;
            scope.spawn(move || {
                let lock = lock_for(dir, Duration::ZERO, Duration::from_secs(300));
                let holder = format!("monitor-{thread_id}");
                for _ in 0..25 {
                    if lock.try_acquire(&holder).unwrap() {
                        if holders_inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            violation.store(true, Ordering::SeqCst);
                        }
                        std::thread::sleep(Duration::from_micros(200));
                        holders_inside.fetch_sub(1, Ordering::SeqCst);
                        assert!(lock.release(&holder).unwrap());
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert!(
        !violation.load(Ordering::SeqCst),
        "two holders were inside the critical section at once"
    );
    assert!(successes.load(Ordering::SeqCst) > 0);

    // Every acquisition across all instances was matched by a release.
    let observer = lock_for(&dir, Duration::ZERO, Duration::from_secs(300));
    let state = observer.state().unwrap();
    assert_eq!(state.holder, None);
    assert_eq!(state.metrics.acquisitions, state.metrics.releases);
    assert_eq!(
        state.metrics.acquisitions,
        successes.load(Ordering::SeqCst) as u64
    );
}

#[test]
fn test_cooldown_handover_between_instances() {
    let dir = TempDir::new().unwrap();
    let a = lock_for(&dir, Duration::from_millis(60), Duration::from_secs(300));
    let b = lock_for(&dir, Duration::from_millis(60), Duration::from_secs(300));

    assert!(a.try_acquire("a").unwrap());
    assert!(a.release("a").unwrap());

    // B observes the cooldown A opened.
    assert!(!b.try_acquire("b").unwrap());
    std::thread::sleep(Duration::from_millis(80));
    assert!(b.try_acquire("b").unwrap());

    let state = b.state().unwrap();
    assert_eq!(state.holder.as_deref(), Some("b"));
    assert_eq!(state.metrics.duplicates_blocked, 1);
}

#[test]
fn test_forced_release_across_instances() {
    let dir = TempDir::new().unwrap();
    let stale = lock_for(&dir, Duration::ZERO, Duration::from_millis(40));
    let fresh = lock_for(&dir, Duration::ZERO, Duration::from_millis(40));

    assert!(stale.try_acquire("leaked-holder").unwrap());
    std::thread::sleep(Duration::from_millis(60));

    assert!(fresh.try_acquire("rescuer").unwrap());
    let state = fresh.state().unwrap();
    assert_eq!(state.holder.as_deref(), Some("rescuer"));
    assert_eq!(state.metrics.forced_releases, 1);
}

#[test]
fn test_metrics_survive_process_restart() {
    let dir = TempDir::new().unwrap();
    {
        let lock = lock_for(&dir, Duration::ZERO, Duration::from_secs(300));
        assert!(lock.try_acquire("a").unwrap());
        assert!(lock.release("a").unwrap());
        assert!(lock.try_acquire("b").unwrap());
        assert!(!lock.try_acquire("c").unwrap());
        assert!(lock.release("b").unwrap());
    }

    // A brand-new instance (a later process) sees the same counters.
    let lock = lock_for(&dir, Duration::ZERO, Duration::from_secs(300));
    let metrics = lock.state().unwrap().metrics;
    assert_eq!(metrics.acquisitions, 2);
    assert_eq!(metrics.releases, 2);
    assert_eq!(metrics.duplicates_blocked, 1);
}
