use node_lock::{LockConfig, LockError, LockKind, StripedLockTable};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::thread;

/// Keys that all hash alike, whatever their value.
#[derive(Debug, Clone, Copy)]
struct Colliding(u32);

impl Hash for Colliding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        0u8.hash(state);
    }
}

#[test]
fn concurrency_rounds_up_to_power_of_two() {
    assert_eq!(StripedLockTable::new(20).unwrap().slot_count(), 32);
    assert_eq!(StripedLockTable::new(32).unwrap().slot_count(), 32);
    assert_eq!(StripedLockTable::new(1).unwrap().slot_count(), 1);
    assert_eq!(StripedLockTable::default().slot_count(), 32);

    let config = LockConfig::default().with_concurrency(100);
    assert_eq!(StripedLockTable::from_config(&config).unwrap().slot_count(), 128);
}

#[test]
fn invalid_concurrency_is_rejected() {
    assert!(matches!(
        StripedLockTable::new(0),
        Err(LockError::InvalidArgument(_))
    ));
    assert!(StripedLockTable::new(node_lock::striped::MAX_CONCURRENCY + 1).is_err());
    let config = LockConfig::default().with_concurrency(0);
    assert!(StripedLockTable::from_config(&config).is_err());
}

#[test]
fn single_slot_table_maps_everything_to_zero() {
    let table = StripedLockTable::new(1).unwrap();
    assert_eq!(table.slot_index("/a"), 0);
    assert_eq!(table.slot_index("/b/c"), 0);
}

#[test]
fn sibling_names_spread_across_slots() {
    let table = StripedLockTable::new(32).unwrap();
    let slots: HashSet<usize> = (0..64)
        .map(|i| table.slot_index(format!("/a/b/{i}").as_str()))
        .collect();
    assert!(slots.len() >= 16, "only {} slots used", slots.len());
    assert!(slots.iter().all(|&slot| slot < 32));
}

#[test]
fn forced_collision_contends() {
    let table = StripedLockTable::new(20).unwrap();
    assert_eq!(table.slot_index(&Colliding(1)), table.slot_index(&Colliding(2)));

    table.acquire(&Colliding(1), true).unwrap();
    thread::scope(|s| {
        let other = s.spawn(|| table.try_acquire(&Colliding(2), false).unwrap());
        assert!(!other.join().unwrap());
    });

    assert!(table.release(&Colliding(1)));
    thread::scope(|s| {
        let other = s.spawn(|| {
            let granted = table.try_acquire(&Colliding(2), false).unwrap();
            table.release(&Colliding(2));
            granted
        });
        assert!(other.join().unwrap());
    });
}

#[test]
fn write_hold_is_reentrant() {
    let table = StripedLockTable::new(8).unwrap();
    table.acquire("/n", true).unwrap();
    table.acquire("/n", true).unwrap();
    table.acquire("/n", false).unwrap();
    assert!(table.is_write_held_by_current_thread("/n"));
    assert!(table.is_write_locked("/n"));

    assert!(table.release("/n"));
    assert!(table.release("/n"));
    assert!(table.is_held_by_current_thread("/n"));
    assert!(table.release("/n"));
    assert!(!table.is_held_by_current_thread("/n"));
    assert!(!table.is_locked("/n"));
}

#[test]
fn read_holds_are_shared_and_reentrant() {
    let table = StripedLockTable::new(8).unwrap();
    table.acquire("/n", false).unwrap();
    table.acquire("/n", false).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            assert!(!table.try_acquire("/n", true).unwrap());
            assert!(table.try_acquire("/n", false).unwrap());
            assert!(table.release("/n"));
        });
    });

    assert!(table.is_locked("/n"));
    assert!(!table.is_write_locked("/n"));
    assert!(table.release("/n"));
    assert!(table.release("/n"));
    assert!(!table.is_locked("/n"));
}

#[test]
fn write_after_read_on_same_slot_is_illegal() {
    let table = StripedLockTable::new(8).unwrap();
    table.acquire("/n", false).unwrap();

    let err = table.acquire("/n", true).unwrap_err();
    assert!(matches!(err, LockError::IllegalState(_)));
    assert!(matches!(
        table.try_acquire("/n", true),
        Err(LockError::IllegalState(_))
    ));

    // The read hold is untouched.
    assert!(table.is_held_by_current_thread("/n"));
    assert!(table.release("/n"));
}

#[test]
fn is_locked_sees_other_threads_without_blocking_their_readers() {
    let table = StripedLockTable::new(8).unwrap();
    assert!(!table.is_locked("/n"));

    let (held, done) = (std::sync::Barrier::new(2), std::sync::Barrier::new(2));
    thread::scope(|s| {
        s.spawn(|| {
            table.acquire("/n", false).unwrap();
            held.wait();
            done.wait();
            assert!(table.release("/n"));
        });

        held.wait();
        for _ in 0..100 {
            assert!(table.is_locked("/n"));
            assert!(!table.is_write_locked("/n"));
            // Shared holds keep working between checks.
            assert!(table.try_acquire("/n", false).unwrap());
            assert!(table.release("/n"));
        }
        done.wait();
    });

    assert!(!table.is_locked("/n"));
}

#[tokio::test]
async fn is_locked_sees_scoped_guards() {
    let table = StripedLockTable::new(8).unwrap();
    {
        let _read = table.read("/n").await;
        assert!(table.is_locked("/n"));
        assert!(table.try_read("/n").is_some());
    }
    {
        let _write = table.write("/n").await;
        assert!(table.is_locked("/n"));
    }
    assert!(!table.is_locked("/n"));
}

#[test]
fn stale_release_is_ignored() {
    let table = StripedLockTable::new(8).unwrap();
    assert!(!table.release("/never"));

    table.acquire("/n", true).unwrap();
    thread::scope(|s| {
        // Held by another thread.
        assert!(!s.spawn(|| table.release("/n")).join().unwrap());
    });
    assert!(table.is_write_locked("/n"));

    assert!(table.release("/n"));
    assert!(!table.release("/n"));
}

#[test]
fn acquire_all_and_release_all() {
    let table = StripedLockTable::new(16).unwrap();
    let ids = ["/a/1", "/a/2", "/b/1", "/a/1"];

    table.acquire_all(ids, true).unwrap();
    for id in ids {
        assert!(table.is_write_held_by_current_thread(id));
    }

    table.release_all(ids);
    for id in ids {
        assert!(!table.is_locked(id));
    }
    // Releasing again is harmless.
    table.release_all(ids);
}

#[test]
fn failed_acquire_all_rolls_back() {
    let table = StripedLockTable::new(32).unwrap();
    let read_key = (0..)
        .map(|i| format!("/r/{i}"))
        .find(|k| table.slot_index(k.as_str()) > 0)
        .unwrap();
    let read_slot = table.slot_index(read_key.as_str());
    let lower = (0..)
        .map(|i| format!("/l/{i}"))
        .find(|k| table.slot_index(k.as_str()) < read_slot)
        .unwrap();

    table.acquire(read_key.as_str(), false).unwrap();
    let err = table
        .acquire_all([read_key.as_str(), lower.as_str()], true)
        .unwrap_err();
    assert!(matches!(err, LockError::IllegalState(_)));

    assert!(!table.is_locked(lower.as_str()));
    assert!(table.is_held_by_current_thread(read_key.as_str()));
    assert!(table.release(read_key.as_str()));
}

// --- scoped async API ---

#[tokio::test]
async fn read_guards_share_a_slot() {
    let table = StripedLockTable::new(8).unwrap();
    let first = table.read("/n").await;
    let second = table.try_read("/n").expect("shared slot");
    assert_eq!(first.slot(), second.slot());
    assert_eq!(first.kind(), LockKind::Read);
    assert!(table.try_write("/n").is_none());
}

#[tokio::test]
async fn write_guard_excludes_and_releases_on_drop() {
    let table = StripedLockTable::new(8).unwrap();
    {
        let guard = table.write("/n").await;
        assert_eq!(guard.kind(), LockKind::Write);
        assert!(table.try_read("/n").is_none());
        assert!(table.is_write_locked("/n"));
    }
    assert!(table.try_write("/n").is_some());
}

#[tokio::test]
async fn downgraded_guard_admits_readers() {
    let table = StripedLockTable::new(8).unwrap();
    let guard = table.write("/n").await.downgrade();
    assert_eq!(guard.kind(), LockKind::Read);
    assert!(table.try_read("/n").is_some());
    assert!(table.try_write("/n").is_none());
}

#[tokio::test]
async fn lock_all_dedups_and_orders_slots() {
    let table = StripedLockTable::new(8).unwrap();
    let guards = table
        .lock_all([Colliding(1), Colliding(2), Colliding(3)], LockKind::Write)
        .await;
    assert_eq!(guards.len(), 1);
    drop(guards);

    let ids: Vec<String> = (0..32).map(|i| format!("/x/{i}")).collect();
    let guards = table.lock_all(&ids, LockKind::Read).await;
    assert!(guards.windows(2).all(|w| w[0].slot() < w[1].slot()));
    for id in &ids {
        assert!(table.try_write(id.as_str()).is_none());
    }
}

#[tokio::test]
async fn scoped_and_thread_holds_share_slots() {
    let table = StripedLockTable::new(8).unwrap();
    table.acquire("/n", true).unwrap();
    assert!(table.try_read("/n").is_none());
    assert!(table.release("/n"));
    assert!(table.try_read("/n").is_some());
}
