use node_lock::{IsolationLevel, LockConfig, LockError, LockKind, LockManager, LockType};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SHORT: Duration = Duration::from_millis(50);

fn manager(isolation: IsolationLevel) -> LockManager<String> {
    LockManager::new(
        LockConfig::default()
            .with_isolation(isolation)
            .with_lock_timeout(SHORT),
    )
}

fn owner(name: &str) -> String {
    name.to_owned()
}

#[test]
fn locks_are_created_lazily_and_shared() {
    let locks = manager(IsolationLevel::RepeatableRead);
    assert!(locks.is_empty());
    assert!(locks.lock_status("/a").is_none());
    assert!(!locks.is_locked("/a"));

    let first = locks.lock_for("/a");
    let second = locks.lock_for("/a");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.resource(), "/a");
    assert_eq!(locks.len(), 1);
}

#[test]
fn read_blocked_write_then_upgrade() {
    let locks = manager(IsolationLevel::RepeatableRead);
    let (a, b) = (owner("A"), owner("B"));

    assert!(locks.acquire_read("/x", &a, SHORT).unwrap());
    assert!(matches!(
        locks.acquire_write("/x", &b, SHORT),
        Err(LockError::Timeout { kind: LockKind::Write, .. })
    ));

    assert!(locks.acquire_write("/x", &a, SHORT).unwrap());
    locks.release("/x", &a);
    assert!(locks.acquire_write("/x", &b, SHORT).unwrap());

    let status = locks.lock_status("/x").unwrap();
    assert_eq!(status.writer.as_deref(), Some("B"));
    assert!(status.is_write_locked());
    assert!(!status.is_read_locked());
}

#[test]
fn acquire_uses_configured_timeout() {
    let locks = manager(IsolationLevel::RepeatableRead);
    assert!(locks.acquire("/x", &owner("A"), LockKind::Write).unwrap());

    let start = Instant::now();
    let err = locks.acquire("/x", &owner("B"), LockKind::Read).unwrap_err();
    assert!(start.elapsed() >= SHORT);
    assert!(matches!(err, LockError::Timeout { timeout, .. } if timeout == SHORT));
}

#[test]
fn isolation_level_applies_to_every_resource() {
    let locks = manager(IsolationLevel::Serializable);
    assert!(locks.acquire_read("/a", &owner("A"), SHORT).unwrap());
    assert!(locks.acquire_read("/a", &owner("B"), SHORT).is_err());
    assert!(locks.acquire_read("/b", &owner("B"), SHORT).unwrap());
    assert_eq!(locks.config().isolation, IsolationLevel::Serializable);
}

#[test]
fn release_owned_covers_all_resources() {
    let locks = manager(IsolationLevel::RepeatableRead);
    let (a, b) = (owner("A"), owner("B"));
    assert!(locks.acquire_read("/a", &a, SHORT).unwrap());
    assert!(locks.acquire_write("/b", &a, SHORT).unwrap());
    assert!(locks.acquire_read("/a", &b, SHORT).unwrap());

    assert_eq!(locks.release_owned(&a), 2);
    assert_eq!(locks.release_owned(&a), 0);
    assert!(!locks.is_locked("/b"));
    assert!(locks.lock_for("/a").is_owner(&b, LockType::Read));
}

#[test]
fn release_all_and_unknown_resources() {
    let locks = manager(IsolationLevel::RepeatableRead);
    assert!(locks.acquire_read("/a", &owner("A"), SHORT).unwrap());
    assert!(locks.acquire_read("/a", &owner("B"), SHORT).unwrap());

    locks.release_all("/a");
    assert!(!locks.is_locked("/a"));

    // Unknown resources are not created by releases or queries.
    locks.release("/nowhere", &owner("A"));
    locks.release_all("/nowhere");
    locks.interrupt_waiters("/nowhere");
    assert_eq!(locks.len(), 1);
}

#[test]
fn purge_keeps_busy_and_referenced_locks() {
    let locks = manager(IsolationLevel::RepeatableRead);
    assert!(locks.acquire_read("/held", &owner("A"), SHORT).unwrap());
    let referenced = locks.lock_for("/referenced");
    locks.lock_for("/idle");

    assert_eq!(locks.purge_idle(), 1);
    assert_eq!(locks.len(), 2);

    drop(referenced);
    locks.release("/held", &owner("A"));
    assert_eq!(locks.purge_idle(), 2);
    assert!(locks.is_empty());
}

#[test]
fn interrupt_waiters_reaches_blocked_owner() {
    let locks = Arc::new(LockManager::<String>::new(LockConfig::default()));
    assert!(locks.acquire_write("/x", &owner("A"), SHORT).unwrap());

    let waiter = {
        let locks = locks.clone();
        thread::spawn(move || locks.acquire_read("/x", &owner("B"), Duration::from_secs(30)))
    };
    let lock = locks.lock_for("/x");
    while lock.engine_stats().waiting_readers == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    locks.interrupt_waiters("/x");
    assert_eq!(waiter.join().unwrap(), Err(LockError::Interrupted));
    assert_eq!(lock.writer().as_deref(), Some("A"));
}
