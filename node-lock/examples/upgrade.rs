//! Read a node first, upgrade to write only when a change is needed.
//!
//! Two transactions read the same node. Both decide to write; only one
//! upgrade can be outstanding, so the second is rejected, drops its read
//! lock and retries from scratch once the first has committed.
//!
//! Run with: `cargo run --example upgrade`

use node_lock::{LockConfig, LockError, LockManager};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

fn main() {
    let locks: LockManager<&str> = LockManager::new(LockConfig::default());
    let balance = AtomicU64::new(100);
    let timeout = Duration::from_secs(1);

    thread::scope(|s| {
        for tx in ["tx-1", "tx-2"] {
            let (locks, balance) = (&locks, &balance);
            s.spawn(move || loop {
                locks.acquire_read("/accounts/alice", &tx, timeout).unwrap();
                let seen = balance.load(Ordering::SeqCst);
                println!("{tx}: read balance {seen}");
                thread::sleep(Duration::from_millis(20));

                match locks.acquire_write("/accounts/alice", &tx, timeout) {
                    Ok(_) => {
                        balance.store(seen + 10, Ordering::SeqCst);
                        println!("{tx}: upgraded, balance now {}", seen + 10);
                        locks.release("/accounts/alice", &tx);
                        break;
                    }
                    Err(e @ LockError::Upgrade(_)) => {
                        // The failed upgrade released the read lock.
                        println!("{tx}: {e}, retrying");
                    }
                    Err(e) => panic!("{tx}: {e}"),
                }
            });
        }
    });

    println!("final balance: {}", balance.load(Ordering::SeqCst));
    assert_eq!(balance.load(Ordering::SeqCst), 120);
}
