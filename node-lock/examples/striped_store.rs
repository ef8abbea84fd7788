//! A key/value store guarded by a fixed table of striped locks.
//!
//! Keeping one lock per key would grow with the store. The striped table
//! caps lock memory at a power of two of slots; keys sharing a slot simply
//! contend with each other. Batches lock their slots in ascending order, so
//! transfers touching the same keys in opposite orders cannot deadlock.
//!
//! Run with: `cargo run --example striped_store`

use node_lock::{LockKind, StripedLockTable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct Store {
    locks: StripedLockTable,
    // The striped locks decide who may touch a key; the mutex only keeps
    // the map itself sound.
    data: Mutex<HashMap<String, i64>>,
}

impl Store {
    fn new() -> Self {
        Self {
            locks: StripedLockTable::new(16).unwrap(),
            data: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> i64 {
        self.data.lock().get(key).copied().unwrap_or(0)
    }

    fn set(&self, key: &str, value: i64) {
        self.data.lock().insert(key.to_owned(), value);
    }

    async fn deposit(&self, key: &str, amount: i64) {
        let _guard = self.locks.write(key).await;
        let current = self.get(key);
        tokio::task::yield_now().await;
        self.set(key, current + amount);
    }

    async fn transfer(&self, from: &str, to: &str, amount: i64) {
        let _guards = self.locks.lock_all([from, to], LockKind::Write).await;
        let (a, b) = (self.get(from), self.get(to));
        tokio::task::yield_now().await;
        self.set(from, a - amount);
        self.set(to, b + amount);
    }

    async fn total(&self, keys: &[&str]) -> i64 {
        let _guards = self.locks.lock_all(keys.iter(), LockKind::Read).await;
        keys.iter().map(|k| self.get(k)).sum()
    }
}

#[tokio::main]
async fn main() {
    let store = Arc::new(Store::new());
    let accounts = ["/acct/alice", "/acct/bob", "/acct/carol"];

    for account in accounts {
        store.deposit(account, 1_000).await;
        println!("{account} -> slot {}", store.locks.slot_index(account));
    }

    let mut handles = vec![];
    for i in 0..30 {
        let store = store.clone();
        let (from, to) = (accounts[i % 3], accounts[(i + 1) % 3]);
        // Alternate direction to exercise opposite lock orders.
        let (from, to) = if i % 2 == 0 { (from, to) } else { (to, from) };
        handles.push(tokio::spawn(async move {
            store.transfer(from, to, 10).await;
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let total = store.total(&accounts).await;
    for account in accounts {
        println!("{account}: {}", store.get(account));
    }
    println!("total: {total}");
    assert_eq!(total, 3_000);
}
