//! Integration tests for the keyed lock registry
//!
//! Covers grant ordering, primitive recycling and cancellation as seen from
//! independent tasks.

use flight_cache::{CancellationToken, Error, LockRegistry};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

async fn wait_for_refs(registry: &LockRegistry, key: &str, refs: usize) {
    while registry.ref_count(key) != refs {
        tokio::task::yield_now().await;
    }
}

/// Spawn a waiter on `key` that records `id` once granted.
fn spawn_waiter(
    registry: &LockRegistry,
    key: &'static str,
    id: usize,
    order: &Arc<Mutex<Vec<usize>>>,
    cancel: Option<CancellationToken>,
) -> JoinHandle<Result<(), Error>> {
    let registry = registry.clone();
    let order = order.clone();
    tokio::spawn(async move {
        let token = match cancel {
            Some(cancel) => registry.acquire_with_cancel(key, &cancel).await?,
            None => registry.acquire(key).await?,
        };
        order.lock().expect("order lock poisoned").push(id);
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(token);
        Ok::<(), Error>(())
    })
}

/// Test 1: Waiters are granted in arrival order
#[tokio::test]
async fn test_fifo_grant_order() {
    let registry = LockRegistry::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let holder = registry.acquire("A").await.expect("Failed to acquire");

    let mut waiters = vec![];
    for id in 1..=8 {
        waiters.push(spawn_waiter(&registry, "A", id, &order, None));
        wait_for_refs(&registry, "A", id + 1).await;
    }

    drop(holder);
    for waiter in waiters {
        waiter.await.expect("Task failed").expect("Waiter failed");
    }

    assert_eq!(
        *order.lock().expect("order lock poisoned"),
        (1..=8).collect::<Vec<_>>()
    );
    assert_eq!(registry.active_keys(), 0);
}

/// Test 2: A canceled waiter leaves without disturbing the others
#[tokio::test]
async fn test_cancel_keeps_remaining_order() {
    let registry = LockRegistry::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let holder = registry.acquire("A").await.expect("Failed to acquire");
    let cancel = CancellationToken::new();

    let w1 = spawn_waiter(&registry, "A", 1, &order, None);
    wait_for_refs(&registry, "A", 2).await;
    let w2 = spawn_waiter(&registry, "A", 2, &order, Some(cancel.clone()));
    wait_for_refs(&registry, "A", 3).await;
    let w3 = spawn_waiter(&registry, "A", 3, &order, None);
    wait_for_refs(&registry, "A", 4).await;

    cancel.cancel();
    assert_eq!(
        w2.await.expect("Task failed"),
        Err(Error::AcquisitionCanceled("A".to_string()))
    );
    assert_eq!(registry.ref_count("A"), 3);

    drop(holder);
    w1.await.expect("Task failed").expect("Waiter failed");
    w3.await.expect("Task failed").expect("Waiter failed");

    assert_eq!(*order.lock().expect("order lock poisoned"), vec![1, 3]);
    assert_eq!(registry.active_keys(), 0);
}

/// Test 3: Retired primitives are reused oldest first
#[tokio::test]
async fn test_pool_reuse_is_fifo() {
    let registry = LockRegistry::new();
    let a = registry.acquire("A").await.expect("Failed to acquire");
    let b = registry.acquire("B").await.expect("Failed to acquire");
    let c = registry.acquire("C").await.expect("Failed to acquire");
    let (pa, pb, pc) = (
        a.primitive().clone(),
        b.primitive().clone(),
        c.primitive().clone(),
    );

    drop(a);
    drop(b);
    drop(c);
    assert_eq!(registry.idle_primitives(), 3);

    let d = registry.acquire("D").await.expect("Failed to acquire");
    assert!(Arc::ptr_eq(d.primitive(), &pa));
    let e = registry.acquire("E").await.expect("Failed to acquire");
    assert!(Arc::ptr_eq(e.primitive(), &pb));
    let f = registry.acquire("F").await.expect("Failed to acquire");
    assert!(Arc::ptr_eq(f.primitive(), &pc));
    assert_eq!(registry.idle_primitives(), 0);
}

/// Test 4: A held key blocks only itself
#[tokio::test]
async fn test_unrelated_keys_do_not_block() {
    let registry = LockRegistry::new();
    let _a = registry.acquire("A").await.expect("Failed to acquire");

    let b = tokio::time::timeout(Duration::from_secs(1), registry.acquire("B"))
        .await
        .expect("Unrelated key must not wait")
        .expect("Failed to acquire");
    assert!(b.is_held());
    assert_eq!(registry.active_keys(), 2);
}

/// Test 5: Many tasks hammering a few keys leave the registry empty
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contention_leaves_no_entries() {
    let registry = LockRegistry::with_max_idle(4);
    let counters = Arc::new(Mutex::new([0usize; 4]));

    let mut handles = vec![];
    for i in 0..64 {
        let registry = registry.clone();
        let counters = counters.clone();
        handles.push(tokio::spawn(async move {
            let slot = i % 4;
            let key = format!("key_{}", slot);
            let _token = registry.acquire(&key).await.expect("Failed to acquire");
            let current = counters.lock().expect("counters lock poisoned")[slot];
            tokio::task::yield_now().await;
            counters.lock().expect("counters lock poisoned")[slot] = current + 1;
        }));
    }

    for handle in handles {
        handle.await.expect("Task failed");
    }

    // Read-yield-write increments are lost without mutual exclusion.
    assert_eq!(*counters.lock().expect("counters lock poisoned"), [16; 4]);
    assert_eq!(registry.active_keys(), 0);
    assert!(registry.idle_primitives() <= 4);
}
