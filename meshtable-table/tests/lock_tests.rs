use meshtable_table::{GlobalLocks, LockKey};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn holders_of_one_key_never_overlap() {
    let locks = Arc::new(GlobalLocks::new());
    let key = LockKey::from("exclusive");
    let inside = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let locks = locks.clone();
        let key = key.clone();
        let inside = inside.clone();
        let overlaps = overlaps.clone();
        tasks.push(tokio::spawn(async move {
            locks
                .with_lock(&key, async {
                    if inside.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    inside.store(false, Ordering::SeqCst);
                })
                .await;
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn different_keys_do_not_block_each_other() {
    let locks = Arc::new(GlobalLocks::new());
    let key_a = LockKey::from("a");
    let key_b = LockKey::from("b");
    // A second key is free while the first is held.
    let held = locks.with_lock(&key_a, async {
        locks.with_lock(&key_b, async { 7 }).await
    });
    let out = tokio::time::timeout(Duration::from_secs(1), held)
        .await
        .expect("no deadlock");
    assert_eq!(out, 7);
}

#[tokio::test]
async fn the_lock_is_released_on_exit() {
    let locks = GlobalLocks::new();
    let key = LockKey::from("reuse");
    locks.with_lock(&key, async {}).await;
    // A second acquisition must not wait for a leaked guard.
    tokio::time::timeout(Duration::from_secs(1), locks.with_lock(&key, async {}))
        .await
        .expect("second acquisition");
}

#[test]
fn lock_keys_display_their_name() {
    let key = LockKey::from(String::from("users"));
    assert_eq!(key.as_str(), "users");
    assert_eq!(key.to_string(), "users");
}
