use std::time::Duration;

use tokio::time::sleep;

use flashsale::adapter::cache::{AbstractDistLock, ReentrantCacheLock, SimpleCacheLock};

use crate::ut_inmem_cache_store;

#[tokio::test]
async fn simple_lock_mutual_exclusion() {
    let store = ut_inmem_cache_store(64);
    let mut lock_a = SimpleCacheLock::new(store.clone(), "lock:ut:1".to_string(), Duration::from_secs(5));
    let mut lock_b = SimpleCacheLock::new(store.clone(), "lock:ut:1".to_string(), Duration::from_secs(5));
    assert!(lock_a.try_acquire().await.unwrap());
    assert!(!lock_b.try_acquire().await.unwrap());
    lock_a.release().await.unwrap();
    assert!(lock_b.try_acquire().await.unwrap());
}

#[tokio::test]
async fn simple_lock_release_only_own_token() {
    let store = ut_inmem_cache_store(64);
    let key = "lock:ut:2".to_string();
    let mut lock_a = SimpleCacheLock::new(store.clone(), key.clone(), Duration::from_millis(50));
    assert!(lock_a.try_acquire().await.unwrap());
    sleep(Duration::from_millis(90)).await;
    // entry expired, another holder takes over the same key
    let mut lock_b = SimpleCacheLock::new(store.clone(), key.clone(), Duration::from_secs(5));
    assert!(lock_b.try_acquire().await.unwrap());
    // the stale holder must not remove the new entry
    lock_a.release().await.unwrap();
    let mut lock_c = SimpleCacheLock::new(store.clone(), key, Duration::from_secs(5));
    assert!(!lock_c.try_acquire().await.unwrap());
}

#[tokio::test]
async fn reentrant_lock_nested_holds() {
    let store = ut_inmem_cache_store(64);
    let key = "lock:ut:3".to_string();
    let mut lock = ReentrantCacheLock::new(store.clone(), key.clone(), Duration::from_secs(5));
    assert!(lock.try_acquire().await.unwrap());
    assert!(lock.try_acquire().await.unwrap());
    assert_eq!(lock.num_holds(), 2);
    lock.release().await.unwrap();
    // still held after the inner release
    let mut other = ReentrantCacheLock::new(store.clone(), key.clone(), Duration::from_secs(5));
    assert!(!other.try_acquire().await.unwrap());
    lock.release().await.unwrap();
    assert_eq!(lock.num_holds(), 0);
    assert!(other.try_acquire().await.unwrap());
}

#[tokio::test]
async fn reentrant_lock_blocks_other_holder() {
    let store = ut_inmem_cache_store(64);
    let key = "lock:ut:4".to_string();
    let mut owner = ReentrantCacheLock::new(store.clone(), key.clone(), Duration::from_secs(5));
    let mut intruder = ReentrantCacheLock::new(store.clone(), key, Duration::from_secs(5));
    assert!(owner.try_acquire().await.unwrap());
    // a different holder instance never counts as reentrant
    assert!(!intruder.try_acquire().await.unwrap());
    owner.release().await.unwrap();
}

#[tokio::test]
async fn reentrant_lock_renews_while_held() {
    let store = ut_inmem_cache_store(64);
    let key = "lock:ut:5".to_string();
    let mut owner = ReentrantCacheLock::new(store.clone(), key.clone(), Duration::from_millis(120));
    assert!(owner.try_acquire().await.unwrap());
    // well past the original TTL, the renewal task keeps it alive
    sleep(Duration::from_millis(300)).await;
    let mut intruder = ReentrantCacheLock::new(store.clone(), key.clone(), Duration::from_secs(5));
    assert!(!intruder.try_acquire().await.unwrap());
    owner.release().await.unwrap();
    assert!(intruder.try_acquire().await.unwrap());
}

#[tokio::test]
async fn reentrant_lock_expires_without_renewal() {
    let store = ut_inmem_cache_store(64);
    let key = "lock:ut:6".to_string();
    {
        let mut owner =
            ReentrantCacheLock::new(store.clone(), key.clone(), Duration::from_millis(80));
        assert!(owner.try_acquire().await.unwrap());
        // dropped without release, the renewal task must stop
    }
    sleep(Duration::from_millis(160)).await;
    let mut next = ReentrantCacheLock::new(store.clone(), key, Duration::from_secs(5));
    assert!(next.try_acquire().await.unwrap());
}

#[tokio::test]
async fn release_without_hold_is_noop() {
    let store = ut_inmem_cache_store(64);
    let mut lock = ReentrantCacheLock::new(store.clone(), "lock:ut:7".to_string(), Duration::from_secs(5));
    lock.release().await.unwrap();
    assert!(lock.try_acquire().await.unwrap());
    lock.release().await.unwrap();
}
