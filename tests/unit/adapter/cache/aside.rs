use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use flashsale::adapter::cache::{
    AbstractCacheStore, AbstractDistLock, AppCacheAside, AppCacheAsideError, AppCacheSourceError,
    SimpleCacheLock,
};
use flashsale::constant::cache_key;

use crate::{ut_inmem_cache_store, ut_logctx};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UtShopProfile {
    label: String,
    rating: u32,
}

fn ut_profile(rating: u32) -> UtShopProfile {
    UtShopProfile {
        label: "ut-shop".to_string(),
        rating,
    }
}

#[tokio::test]
async fn passthrough_source_hit_then_cached() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    let num_src_calls = Arc::new(AtomicU32::new(0));
    let ttl = Duration::from_secs(60);
    for expect_calls in [1u32, 1u32] {
        let cnt = num_src_calls.clone();
        let found = aside
            .fetch_passthrough::<UtShopProfile, _, _>("ut:shop:", "17", ttl, move || async move {
                let _ = cnt.fetch_add(1, Ordering::Relaxed);
                Ok(Some(ut_profile(4)))
            })
            .await
            .unwrap();
        assert_eq!(found, Some(ut_profile(4)));
        assert_eq!(num_src_calls.load(Ordering::Relaxed), expect_calls);
    }
}

#[tokio::test]
async fn passthrough_negative_caching() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    let num_src_calls = Arc::new(AtomicU32::new(0));
    let ttl = Duration::from_secs(60);
    for _round in 0..2 {
        let cnt = num_src_calls.clone();
        let found = aside
            .fetch_passthrough::<UtShopProfile, _, _>("ut:shop:", "404", ttl, move || async move {
                let _ = cnt.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            })
            .await
            .unwrap();
        assert!(found.is_none());
    }
    // the tombstone absorbed the second lookup
    assert_eq!(num_src_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn passthrough_source_failure_propagates() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    let result = aside
        .fetch_passthrough::<UtShopProfile, _, _>(
            "ut:shop:",
            "987",
            Duration::from_secs(60),
            || async { Err(AppCacheSourceError("db-gone".to_string())) },
        )
        .await;
    assert!(matches!(result, Err(AppCacheAsideError::Source(_))));
    // nothing cached, not even a tombstone
    assert!(store.fetch("ut:shop:987").await.unwrap().is_none());
}

#[tokio::test]
async fn mutex_rebuild_fills_missing_entry() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    let found = aside
        .fetch_mutex_rebuild::<UtShopProfile, _, _>(
            "ut:shop:",
            "71",
            Duration::from_secs(60),
            || async { Ok(Some(ut_profile(9))) },
        )
        .await
        .unwrap();
    assert_eq!(found, Some(ut_profile(9)));
    // rebuild lock released afterwards
    let lock_key = [cache_key::LOCK_REBUILD, "ut:shop:", "71"].concat();
    assert!(store.fetch(lock_key.as_str()).await.unwrap().is_none());
}

#[tokio::test]
async fn mutex_rebuild_gives_up_under_contention() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    let lock_key = [cache_key::LOCK_REBUILD, "ut:shop:", "72"].concat();
    let mut blocker = SimpleCacheLock::new(store.clone(), lock_key, Duration::from_secs(30));
    assert!(blocker.try_acquire().await.unwrap());
    let result = aside
        .fetch_mutex_rebuild::<UtShopProfile, _, _>(
            "ut:shop:",
            "72",
            Duration::from_secs(60),
            || async { Ok(Some(ut_profile(1))) },
        )
        .await;
    assert!(matches!(result, Err(AppCacheAsideError::RebuildContention)));
    blocker.release().await.unwrap();
}

#[tokio::test]
async fn mutex_rebuild_loser_reads_winner_entry() {
    let store = ut_inmem_cache_store(64);
    let aside = Arc::new(AppCacheAside::new(store.clone(), ut_logctx()));
    let num_src_calls = Arc::new(AtomicU32::new(0));
    let mut handles = Vec::new();
    for _n in 0..4u32 {
        let aside = aside.clone();
        let cnt = num_src_calls.clone();
        handles.push(tokio::spawn(async move {
            aside
                .fetch_mutex_rebuild::<UtShopProfile, _, _>(
                    "ut:shop:",
                    "73",
                    Duration::from_secs(60),
                    move || async move {
                        let _ = cnt.fetch_add(1, Ordering::Relaxed);
                        sleep(Duration::from_millis(20)).await;
                        Ok(Some(ut_profile(6)))
                    },
                )
                .await
        }));
    }
    for h in handles {
        let found = h.await.unwrap().unwrap();
        assert_eq!(found, Some(ut_profile(6)));
    }
    // only the lock winner reached the source
    assert_eq!(num_src_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn logical_expiry_fresh_entry_skips_source() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    aside
        .save_logical("ut:shop:", "81", &ut_profile(3), Duration::from_secs(600))
        .await
        .unwrap();
    let num_src_calls = Arc::new(AtomicU32::new(0));
    let cnt = num_src_calls.clone();
    let found = aside
        .fetch_logical_expiry::<UtShopProfile, _, _>(
            "ut:shop:",
            "81",
            Duration::from_secs(600),
            move || async move {
                let _ = cnt.fetch_add(1, Ordering::Relaxed);
                Ok(Some(ut_profile(99)))
            },
        )
        .await
        .unwrap();
    assert_eq!(found, Some(ut_profile(3)));
    assert_eq!(num_src_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn logical_expiry_unseeded_resolves_none() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    let found = aside
        .fetch_logical_expiry::<UtShopProfile, _, _>(
            "ut:shop:",
            "82",
            Duration::from_secs(600),
            || async { Ok(Some(ut_profile(1))) },
        )
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn logical_expiry_serves_stale_then_refreshes() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    // zero logical TTL, the entry is stale from the start
    aside
        .save_logical("ut:shop:", "83", &ut_profile(3), Duration::from_secs(0))
        .await
        .unwrap();
    let num_src_calls = Arc::new(AtomicU32::new(0));
    let cnt = num_src_calls.clone();
    let first = aside
        .fetch_logical_expiry::<UtShopProfile, _, _>(
            "ut:shop:",
            "83",
            Duration::from_secs(600),
            move || async move {
                let _ = cnt.fetch_add(1, Ordering::Relaxed);
                Ok(Some(ut_profile(8)))
            },
        )
        .await
        .unwrap();
    // stale data served immediately
    assert_eq!(first, Some(ut_profile(3)));
    sleep(Duration::from_millis(80)).await;
    assert_eq!(num_src_calls.load(Ordering::Relaxed), 1);
    let second = aside
        .fetch_logical_expiry::<UtShopProfile, _, _>(
            "ut:shop:",
            "83",
            Duration::from_secs(600),
            || async { Ok(Some(ut_profile(55))) },
        )
        .await
        .unwrap();
    // refreshed by the background task, the new source is not reached
    assert_eq!(second, Some(ut_profile(8)));
}

#[tokio::test]
async fn logical_expiry_source_failure_keeps_stale() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    aside
        .save_logical("ut:shop:", "84", &ut_profile(3), Duration::from_secs(0))
        .await
        .unwrap();
    let first = aside
        .fetch_logical_expiry::<UtShopProfile, _, _>(
            "ut:shop:",
            "84",
            Duration::from_secs(600),
            || async { Err(AppCacheSourceError("db-gone".to_string())) },
        )
        .await
        .unwrap();
    assert_eq!(first, Some(ut_profile(3)));
    sleep(Duration::from_millis(80)).await;
    // the failed refresh must not wipe the envelope
    let second = aside
        .fetch_logical_expiry::<UtShopProfile, _, _>(
            "ut:shop:",
            "84",
            Duration::from_secs(600),
            || async { Err(AppCacheSourceError("db-gone".to_string())) },
        )
        .await
        .unwrap();
    assert_eq!(second, Some(ut_profile(3)));
}

#[tokio::test]
async fn logical_expiry_deleted_at_source_drops_entry() {
    let store = ut_inmem_cache_store(64);
    let aside = AppCacheAside::new(store.clone(), ut_logctx());
    aside
        .save_logical("ut:shop:", "85", &ut_profile(3), Duration::from_secs(0))
        .await
        .unwrap();
    let first = aside
        .fetch_logical_expiry::<UtShopProfile, _, _>(
            "ut:shop:",
            "85",
            Duration::from_secs(600),
            || async { Ok(None) },
        )
        .await
        .unwrap();
    assert_eq!(first, Some(ut_profile(3)));
    sleep(Duration::from_millis(80)).await;
    let second = aside
        .fetch_logical_expiry::<UtShopProfile, _, _>(
            "ut:shop:",
            "85",
            Duration::from_secs(600),
            || async { Ok(None) },
        )
        .await
        .unwrap();
    assert!(second.is_none());
}
