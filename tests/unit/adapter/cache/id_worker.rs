use chrono::Utc;

use flashsale::adapter::cache::AppIdWorker;

use crate::ut_inmem_cache_store;

const UT_ID_EPOCH_SECS: i64 = 1_640_995_200;

#[tokio::test]
async fn ids_unique_and_increasing() {
    let store = ut_inmem_cache_store(64);
    let worker = AppIdWorker::new(store);
    let id0 = worker.next_id("order").await.unwrap();
    let id1 = worker.next_id("order").await.unwrap();
    let id2 = worker.next_id("order").await.unwrap();
    assert!(id0 < id1);
    assert!(id1 < id2);
}

#[tokio::test]
async fn id_layout_timestamp_and_sequence() {
    let store = ut_inmem_cache_store(64);
    let worker = AppIdWorker::new(store);
    let before = Utc::now().timestamp() - UT_ID_EPOCH_SECS;
    let id0 = worker.next_id("order").await.unwrap();
    let after = Utc::now().timestamp() - UT_ID_EPOCH_SECS;
    let ts_part = id0 >> 32;
    assert!(ts_part >= before);
    assert!(ts_part <= after);
    // fresh counter starts at 1
    assert_eq!(id0 & 0xffff_ffff, 1);
}

#[tokio::test]
async fn scopes_count_independently() {
    let store = ut_inmem_cache_store(64);
    let worker = AppIdWorker::new(store);
    let _ = worker.next_id("order").await.unwrap();
    let _ = worker.next_id("order").await.unwrap();
    let other = worker.next_id("refund").await.unwrap();
    assert_eq!(other & 0xffff_ffff, 1);
}

#[tokio::test]
async fn concurrent_ids_never_collide() {
    let store = ut_inmem_cache_store(64);
    let worker = std::sync::Arc::new(AppIdWorker::new(store));
    let mut handles = Vec::new();
    for _n in 0..16u32 {
        let w = worker.clone();
        handles.push(tokio::spawn(async move { w.next_id("order").await }));
    }
    let mut seen = std::collections::HashSet::new();
    for h in handles {
        let id_ = h.await.unwrap().unwrap();
        assert!(seen.insert(id_));
    }
}
