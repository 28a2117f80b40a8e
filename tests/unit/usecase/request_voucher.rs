use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use flashsale::adapter::cache::{AbstractCacheStore, AppIdWorker};
use flashsale::adapter::mq::{
    AbstractIntentDelivery, AbstractIntentQueue, AbstractIntentStream, AppMockIntentQueue,
};
use flashsale::constant::cache_key;
use flashsale::usecase::{
    CampaignSeedUseCase, VoucherRequestUcError, VoucherRequestUseCase,
};

use super::{ut_components, ut_live_voucher, ut_voucher_with_window, UtComponents};
use crate::ut_logctx;

fn ut_request_uc(components: &UtComponents) -> (Arc<VoucherRequestUseCase>, Arc<Box<dyn AbstractIntentQueue>>) {
    let queue: Arc<Box<dyn AbstractIntentQueue>> =
        Arc::new(Box::new(AppMockIntentQueue::build()));
    let uc = VoucherRequestUseCase {
        cache_store: components.cache_store.clone(),
        cache_aside: components.cache_aside.clone(),
        repo: components.repo.clone(),
        intent_queue: queue.clone(),
        id_worker: Arc::new(AppIdWorker::new(components.cache_store.clone())),
        logctx: ut_logctx(),
    };
    (Arc::new(uc), queue)
}

fn ut_seed_uc(components: &UtComponents) -> CampaignSeedUseCase {
    CampaignSeedUseCase {
        repo: components.repo.clone(),
        cache_store: components.cache_store.clone(),
        cache_aside: components.cache_aside.clone(),
    }
}

#[tokio::test]
async fn granted_request_publishes_intent() {
    let components = ut_components(64).await;
    ut_seed_uc(&components)
        .execute(ut_live_voucher(300, 3))
        .await
        .unwrap();
    let (uc, queue) = ut_request_uc(&components);
    let intent = uc.execute(29, 300).await.unwrap();
    assert_eq!(intent.voucher_id, 300);
    assert_eq!(intent.usr_id, 29);
    // the grant consumed one cached stock unit
    let stock_key = [cache_key::SECKILL_STOCK, "300"].concat();
    let remaining = components.cache_store.fetch(stock_key.as_str()).await.unwrap();
    assert_eq!(remaining.as_deref(), Some("2"));
    let mut stream = queue.subscribe().await.unwrap();
    let delivery = stream.receive().await.unwrap();
    assert_eq!(delivery.intent(), &intent);
}

#[tokio::test]
async fn unknown_voucher_rejected() {
    let components = ut_components(64).await;
    let (uc, _queue) = ut_request_uc(&components);
    let result = uc.execute(29, 301).await;
    assert!(matches!(result, Err(VoucherRequestUcError::VoucherNotExist)));
}

#[tokio::test]
async fn campaign_window_not_open_yet() {
    let components = ut_components(64).await;
    let now = Utc::now();
    let voucher = ut_voucher_with_window(
        302,
        5,
        now + ChronoDuration::minutes(30),
        now + ChronoDuration::minutes(60),
    );
    ut_seed_uc(&components).execute(voucher).await.unwrap();
    let (uc, _queue) = ut_request_uc(&components);
    let result = uc.execute(29, 302).await;
    assert!(matches!(
        result,
        Err(VoucherRequestUcError::CampaignNotStarted)
    ));
}

#[tokio::test]
async fn campaign_window_already_closed() {
    let components = ut_components(64).await;
    let now = Utc::now();
    let voucher = ut_voucher_with_window(
        303,
        5,
        now - ChronoDuration::minutes(60),
        now - ChronoDuration::minutes(30),
    );
    ut_seed_uc(&components).execute(voucher).await.unwrap();
    let (uc, _queue) = ut_request_uc(&components);
    let result = uc.execute(29, 303).await;
    assert!(matches!(result, Err(VoucherRequestUcError::CampaignEnded)));
}

#[tokio::test]
async fn exhausted_stock_rejected() {
    let components = ut_components(64).await;
    ut_seed_uc(&components)
        .execute(ut_live_voucher(304, 1))
        .await
        .unwrap();
    let (uc, _queue) = ut_request_uc(&components);
    let _granted = uc.execute(31, 304).await.unwrap();
    let result = uc.execute(32, 304).await;
    assert!(matches!(result, Err(VoucherRequestUcError::OutOfStock)));
}

#[tokio::test]
async fn repeated_request_same_user_rejected() {
    let components = ut_components(64).await;
    ut_seed_uc(&components)
        .execute(ut_live_voucher(305, 5))
        .await
        .unwrap();
    let (uc, _queue) = ut_request_uc(&components);
    let _granted = uc.execute(33, 305).await.unwrap();
    let result = uc.execute(33, 305).await;
    assert!(matches!(
        result,
        Err(VoucherRequestUcError::DuplicateRequest)
    ));
    // the rejected retry must not burn stock
    let stock_key = [cache_key::SECKILL_STOCK, "305"].concat();
    let remaining = components.cache_store.fetch(stock_key.as_str()).await.unwrap();
    assert_eq!(remaining.as_deref(), Some("4"));
}

#[tokio::test]
async fn single_unit_under_concurrent_requests() {
    let components = ut_components(64).await;
    ut_seed_uc(&components)
        .execute(ut_live_voucher(306, 1))
        .await
        .unwrap();
    let (uc, _queue) = ut_request_uc(&components);
    let mut handles = Vec::new();
    for n in 0..6u64 {
        let uc = uc.clone();
        handles.push(tokio::spawn(async move { uc.execute(40 + n, 306).await }));
    }
    let mut num_granted = 0u32;
    for h in handles {
        if h.await.unwrap().is_ok() {
            num_granted += 1;
        }
    }
    assert_eq!(num_granted, 1);
}
