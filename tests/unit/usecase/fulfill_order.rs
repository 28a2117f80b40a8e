use std::boxed::Box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use flashsale::adapter::cache::{AbstractDistLock, ReentrantCacheLock};
use flashsale::adapter::mq::{AbstractIntentQueue, AppMockIntentQueue};
use flashsale::adapter::repository::{AbstractVoucherOrderRepo, AppRepoError, AppRepoErrorFnLabel};
use flashsale::constant::cache_key;
use flashsale::model::{OrderIntent, VoucherModel, VoucherOrderModel};
use flashsale::usecase::{
    run_fulfillment_loop, FulfillOutcome, OrderFulfillUcError, OrderFulfillUseCase,
};

use super::{ut_components, ut_live_voucher, MockVoucherOrderRepo, UtComponents};
use crate::ut_logctx;

fn ut_fulfill_uc(components: &UtComponents) -> Arc<OrderFulfillUseCase> {
    Arc::new(OrderFulfillUseCase {
        cache_store: components.cache_store.clone(),
        repo: components.repo.clone(),
        logctx: ut_logctx(),
    })
}

fn ut_intent(order_id: i64, voucher_id: u64, usr_id: u64) -> OrderIntent {
    OrderIntent {
        order_id,
        voucher_id,
        usr_id,
    }
}

#[tokio::test]
async fn intent_persisted_and_stock_decremented() {
    let components = ut_components(64).await;
    components
        .repo
        .save_voucher(&ut_live_voucher(400, 2))
        .await
        .unwrap();
    let uc = ut_fulfill_uc(&components);
    let outcome = uc.execute(ut_intent(7001, 400, 61)).await.unwrap();
    assert_eq!(outcome, FulfillOutcome::Persisted);
    assert!(components.repo.order_exists(400, 61).await.unwrap());
    let voucher = components.repo.fetch_voucher(400).await.unwrap().unwrap();
    assert_eq!(voucher.stock, 1);
}

#[tokio::test]
async fn redelivered_intent_is_duplicate() {
    let components = ut_components(64).await;
    components
        .repo
        .save_voucher(&ut_live_voucher(401, 2))
        .await
        .unwrap();
    let uc = ut_fulfill_uc(&components);
    let intent = ut_intent(7002, 401, 62);
    let first = uc.execute(intent.clone()).await.unwrap();
    assert_eq!(first, FulfillOutcome::Persisted);
    let second = uc.execute(intent).await.unwrap();
    assert_eq!(second, FulfillOutcome::Duplicate);
    // the replay must not touch stock again
    let voucher = components.repo.fetch_voucher(401).await.unwrap().unwrap();
    assert_eq!(voucher.stock, 1);
}

#[tokio::test]
async fn durable_stock_exhausted_writes_nothing() {
    let components = ut_components(64).await;
    components
        .repo
        .save_voucher(&ut_live_voucher(402, 0))
        .await
        .unwrap();
    let uc = ut_fulfill_uc(&components);
    let outcome = uc.execute(ut_intent(7003, 402, 63)).await.unwrap();
    assert_eq!(outcome, FulfillOutcome::StockExhausted);
    assert!(!components.repo.order_exists(402, 63).await.unwrap());
}

#[tokio::test]
async fn per_user_lock_contention() {
    let components = ut_components(64).await;
    components
        .repo
        .save_voucher(&ut_live_voucher(403, 2))
        .await
        .unwrap();
    let lock_key = [cache_key::LOCK_ORDER, "64"].concat();
    let mut holder = ReentrantCacheLock::new(
        components.cache_store.clone(),
        lock_key,
        Duration::from_secs(30),
    );
    assert!(holder.try_acquire().await.unwrap());
    let uc = ut_fulfill_uc(&components);
    let outcome = uc.execute(ut_intent(7004, 403, 64)).await.unwrap();
    assert_eq!(outcome, FulfillOutcome::LockContended);
    assert!(!components.repo.order_exists(403, 64).await.unwrap());
    holder.release().await.unwrap();
    // retried after the other worker finished
    let outcome = uc.execute(ut_intent(7004, 403, 64)).await.unwrap();
    assert_eq!(outcome, FulfillOutcome::Persisted);
}

#[tokio::test]
async fn repo_failure_propagates_and_releases_lock() {
    let components = ut_components(64).await;
    let failing_repo: Arc<Box<dyn AbstractVoucherOrderRepo>> =
        Arc::new(Box::new(MockVoucherOrderRepo::build(
            None,
            Some(Err(MockVoucherOrderRepo::ut_repo_error(
                AppRepoErrorFnLabel::OrderExists,
            ))),
            None,
        )));
    let uc = OrderFulfillUseCase {
        cache_store: components.cache_store.clone(),
        repo: failing_repo,
        logctx: ut_logctx(),
    };
    let result = uc.execute(ut_intent(7005, 404, 65)).await;
    assert!(matches!(result, Err(OrderFulfillUcError::DataStore(_))));
    // the per-user lock must not stay held after the failure
    let lock_key = [cache_key::LOCK_ORDER, "65"].concat();
    let mut follower = ReentrantCacheLock::new(
        components.cache_store.clone(),
        lock_key,
        Duration::from_secs(30),
    );
    assert!(follower.try_acquire().await.unwrap());
    follower.release().await.unwrap();
}

/// fails the first existence check then behaves like the wrapped repo
struct UtRecoveringRepo {
    _inner: Arc<Box<dyn AbstractVoucherOrderRepo>>,
    _fail_once: AtomicBool,
}

#[async_trait]
impl AbstractVoucherOrderRepo for UtRecoveringRepo {
    async fn fetch_voucher(&self, voucher_id: u64) -> Result<Option<VoucherModel>, AppRepoError> {
        self._inner.fetch_voucher(voucher_id).await
    }

    async fn save_voucher(&self, voucher: &VoucherModel) -> Result<(), AppRepoError> {
        self._inner.save_voucher(voucher).await
    }

    async fn order_exists(&self, voucher_id: u64, usr_id: u64) -> Result<bool, AppRepoError> {
        if self._fail_once.swap(false, Ordering::Relaxed) {
            return Err(MockVoucherOrderRepo::ut_repo_error(
                AppRepoErrorFnLabel::OrderExists,
            ));
        }
        self._inner.order_exists(voucher_id, usr_id).await
    }

    async fn create_order(&self, order: &VoucherOrderModel) -> Result<(), AppRepoError> {
        self._inner.create_order(order).await
    }
} // end of impl UtRecoveringRepo

#[tokio::test]
async fn consumer_loop_retains_intent_on_transient_failure() {
    let components = ut_components(64).await;
    components
        .repo
        .save_voucher(&ut_live_voucher(406, 1))
        .await
        .unwrap();
    let recovering: Arc<Box<dyn AbstractVoucherOrderRepo>> =
        Arc::new(Box::new(UtRecoveringRepo {
            _inner: components.repo.clone(),
            _fail_once: AtomicBool::new(true),
        }));
    let uc = Arc::new(OrderFulfillUseCase {
        cache_store: components.cache_store.clone(),
        repo: recovering,
        logctx: ut_logctx(),
    });
    let mock_queue = AppMockIntentQueue::build();
    let num_acked = mock_queue.ack_counter();
    mock_queue.publish(ut_intent(7008, 406, 68)).await.unwrap();
    let queue: Arc<Box<dyn AbstractIntentQueue>> = Arc::new(Box::new(mock_queue));
    let handle = tokio::spawn(run_fulfillment_loop(uc, queue, ut_logctx()));
    sleep(Duration::from_millis(100)).await;
    // the failed attempt must not consume the delivery, the requeued
    // intent lands as a durable order on the next attempt
    assert!(components.repo.order_exists(406, 68).await.unwrap());
    let voucher = components.repo.fetch_voucher(406).await.unwrap().unwrap();
    assert_eq!(voucher.stock, 0);
    // only the attempt reaching a verdict acknowledged its delivery
    assert_eq!(num_acked.load(Ordering::Relaxed), 1);
    handle.abort();
}

#[tokio::test]
async fn consumer_loop_acks_every_delivery() {
    let components = ut_components(64).await;
    components
        .repo
        .save_voucher(&ut_live_voucher(405, 5))
        .await
        .unwrap();
    let mock_queue = AppMockIntentQueue::build();
    let num_acked = mock_queue.ack_counter();
    mock_queue.publish(ut_intent(7006, 405, 66)).await.unwrap();
    mock_queue.publish(ut_intent(7007, 405, 67)).await.unwrap();
    // redelivery of the first intent
    mock_queue.publish(ut_intent(7006, 405, 66)).await.unwrap();
    let queue: Arc<Box<dyn AbstractIntentQueue>> = Arc::new(Box::new(mock_queue));
    let uc = ut_fulfill_uc(&components);
    let handle = tokio::spawn(run_fulfillment_loop(uc, queue, ut_logctx()));
    sleep(Duration::from_millis(100)).await;
    assert_eq!(num_acked.load(Ordering::Relaxed), 3);
    assert!(components.repo.order_exists(405, 66).await.unwrap());
    assert!(components.repo.order_exists(405, 67).await.unwrap());
    // the duplicate consumed exactly one stock unit
    let voucher = components.repo.fetch_voucher(405).await.unwrap().unwrap();
    assert_eq!(voucher.stock, 3);
    handle.abort();
}
