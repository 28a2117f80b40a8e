use std::boxed::Box;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::adapter::cache::{AbstractCacheStore, AbstractDistLock, AppCacheError, ReentrantCacheLock};
use crate::adapter::mq::{AbstractIntentQueue, AppQueueError, AppQueueErrorReason};
use crate::adapter::repository::{AbstractVoucherOrderRepo, AppRepoError};
use crate::constant::{cache_key, cache_ttl};
use crate::error::AppErrorCode;
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};
use crate::model::OrderIntent;

#[derive(Debug)]
pub enum OrderFulfillUcError {
    LockCache(AppCacheError),
    DataStore(AppRepoError),
}

impl From<AppCacheError> for OrderFulfillUcError {
    fn from(value: AppCacheError) -> Self {
        Self::LockCache(value)
    }
}

/// verdict of one delivered intent, every variant is final so the
/// delivery gets acknowledged either way
#[derive(Debug, PartialEq)]
pub enum FulfillOutcome {
    Persisted,
    // a redelivered or replayed intent whose order row already exists
    Duplicate,
    // the durable stock hit zero first, the conditional decrement
    // wrote nothing
    StockExhausted,
    // another worker currently holds the per-user lock, admission
    // guarantees that worker carries an intent of the same user
    LockContended,
}

/// Consumes granted reservations and turns them into durable order
/// rows. Safe under redelivery, the per-user lock plus the existence
/// re-check keep persistence idempotent.
pub struct OrderFulfillUseCase {
    pub cache_store: Arc<Box<dyn AbstractCacheStore>>,
    pub repo: Arc<Box<dyn AbstractVoucherOrderRepo>>,
    pub logctx: Arc<AppLogContext>,
}

impl OrderFulfillUseCase {
    pub async fn execute(&self, intent: OrderIntent) -> Result<FulfillOutcome, OrderFulfillUcError> {
        let lock_key = [cache_key::LOCK_ORDER, intent.usr_id.to_string().as_str()].concat();
        let mut lock = ReentrantCacheLock::new(
            self.cache_store.clone(),
            lock_key,
            Duration::from_secs(cache_ttl::ORDER_LOCK_SECS),
        );
        if !lock.try_acquire().await? {
            return Ok(FulfillOutcome::LockContended);
        }
        let out = self._persist_once(&intent).await;
        if let Err(e) = lock.release().await {
            let logctx = self.logctx.as_ref();
            app_log_event!(logctx, AppLogLevel::WARNING, "order: {}, {:?}", intent.order_id, e);
        }
        out
    }

    async fn _persist_once(&self, intent: &OrderIntent) -> Result<FulfillOutcome, OrderFulfillUcError> {
        let exists = self
            .repo
            .order_exists(intent.voucher_id, intent.usr_id)
            .await
            .map_err(OrderFulfillUcError::DataStore)?;
        if exists {
            return Ok(FulfillOutcome::Duplicate);
        }
        let order = intent.clone().into_order(Utc::now());
        match self.repo.create_order(&order).await {
            Ok(()) => Ok(FulfillOutcome::Persisted),
            Err(e) if matches!(e.code, AppErrorCode::PersistenceConflict) => {
                Ok(FulfillOutcome::StockExhausted)
            }
            Err(e) => Err(OrderFulfillUcError::DataStore(e)),
        }
    }
} // end of impl OrderFulfillUseCase

/// long-running consumer loop, returns only when the broker closes
/// the stream or subscription fails
pub async fn run_fulfillment_loop(
    uc: Arc<OrderFulfillUseCase>,
    queue: Arc<Box<dyn AbstractIntentQueue>>,
    logctx: Arc<AppLogContext>,
) -> Result<(), AppQueueError> {
    let mut stream = queue.subscribe().await?;
    loop {
        let mut delivery = match stream.receive().await {
            Ok(d) => d,
            // the malformed payload was logged and discarded inside
            // the adapter, keep consuming
            Err(AppQueueError {
                reason: AppQueueErrorReason::CorruptedPayload(_),
                ..
            }) => continue,
            Err(e) => return Err(e),
        };
        let intent = delivery.intent().clone();
        match uc.execute(intent.clone()).await {
            Ok(outcome) => {
                let lc = logctx.as_ref();
                app_log_event!(
                    lc,
                    AppLogLevel::DEBUG,
                    "order: {}, outcome: {:?}",
                    intent.order_id,
                    outcome
                );
            }
            Err(e) => {
                let lc = logctx.as_ref();
                app_log_event!(lc, AppLogLevel::ERROR, "order: {}, {:?}", intent.order_id, e);
                // fulfillment aborted before reaching a verdict, the
                // granted order is still pending so the intent goes
                // back to the broker for another attempt
                if let Err(qe) = delivery.nack().await {
                    app_log_event!(lc, AppLogLevel::WARNING, "order: {}, {:?}", intent.order_id, qe);
                }
                continue;
            }
        }
        // every fulfillment outcome is final, replaying the intent can
        // never flip it
        if let Err(e) = delivery.ack().await {
            let lc = logctx.as_ref();
            app_log_event!(lc, AppLogLevel::WARNING, "order: {}, {:?}", intent.order_id, e);
        }
    } // end of loop
} // end of fn run_fulfillment_loop
