use std::boxed::Box;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::adapter::cache::{
    AbstractCacheStore, AppCacheAside, AppCacheAsideError, AppCacheError, AppCacheSourceError,
    AppIdWorker, ReserveOutcome,
};
use crate::adapter::mq::{AbstractIntentQueue, AppQueueError};
use crate::adapter::repository::AbstractVoucherOrderRepo;
use crate::constant::{cache_key, cache_ttl};
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};
use crate::model::{CampaignWindowError, OrderIntent, VoucherModel};

#[derive(Debug)]
pub enum VoucherRequestUcError {
    VoucherNotExist,
    CampaignNotStarted, // client error, the sale window has not opened yet
    CampaignEnded,
    OutOfStock,
    DuplicateRequest,
    CacheStore(AppCacheError),
    CacheAside(AppCacheAsideError),
    PublishIntent(AppQueueError),
}

impl From<AppCacheError> for VoucherRequestUcError {
    fn from(value: AppCacheError) -> Self {
        Self::CacheStore(value)
    }
}
impl From<AppCacheAsideError> for VoucherRequestUcError {
    fn from(value: AppCacheAsideError) -> Self {
        Self::CacheAside(value)
    }
}
impl From<AppQueueError> for VoucherRequestUcError {
    fn from(value: AppQueueError) -> Self {
        Self::PublishIntent(value)
    }
}
impl From<CampaignWindowError> for VoucherRequestUcError {
    fn from(value: CampaignWindowError) -> Self {
        match value {
            CampaignWindowError::NotStarted => Self::CampaignNotStarted,
            CampaignWindowError::Ended => Self::CampaignEnded,
        }
    }
}

/// Admission path of the flash sale. The verdict comes entirely from
/// the shared cache store, the relational store is only touched later
/// by fulfillment workers consuming the published intents.
pub struct VoucherRequestUseCase {
    pub cache_store: Arc<Box<dyn AbstractCacheStore>>,
    pub cache_aside: Arc<AppCacheAside>,
    pub repo: Arc<Box<dyn AbstractVoucherOrderRepo>>,
    pub intent_queue: Arc<Box<dyn AbstractIntentQueue>>,
    pub id_worker: Arc<AppIdWorker>,
    pub logctx: Arc<AppLogContext>,
}

impl VoucherRequestUseCase {
    pub async fn execute(
        &self,
        usr_id: u64,
        voucher_id: u64,
    ) -> Result<OrderIntent, VoucherRequestUcError> {
        let voucher = self.load_voucher(voucher_id).await?;
        voucher.check_campaign_window(Utc::now())?;
        let stock_key = [cache_key::SECKILL_STOCK, voucher_id.to_string().as_str()].concat();
        let buyers_key = [cache_key::SECKILL_BUYERS, voucher_id.to_string().as_str()].concat();
        let member = usr_id.to_string();
        let verdict = self
            .cache_store
            .reserve_once(stock_key.as_str(), buyers_key.as_str(), member.as_str())
            .await?;
        match verdict {
            ReserveOutcome::OutOfStock => return Err(VoucherRequestUcError::OutOfStock),
            ReserveOutcome::AlreadyReserved => {
                return Err(VoucherRequestUcError::DuplicateRequest)
            }
            ReserveOutcome::Granted => {}
        }
        let order_id = self.id_worker.next_id("order").await?;
        let intent = OrderIntent {
            order_id,
            voucher_id,
            usr_id,
        };
        // the grant is already durable in the cache store, a publish
        // failure here has to surface loudly for manual replay
        if let Err(e) = self.intent_queue.publish(intent.clone()).await {
            let logctx = self.logctx.as_ref();
            app_log_event!(
                logctx,
                AppLogLevel::ERROR,
                "unpublished-grant, order: {}, voucher: {}, usr: {}",
                intent.order_id,
                intent.voucher_id,
                intent.usr_id
            );
            return Err(VoucherRequestUcError::from(e));
        }
        Ok(intent)
    } // end of fn execute

    async fn load_voucher(
        &self,
        voucher_id: u64,
    ) -> Result<VoucherModel, VoucherRequestUcError> {
        let repo = self.repo.clone();
        let src_fetch = move || async move {
            repo.fetch_voucher(voucher_id)
                .await
                .map_err(|e| AppCacheSourceError(format!("{:?}", e)))
        };
        let result = self
            .cache_aside
            .fetch_logical_expiry(
                cache_key::VOUCHER_ENTITY,
                voucher_id.to_string().as_str(),
                Duration::from_secs(cache_ttl::ENTITY_SECS),
                src_fetch,
            )
            .await?;
        // campaigns are preloaded at seeding time, an absent envelope
        // means the voucher was never part of a flash sale
        result.ok_or(VoucherRequestUcError::VoucherNotExist)
    }
} // end of impl VoucherRequestUseCase
