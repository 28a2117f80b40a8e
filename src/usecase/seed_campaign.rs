use std::boxed::Box;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::cache::{AbstractCacheStore, AppCacheAside, AppCacheAsideError, AppCacheError};
use crate::adapter::repository::{AbstractVoucherOrderRepo, AppRepoError};
use crate::constant::{cache_key, cache_ttl};
use crate::model::VoucherModel;

#[derive(Debug)]
pub enum CampaignSeedUcError {
    // end time not after begin time
    InvalidWindow,
    DataStore(AppRepoError),
    CacheStore(AppCacheError),
    CacheAside(AppCacheAsideError),
}

impl From<AppRepoError> for CampaignSeedUcError {
    fn from(value: AppRepoError) -> Self {
        Self::DataStore(value)
    }
}
impl From<AppCacheError> for CampaignSeedUcError {
    fn from(value: AppCacheError) -> Self {
        Self::CacheStore(value)
    }
}
impl From<AppCacheAsideError> for CampaignSeedUcError {
    fn from(value: AppCacheAsideError) -> Self {
        Self::CacheAside(value)
    }
}

/// Registers one flash-sale campaign, writing the durable row first
/// then preloading the cache store with the entity envelope and the
/// reservation ticket the admission script consumes.
pub struct CampaignSeedUseCase {
    pub repo: Arc<Box<dyn AbstractVoucherOrderRepo>>,
    pub cache_store: Arc<Box<dyn AbstractCacheStore>>,
    pub cache_aside: Arc<AppCacheAside>,
}

impl CampaignSeedUseCase {
    pub async fn execute(&self, voucher: VoucherModel) -> Result<(), CampaignSeedUcError> {
        if voucher.end_time <= voucher.begin_time {
            return Err(CampaignSeedUcError::InvalidWindow);
        }
        self.repo.save_voucher(&voucher).await?;
        let id_serial = voucher.voucher_id.to_string();
        self.cache_aside
            .save_logical(
                cache_key::VOUCHER_ENTITY,
                id_serial.as_str(),
                &voucher,
                Duration::from_secs(cache_ttl::ENTITY_SECS),
            )
            .await?;
        let stock_key = [cache_key::SECKILL_STOCK, id_serial.as_str()].concat();
        // no physical TTL, the ticket must outlive the whole campaign
        self.cache_store
            .save(stock_key.as_str(), voucher.stock.to_string().as_str(), None)
            .await?;
        // a fresh round must not inherit buyers recorded by an earlier
        // round of the same voucher
        let buyers_key = [cache_key::SECKILL_BUYERS, id_serial.as_str()].concat();
        self.cache_store.delete(buyers_key.as_str()).await?;
        Ok(())
    } // end of fn execute
} // end of impl CampaignSeedUseCase
