use std::boxed::Box;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::cache::{AppCacheAside, AppCacheAsideError, AppCacheSourceError};
use crate::adapter::repository::AbstractVoucherOrderRepo;
use crate::constant::{cache_key, cache_ttl};
use crate::model::VoucherModel;

#[derive(Debug)]
pub enum VoucherLookupUcError {
    CacheAside(AppCacheAsideError),
}

impl From<AppCacheAsideError> for VoucherLookupUcError {
    fn from(value: AppCacheAsideError) -> Self {
        Self::CacheAside(value)
    }
}

/// Read path for voucher metadata outside the sale window, e.g.
/// browsing upcoming campaigns. Cold entries rebuild under a per-key
/// lock so an expired hot key cannot stampede the relational store.
pub struct VoucherLookupUseCase {
    pub cache_aside: Arc<AppCacheAside>,
    pub repo: Arc<Box<dyn AbstractVoucherOrderRepo>>,
}

impl VoucherLookupUseCase {
    pub async fn execute(
        &self,
        voucher_id: u64,
    ) -> Result<Option<VoucherModel>, VoucherLookupUcError> {
        let repo = self.repo.clone();
        let src_fetch = move || async move {
            repo.fetch_voucher(voucher_id)
                .await
                .map_err(|e| AppCacheSourceError(format!("{:?}", e)))
        };
        let found = self
            .cache_aside
            .fetch_mutex_rebuild(
                cache_key::VOUCHER_DETAIL,
                voucher_id.to_string().as_str(),
                Duration::from_secs(cache_ttl::ENTITY_SECS),
                src_fetch,
            )
            .await?;
        Ok(found)
    }
} // end of impl VoucherLookupUseCase
