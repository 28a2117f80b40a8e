mod fulfill_order;
mod request_voucher;

use std::boxed::Box;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use flashsale::adapter::cache::{AbstractCacheStore, AppCacheAside};
use flashsale::adapter::repository::{
    app_repo_voucher_order, AbstractVoucherOrderRepo, AppRepoError, AppRepoErrorDetail,
    AppRepoErrorFnLabel,
};
use flashsale::error::AppErrorCode;
use flashsale::model::{VoucherModel, VoucherOrderModel};

use crate::{ut_inmem_cache_store, ut_inmem_dstore, ut_logctx};

pub(crate) struct UtComponents {
    pub cache_store: Arc<Box<dyn AbstractCacheStore>>,
    pub cache_aside: Arc<AppCacheAside>,
    pub repo: Arc<Box<dyn AbstractVoucherOrderRepo>>,
}

pub(crate) async fn ut_components(max_items: u32) -> UtComponents {
    let cache_store = ut_inmem_cache_store(max_items);
    let cache_aside = Arc::new(AppCacheAside::new(cache_store.clone(), ut_logctx()));
    let repo = app_repo_voucher_order(ut_inmem_dstore(max_items))
        .await
        .unwrap();
    UtComponents {
        cache_store,
        cache_aside,
        repo: Arc::new(repo),
    }
}

pub(crate) fn ut_voucher_with_window(
    voucher_id: u64,
    stock: u32,
    begin_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> VoucherModel {
    VoucherModel {
        voucher_id,
        stock,
        begin_time,
        end_time,
    }
}

/// campaign whose sale window is currently open
pub(crate) fn ut_live_voucher(voucher_id: u64, stock: u32) -> VoucherModel {
    let now = Utc::now();
    ut_voucher_with_window(
        voucher_id,
        stock,
        now - ChronoDuration::minutes(10),
        now + ChronoDuration::minutes(10),
    )
}

/// error-injecting stand-in, every slot is consumed on first call
pub(crate) struct MockVoucherOrderRepo {
    _fetch_voucher: Mutex<Option<Result<Option<VoucherModel>, AppRepoError>>>,
    _order_exists: Mutex<Option<Result<bool, AppRepoError>>>,
    _create_order: Mutex<Option<Result<(), AppRepoError>>>,
}

impl MockVoucherOrderRepo {
    pub(crate) fn build(
        fetch_voucher: Option<Result<Option<VoucherModel>, AppRepoError>>,
        order_exists: Option<Result<bool, AppRepoError>>,
        create_order: Option<Result<(), AppRepoError>>,
    ) -> Self {
        Self {
            _fetch_voucher: Mutex::new(fetch_voucher),
            _order_exists: Mutex::new(order_exists),
            _create_order: Mutex::new(create_order),
        }
    }

    pub(crate) fn ut_repo_error(fn_label: AppRepoErrorFnLabel) -> AppRepoError {
        AppRepoError {
            fn_label,
            code: AppErrorCode::RemoteDbServerFailure,
            detail: AppRepoErrorDetail::DatabaseExec("ut-injected".to_string()),
        }
    }
}

#[async_trait]
impl AbstractVoucherOrderRepo for MockVoucherOrderRepo {
    async fn fetch_voucher(&self, _voucher_id: u64) -> Result<Option<VoucherModel>, AppRepoError> {
        self._fetch_voucher.lock().unwrap().take().unwrap()
    }

    async fn save_voucher(&self, _voucher: &VoucherModel) -> Result<(), AppRepoError> {
        Ok(())
    }

    async fn order_exists(&self, _voucher_id: u64, _usr_id: u64) -> Result<bool, AppRepoError> {
        self._order_exists.lock().unwrap().take().unwrap()
    }

    async fn create_order(&self, _order: &VoucherOrderModel) -> Result<(), AppRepoError> {
        self._create_order.lock().unwrap().take().unwrap()
    }
} // end of impl MockVoucherOrderRepo
