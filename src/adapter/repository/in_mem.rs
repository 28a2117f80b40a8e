use std::collections::HashMap;
use std::result::Result;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    AbstractVoucherOrderRepo, AppRepoError, AppRepoErrorDetail, AppRepoErrorFnLabel,
};
use crate::adapter::datastore::AppDataStoreContext;
use crate::constant::hard_limit;
use crate::error::AppErrorCode;
use crate::model::{VoucherModel, VoucherOrderModel};

struct InnerTables {
    vouchers: HashMap<u64, VoucherModel>,
    // keyed by (voucher_id, usr_id) so the one-order-per-user rule is
    // structural instead of checked
    orders: HashMap<(u64, u64), VoucherOrderModel>,
}

/// relational-store stand-in for development and tests, one coarse
/// mutex over both tables keeps the decrement-plus-insert step atomic
pub struct InMemVoucherOrderRepo {
    _max_items: u32,
    _tables: Mutex<InnerTables>,
}

impl InMemVoucherOrderRepo {
    pub fn build(dstore: &Arc<AppDataStoreContext>) -> Result<Self, AppRepoError> {
        let max_items = dstore
            .inmem_max_items()
            .unwrap_or(hard_limit::MAX_ITEMS_PER_INMEM_TABLE);
        Ok(Self {
            _max_items: max_items,
            _tables: Mutex::new(InnerTables {
                vouchers: HashMap::new(),
                orders: HashMap::new(),
            }),
        })
    }

    fn _lock(
        &self,
        fn_label: AppRepoErrorFnLabel,
    ) -> Result<MutexGuard<'_, InnerTables>, AppRepoError> {
        self._tables.lock().map_err(|e| AppRepoError {
            fn_label,
            code: AppErrorCode::AcquireLockFailure,
            detail: AppRepoErrorDetail::DataRowParse(e.to_string()),
        })
    }
} // end of impl InMemVoucherOrderRepo

#[async_trait]
impl AbstractVoucherOrderRepo for InMemVoucherOrderRepo {
    async fn fetch_voucher(&self, voucher_id: u64) -> Result<Option<VoucherModel>, AppRepoError> {
        let guard = self._lock(AppRepoErrorFnLabel::FetchVoucher)?;
        Ok(guard.vouchers.get(&voucher_id).cloned())
    }

    async fn save_voucher(&self, voucher: &VoucherModel) -> Result<(), AppRepoError> {
        let mut guard = self._lock(AppRepoErrorFnLabel::SaveVoucher)?;
        let num_used = guard.vouchers.len();
        if num_used >= (self._max_items as usize) && !guard.vouchers.contains_key(&voucher.voucher_id)
        {
            return Err(AppRepoError {
                fn_label: AppRepoErrorFnLabel::SaveVoucher,
                code: AppErrorCode::ExceedingMaxLimit,
                detail: AppRepoErrorDetail::Unknown,
            });
        }
        let _old = guard.vouchers.insert(voucher.voucher_id, voucher.clone());
        Ok(())
    }

    async fn order_exists(&self, voucher_id: u64, usr_id: u64) -> Result<bool, AppRepoError> {
        let guard = self._lock(AppRepoErrorFnLabel::OrderExists)?;
        Ok(guard.orders.contains_key(&(voucher_id, usr_id)))
    }

    async fn create_order(&self, order: &VoucherOrderModel) -> Result<(), AppRepoError> {
        let mut guard = self._lock(AppRepoErrorFnLabel::CreateOrder)?;
        if guard.orders.len() >= (self._max_items as usize) {
            return Err(AppRepoError {
                fn_label: AppRepoErrorFnLabel::CreateOrder,
                code: AppErrorCode::ExceedingMaxLimit,
                detail: AppRepoErrorDetail::Unknown,
            });
        }
        let remaining = guard
            .vouchers
            .get(&order.voucher_id)
            .map(|v| v.stock)
            .unwrap_or(0);
        if remaining == 0 {
            return Err(AppRepoError {
                fn_label: AppRepoErrorFnLabel::CreateOrder,
                code: AppErrorCode::PersistenceConflict,
                detail: AppRepoErrorDetail::Unknown,
            });
        }
        if let Some(v) = guard.vouchers.get_mut(&order.voucher_id) {
            v.stock -= 1;
        }
        let _old = guard
            .orders
            .insert((order.voucher_id, order.usr_id), order.clone());
        Ok(())
    } // end of fn create_order
} // end of impl AbstractVoucherOrderRepo
