mod in_mem;
mod mariadb;

use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;

use self::mariadb::MariadbVoucherOrderRepo;
use super::datastore::{AppDStoreError, AppDataStoreContext};
use crate::error::AppErrorCode;
use crate::model::{VoucherModel, VoucherOrderModel};

pub use in_mem::InMemVoucherOrderRepo;

#[derive(Debug)]
pub enum AppRepoErrorFnLabel {
    InitRepo,
    FetchVoucher,
    SaveVoucher,
    OrderExists,
    CreateOrder,
}

#[derive(Debug)]
pub enum AppRepoErrorDetail {
    DataStore(AppDStoreError),
    DatabaseTxStart(String),
    DatabaseTxCommit(String),
    DatabaseExec(String),
    DataRowParse(String),
    Unknown,
}

#[derive(Debug)]
pub struct AppRepoError {
    pub fn_label: AppRepoErrorFnLabel,
    pub code: AppErrorCode,
    pub detail: AppRepoErrorDetail,
}

// Note:
// As of rust v1.75 , the language does not support async trait method
// which returns `dyn Trait` type , so I still use crate `async-trait` at here

/// durable truth of campaigns and reservations in the relational store
#[async_trait]
pub trait AbstractVoucherOrderRepo: Sync + Send {
    async fn fetch_voucher(&self, voucher_id: u64) -> Result<Option<VoucherModel>, AppRepoError>;

    async fn save_voucher(&self, voucher: &VoucherModel) -> Result<(), AppRepoError>;

    async fn order_exists(&self, voucher_id: u64, usr_id: u64) -> Result<bool, AppRepoError>;

    /// conditional stock decrement plus order insert in one transaction,
    /// fails with `PersistenceConflict` and writes nothing when the
    /// durable stock already hit zero
    async fn create_order(&self, order: &VoucherOrderModel) -> Result<(), AppRepoError>;
} // end of trait AbstractVoucherOrderRepo

pub async fn app_repo_voucher_order(
    dstore: Arc<AppDataStoreContext>,
) -> Result<Box<dyn AbstractVoucherOrderRepo>, AppRepoError> {
    if dstore.mariadb().is_some() {
        let repo = MariadbVoucherOrderRepo::new(dstore).await?;
        Ok(Box::new(repo))
    } else {
        let repo = InMemVoucherOrderRepo::build(&dstore)?;
        Ok(Box::new(repo))
    }
}
