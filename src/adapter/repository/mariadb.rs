use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};
use mysql_async::prelude::Queryable;
use mysql_async::{IsolationLevel, Params, TxOpts};

use super::{
    AbstractVoucherOrderRepo, AppRepoError, AppRepoErrorDetail, AppRepoErrorFnLabel,
};
use crate::adapter::datastore::{AppDStoreMariaDB, AppDataStoreContext};
use crate::error::AppErrorCode;
use crate::logging::{app_log_event, AppLogLevel};
use crate::model::{VoucherModel, VoucherOrderModel};

const DATETIME_FMT_P0F: &str = "%Y-%m-%d %H:%M:%S";

#[allow(non_snake_case)]
fn raw_column_to_datetime(
    val: mysql_async::Value,
    subsec_precision: u16,
) -> Result<DateTime<Utc>, (AppErrorCode, AppRepoErrorDetail)> {
    let result = if let mysql_async::Value::Date(Y, M, D, h, m, s, us) = val {
        let res_d = NaiveDate::from_ymd_opt(Y as i32, M as u32, D as u32).ok_or("date-parse-fail");
        let res_t = NaiveTime::from_hms_micro_opt(h as u32, m as u32, s as u32, us)
            .ok_or("time-parse-fail");
        match (res_d, res_t) {
            (Ok(d), Ok(t)) => Ok(NaiveDateTime::new(d, t)
                .and_utc()
                .trunc_subsecs(subsec_precision)),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    } else {
        Err("datetime-unknown-value-type")
    };
    result.map_err(|msg| {
        (
            AppErrorCode::DataCorruption,
            AppRepoErrorDetail::DataRowParse(msg.to_string()),
        )
    })
}

struct FetchVoucherArgs(String, Params);
struct UpsertVoucherArgs(String, Params);
struct OrderExistArgs(String, Params);
struct DecrStockArgs(String, Params);
struct InsertOrderArgs(String, Params);

impl From<u64> for FetchVoucherArgs {
    fn from(voucher_id: u64) -> Self {
        let arg = vec![voucher_id.into()];
        let stmt = "SELECT `stock`,`begin_time`,`end_time` FROM `voucher_campaign` \
            WHERE `voucher_id`=?";
        Self(stmt.to_string(), Params::Positional(arg))
    }
}
impl<'a> From<&'a VoucherModel> for UpsertVoucherArgs {
    fn from(voucher: &'a VoucherModel) -> Self {
        let t0 = voucher.begin_time.format(DATETIME_FMT_P0F).to_string();
        let t1 = voucher.end_time.format(DATETIME_FMT_P0F).to_string();
        let arg = vec![
            voucher.voucher_id.into(),
            voucher.stock.into(),
            t0.as_str().into(),
            t1.as_str().into(),
            voucher.stock.into(),
            t0.into(),
            t1.into(),
        ];
        let stmt = "INSERT INTO `voucher_campaign`(`voucher_id`,`stock`,`begin_time`, \
            `end_time`) VALUES (?,?,?,?) ON DUPLICATE KEY UPDATE `stock`=?, \
            `begin_time`=?, `end_time`=?";
        Self(stmt.to_string(), Params::Positional(arg))
    }
}
impl From<(u64, u64)> for OrderExistArgs {
    fn from(value: (u64, u64)) -> Self {
        let (voucher_id, usr_id) = value;
        let arg = vec![voucher_id.into(), usr_id.into()];
        let stmt = "SELECT COUNT(`order_id`) FROM `voucher_order` WHERE `voucher_id`=? \
            AND `usr_id`=?";
        Self(stmt.to_string(), Params::Positional(arg))
    }
}
impl From<u64> for DecrStockArgs {
    fn from(voucher_id: u64) -> Self {
        let arg = vec![voucher_id.into()];
        // the predicate makes over-selling impossible even when the
        // cache-side admission was somehow bypassed
        let stmt = "UPDATE `voucher_campaign` SET `stock`=`stock`-1 \
            WHERE `voucher_id`=? AND `stock` > 0";
        Self(stmt.to_string(), Params::Positional(arg))
    }
}
impl<'a> From<&'a VoucherOrderModel> for InsertOrderArgs {
    fn from(order: &'a VoucherOrderModel) -> Self {
        let arg = vec![
            order.order_id.into(),
            order.voucher_id.into(),
            order.usr_id.into(),
            order.create_time.format(DATETIME_FMT_P0F).to_string().into(),
        ];
        let stmt = "INSERT INTO `voucher_order`(`order_id`,`voucher_id`,`usr_id`, \
            `create_time`) VALUES (?,?,?,?)";
        Self(stmt.to_string(), Params::Positional(arg))
    }
}

pub(super) struct MariadbVoucherOrderRepo {
    _dstore: Arc<AppDStoreMariaDB>,
}

impl MariadbVoucherOrderRepo {
    pub(super) async fn new(ds: Arc<AppDataStoreContext>) -> Result<Self, AppRepoError> {
        ds.mariadb()
            .map(|found| Self { _dstore: found })
            .ok_or(AppRepoError {
                fn_label: AppRepoErrorFnLabel::InitRepo,
                code: AppErrorCode::MissingDataStore,
                detail: AppRepoErrorDetail::Unknown,
            })
    }

    fn _map_err(
        &self,
        fn_label: AppRepoErrorFnLabel,
        code: AppErrorCode,
        detail: AppRepoErrorDetail,
    ) -> AppRepoError {
        let e = AppRepoError {
            fn_label,
            code,
            detail,
        };
        let logctx = self._dstore.log_context();
        app_log_event!(logctx, AppLogLevel::ERROR, "{:?}", e);
        e
    }
} // end of impl MariadbVoucherOrderRepo

#[async_trait]
impl AbstractVoucherOrderRepo for MariadbVoucherOrderRepo {
    async fn fetch_voucher(&self, voucher_id: u64) -> Result<Option<VoucherModel>, AppRepoError> {
        let FetchVoucherArgs(stmt, params) = FetchVoucherArgs::from(voucher_id);
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::FetchVoucher,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let row = conn
            .exec_first::<(u32, mysql_async::Value, mysql_async::Value), _, _>(stmt, params)
            .await
            .map_err(|e| {
                self._map_err(
                    AppRepoErrorFnLabel::FetchVoucher,
                    AppErrorCode::RemoteDbServerFailure,
                    AppRepoErrorDetail::DatabaseExec(e.to_string()),
                )
            })?;
        match row {
            None => Ok(None),
            Some((stock, t0, t1)) => {
                let begin_time = raw_column_to_datetime(t0, 0).map_err(|(code, detail)| {
                    self._map_err(AppRepoErrorFnLabel::FetchVoucher, code, detail)
                })?;
                let end_time = raw_column_to_datetime(t1, 0).map_err(|(code, detail)| {
                    self._map_err(AppRepoErrorFnLabel::FetchVoucher, code, detail)
                })?;
                Ok(Some(VoucherModel {
                    voucher_id,
                    stock,
                    begin_time,
                    end_time,
                }))
            }
        }
    } // end of fn fetch_voucher

    async fn save_voucher(&self, voucher: &VoucherModel) -> Result<(), AppRepoError> {
        let UpsertVoucherArgs(stmt, params) = UpsertVoucherArgs::from(voucher);
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::SaveVoucher,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        conn.exec_drop(stmt, params).await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::SaveVoucher,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseExec(e.to_string()),
            )
        })
    }

    async fn order_exists(&self, voucher_id: u64, usr_id: u64) -> Result<bool, AppRepoError> {
        let OrderExistArgs(stmt, params) = OrderExistArgs::from((voucher_id, usr_id));
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::OrderExists,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let row = conn.exec_first::<(i64,), _, _>(stmt, params).await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::OrderExists,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseExec(e.to_string()),
            )
        })?;
        Ok(row.map(|(cnt,)| cnt > 0).unwrap_or(false))
    }

    async fn create_order(&self, order: &VoucherOrderModel) -> Result<(), AppRepoError> {
        let DecrStockArgs(stmt_decr, params_decr) = DecrStockArgs::from(order.voucher_id);
        let InsertOrderArgs(stmt_ins, params_ins) = InsertOrderArgs::from(order);
        let mut conn = self._dstore.acquire().await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::CreateOrder,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DataStore(e),
            )
        })?;
        let mut options = TxOpts::default();
        options.with_isolation_level(IsolationLevel::RepeatableRead);
        let mut tx = conn.start_transaction(options).await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::CreateOrder,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseTxStart(e.to_string()),
            )
        })?;
        tx.exec_drop(stmt_decr, params_decr).await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::CreateOrder,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseExec(e.to_string()),
            )
        })?;
        if tx.affected_rows() == 0 {
            // durable stock already exhausted, nothing must be written
            tx.rollback().await.map_err(|e| {
                self._map_err(
                    AppRepoErrorFnLabel::CreateOrder,
                    AppErrorCode::RemoteDbServerFailure,
                    AppRepoErrorDetail::DatabaseTxCommit(e.to_string()),
                )
            })?;
            return Err(AppRepoError {
                fn_label: AppRepoErrorFnLabel::CreateOrder,
                code: AppErrorCode::PersistenceConflict,
                detail: AppRepoErrorDetail::Unknown,
            });
        }
        tx.exec_drop(stmt_ins, params_ins).await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::CreateOrder,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseExec(e.to_string()),
            )
        })?;
        tx.commit().await.map_err(|e| {
            self._map_err(
                AppRepoErrorFnLabel::CreateOrder,
                AppErrorCode::RemoteDbServerFailure,
                AppRepoErrorDetail::DatabaseTxCommit(e.to_string()),
            )
        })
    } // end of fn create_order
} // end of impl AbstractVoucherOrderRepo
