use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Promotional voucher of one flash-sale campaign. The relational store
/// owns the durable truth of the `stock` field, the copy living in the
/// cache store is a reconstructible reservation ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherModel {
    pub voucher_id: u64,
    pub stock: u32,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, PartialEq)]
pub enum CampaignWindowError {
    NotStarted,
    Ended,
}

impl VoucherModel {
    // stock is intentionally not examined here, admission against the
    // cache-side ticket is the authority on remaining quantity
    pub fn check_campaign_window(&self, now: DateTime<Utc>) -> Result<(), CampaignWindowError> {
        if now < self.begin_time {
            Err(CampaignWindowError::NotStarted)
        } else if now > self.end_time {
            Err(CampaignWindowError::Ended)
        } else {
            Ok(())
        }
    }
}

/// One successful reservation. At most one row may ever exist for a
/// given (voucher_id, usr_id) pair.
#[derive(Debug, Clone)]
pub struct VoucherOrderModel {
    pub order_id: i64,
    pub voucher_id: u64,
    pub usr_id: u64,
    pub create_time: DateTime<Utc>,
}

/// Queue payload between admission and fulfillment, delivered
/// at-least-once, persisted idempotently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderIntent {
    pub order_id: i64,
    pub voucher_id: u64,
    pub usr_id: u64,
}

impl OrderIntent {
    pub fn into_order(self, create_time: DateTime<Utc>) -> VoucherOrderModel {
        VoucherOrderModel {
            order_id: self.order_id,
            voucher_id: self.voucher_id,
            usr_id: self.usr_id,
            create_time,
        }
    }
}
