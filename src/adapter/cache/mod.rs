mod aside;
mod id_worker;
mod in_mem;
mod lock;
mod redis;

use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AppCacheStoreCfg;
use crate::confidentiality::AbstractConfidentiality;
use crate::logging::AppLogContext;

pub use aside::{AppCacheAside, AppCacheAsideError, AppCacheSourceError};
pub use id_worker::AppIdWorker;
pub use in_mem::AppInMemCacheStore;
pub use lock::{AbstractDistLock, ReentrantCacheLock, SimpleCacheLock};
pub(crate) use redis::AppRedisCacheStore;

#[derive(Debug)]
pub enum AppCacheErrorFnLabel {
    InitCtx,
    Fetch,
    Save,
    SaveIfAbsent,
    Delete,
    DeleteIfMatch,
    ExtendExpiry,
    Increment,
    ReserveOnce,
}

#[derive(Debug)]
pub enum AppCacheErrorReason {
    LowLevelConn(String),
    LocalLock(String),
    CorruptedPayload(String),
    ScriptReply(String),
    ExceedingMaxLimit,
    InvalidCredential,
    CorruptedCredential(String),
}

#[derive(Debug)]
pub struct AppCacheError {
    pub fn_label: AppCacheErrorFnLabel,
    pub reason: AppCacheErrorReason,
}

/// Outcome of the atomic check-and-reserve evaluated inside the cache
/// store. Exactly one grant may ever be produced per (stock, member)
/// pair and grants never exceed the seeded stock.
#[derive(Debug, PartialEq)]
pub enum ReserveOutcome {
    Granted,
    OutOfStock,
    AlreadyReserved,
}

/// Key-value store shared by every service replica, the linearization
/// point of admission decisions. String payloads only, callers decide
/// the serialization.
#[async_trait]
pub trait AbstractCacheStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Option<String>, AppCacheError>;

    /// `ttl = None` keeps the entry until an explicit delete
    async fn save(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), AppCacheError>;

    /// returns false without touching anything when the key already exists
    async fn save_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AppCacheError>;

    async fn delete(&self, key: &str) -> Result<(), AppCacheError>;

    /// delete only when the current value equals `expect`, evaluated
    /// atomically against the store
    async fn delete_if_match(&self, key: &str, expect: &str) -> Result<bool, AppCacheError>;

    /// returns false when the key no longer exists
    async fn extend_expiry(&self, key: &str, ttl: Duration) -> Result<bool, AppCacheError>;

    async fn incr(&self, key: &str) -> Result<i64, AppCacheError>;

    /// single atomic step covering the stock check, the duplicate-buyer
    /// check, the decrement and the membership insert
    async fn reserve_once(
        &self,
        stock_key: &str,
        buyers_key: &str,
        member: &str,
    ) -> Result<ReserveOutcome, AppCacheError>;
} // end of trait AbstractCacheStore

pub fn build_context(
    cfg: &AppCacheStoreCfg,
    cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
    logctx: Arc<AppLogContext>,
) -> Result<Box<dyn AbstractCacheStore>, AppCacheError> {
    match cfg {
        AppCacheStoreCfg::InMemory(c) => Ok(Box::new(AppInMemCacheStore::build(c.max_items))),
        AppCacheStoreCfg::Redis(c) => {
            let obj = AppRedisCacheStore::try_build(c, cfdntl, logctx)?;
            Ok(Box::new(obj))
        }
    }
}
