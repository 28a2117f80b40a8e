use std::boxed::Box;
use std::future::Future;
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use super::{AbstractCacheStore, AbstractDistLock, AppCacheError, SimpleCacheLock};
use crate::constant::{cache_key, cache_ttl, rebuild_retry};
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};

/// raised by caller-provided source fetch closures, the detail string
/// is carried through unmodified
#[derive(Debug)]
pub struct AppCacheSourceError(pub String);

#[derive(Debug)]
pub enum AppCacheAsideError {
    Store(AppCacheError),
    Codec(String),
    Source(String),
    // every attempt found a missing entry while another replica kept
    // holding the rebuild lock
    RebuildContention,
}

impl From<AppCacheError> for AppCacheAsideError {
    fn from(value: AppCacheError) -> Self {
        Self::Store(value)
    }
}
impl From<serde_json::Error> for AppCacheAsideError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value.to_string())
    }
}
impl From<AppCacheSourceError> for AppCacheAsideError {
    fn from(value: AppCacheSourceError) -> Self {
        Self::Source(value.0)
    }
}

// expiry lives inside the payload, the cache entry itself never gets
// a physical TTL under the logical-expiry strategy
#[derive(Serialize, Deserialize)]
struct CachedEnvelope<T> {
    data: T,
    expiry: DateTime<Utc>,
}

/// Read-side cache-aside client over the shared cache store. Three
/// strategies with different trade-offs against the two classic
/// failure modes, absent-key flooding and rebuild stampedes.
pub struct AppCacheAside {
    _store: Arc<Box<dyn AbstractCacheStore>>,
    _logctx: Arc<AppLogContext>,
    _negative_ttl: Duration,
}

impl AppCacheAside {
    pub fn new(store: Arc<Box<dyn AbstractCacheStore>>, logctx: Arc<AppLogContext>) -> Self {
        Self {
            _store: store,
            _logctx: logctx,
            _negative_ttl: Duration::from_secs(cache_ttl::NEGATIVE_SECS),
        }
    }

    fn _decode<T: DeserializeOwned>(serial: String) -> Result<Option<T>, AppCacheAsideError> {
        if serial.is_empty() {
            // tombstone written on a confirmed source miss
            Ok(None)
        } else {
            let obj = serde_json::from_str::<T>(serial.as_str())?;
            Ok(Some(obj))
        }
    }

    async fn _save_fetched<T: Serialize>(
        &self,
        key: &str,
        found: Option<T>,
        ttl: Duration,
    ) -> Result<Option<T>, AppCacheAsideError> {
        match found {
            Some(v) => {
                let serial = serde_json::to_string(&v)?;
                self._store.save(key, serial.as_str(), Some(ttl)).await?;
                Ok(Some(v))
            }
            None => {
                self._store.save(key, "", Some(self._negative_ttl)).await?;
                Ok(None)
            }
        }
    }

    /// plain read-through with negative caching, a source miss leaves
    /// a short-lived tombstone so repeated lookups of absent keys stop
    /// reaching the relational store
    pub async fn fetch_passthrough<T, F, Fut>(
        &self,
        prefix: &str,
        id_: &str,
        ttl: Duration,
        src_fetch: F,
    ) -> Result<Option<T>, AppCacheAsideError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, AppCacheSourceError>> + Send,
    {
        let key = [prefix, id_].concat();
        if let Some(serial) = self._store.fetch(key.as_str()).await? {
            return Self::_decode(serial);
        }
        let found = src_fetch().await?;
        self._save_fetched(key.as_str(), found, ttl).await
    }

    /// read-through where at most one caller rebuilds a missing entry,
    /// losers poll the entry a bounded number of times then give up
    /// with `RebuildContention`
    pub async fn fetch_mutex_rebuild<T, F, Fut>(
        &self,
        prefix: &str,
        id_: &str,
        ttl: Duration,
        src_fetch: F,
    ) -> Result<Option<T>, AppCacheAsideError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, AppCacheSourceError>> + Send,
    {
        let key = [prefix, id_].concat();
        let lock_key = [cache_key::LOCK_REBUILD, prefix, id_].concat();
        let mut src_fetch = Some(src_fetch);
        for _attempt in 0..rebuild_retry::MAX_ATTEMPTS {
            if let Some(serial) = self._store.fetch(key.as_str()).await? {
                return Self::_decode(serial);
            }
            let mut lock = SimpleCacheLock::new(
                self._store.clone(),
                lock_key.clone(),
                Duration::from_secs(cache_ttl::REBUILD_LOCK_SECS),
            );
            if lock.try_acquire().await? {
                let fetch_fn = src_fetch.take().unwrap();
                let out = self._rebuild_guarded(key.as_str(), ttl, fetch_fn).await;
                if let Err(e) = lock.release().await {
                    let logctx = self._logctx.as_ref();
                    app_log_event!(logctx, AppLogLevel::WARNING, "key: {}, {:?}", key, e);
                }
                return out;
            }
            sleep(Duration::from_millis(rebuild_retry::PAUSE_MILLIS)).await;
        } // end of loop
        Err(AppCacheAsideError::RebuildContention)
    } // end of fn fetch_mutex_rebuild

    async fn _rebuild_guarded<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        src_fetch: F,
    ) -> Result<Option<T>, AppCacheAsideError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, AppCacheSourceError>> + Send,
    {
        // another replica may have finished the rebuild between the
        // miss and the lock grant
        if let Some(serial) = self._store.fetch(key).await? {
            return Self::_decode(serial);
        }
        let found = src_fetch().await?;
        self._save_fetched(key, found, ttl).await
    }

    /// write the envelope form consumed by `fetch_logical_expiry`,
    /// invoked at campaign preload time
    pub async fn save_logical<T: Serialize>(
        &self,
        prefix: &str,
        id_: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), AppCacheAsideError> {
        let key = [prefix, id_].concat();
        let envelope = CachedEnvelope {
            data: value,
            expiry: Utc::now() + ChronoDuration::seconds(ttl.as_secs() as i64),
        };
        let serial = serde_json::to_string(&envelope)?;
        self._store.save(key.as_str(), serial.as_str(), None).await?;
        Ok(())
    }

    /// never blocks on the source. A hot entry past its logical expiry
    /// is still served while exactly one caller refreshes it in the
    /// background, an entry never preloaded resolves to `None`.
    pub async fn fetch_logical_expiry<T, F, Fut>(
        &self,
        prefix: &str,
        id_: &str,
        ttl: Duration,
        src_fetch: F,
    ) -> Result<Option<T>, AppCacheAsideError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, AppCacheSourceError>> + Send,
    {
        let key = [prefix, id_].concat();
        let serial = match self._store.fetch(key.as_str()).await? {
            Some(s) => s,
            None => return Ok(None),
        };
        let envelope = serde_json::from_str::<CachedEnvelope<T>>(serial.as_str())?;
        if envelope.expiry > Utc::now() {
            return Ok(Some(envelope.data));
        }
        let lock_key = [cache_key::LOCK_REBUILD, prefix, id_].concat();
        let mut lock = SimpleCacheLock::new(
            self._store.clone(),
            lock_key,
            Duration::from_secs(cache_ttl::REBUILD_LOCK_SECS),
        );
        if !lock.try_acquire().await? {
            // refresh already in flight elsewhere, stale data is
            // acceptable under this strategy
            return Ok(Some(envelope.data));
        }
        if let Some(serial2) = self._store.fetch(key.as_str()).await? {
            let latest = serde_json::from_str::<CachedEnvelope<T>>(serial2.as_str())?;
            if latest.expiry > Utc::now() {
                // refreshed while waiting for the lock grant
                if let Err(e) = lock.release().await {
                    let logctx = self._logctx.as_ref();
                    app_log_event!(logctx, AppLogLevel::WARNING, "key: {}, {:?}", key, e);
                }
                return Ok(Some(latest.data));
            }
        }
        let store = self._store.clone();
        let logctx = self._logctx.clone();
        let bg_key = key.clone();
        let _handle = tokio::spawn(async move {
            let mut lock = lock;
            let result = Self::_refresh_logical(store, bg_key.as_str(), ttl, src_fetch).await;
            if let Err(e) = result {
                app_log_event!(logctx, AppLogLevel::ERROR, "key: {}, {:?}", bg_key, e);
            }
            if let Err(e) = lock.release().await {
                app_log_event!(logctx, AppLogLevel::WARNING, "key: {}, {:?}", bg_key, e);
            }
        });
        Ok(Some(envelope.data))
    } // end of fn fetch_logical_expiry

    async fn _refresh_logical<T, F, Fut>(
        store: Arc<Box<dyn AbstractCacheStore>>,
        key: &str,
        ttl: Duration,
        src_fetch: F,
    ) -> Result<(), AppCacheAsideError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, AppCacheSourceError>> + Send,
    {
        match src_fetch().await {
            Ok(Some(v)) => {
                let envelope = CachedEnvelope {
                    data: v,
                    expiry: Utc::now() + ChronoDuration::seconds(ttl.as_secs() as i64),
                };
                let serial = serde_json::to_string(&envelope)?;
                store.save(key, serial.as_str(), None).await?;
                Ok(())
            }
            Ok(None) => {
                // gone from the source, drop the envelope instead of
                // serving a deleted entity forever
                store.delete(key).await?;
                Ok(())
            }
            // the stale envelope stays untouched, the next reader past
            // expiry will trigger another refresh
            Err(e) => Err(AppCacheAsideError::from(e)),
        }
    } // end of fn _refresh_logical
} // end of impl AppCacheAside
