use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::{AbstractCacheStore, AppCacheError};

/// Mutual exclusion between service replicas built on the shared
/// cache store. Acquisition is non-blocking, callers decide whether
/// to retry or bail out.
#[async_trait]
pub trait AbstractDistLock: Send + Sync {
    async fn try_acquire(&mut self) -> Result<bool, AppCacheError>;
    /// must only remove the entry this holder wrote, a release after
    /// TTL handover to another holder has to be a no-op
    async fn release(&mut self) -> Result<(), AppCacheError>;
}

fn generate_holder_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Set-if-absent lock with a fixed TTL. The stored value identifies
/// the holder so an expired-then-reacquired key is never removed by
/// the previous holder.
pub struct SimpleCacheLock {
    _store: Arc<Box<dyn AbstractCacheStore>>,
    _key: String,
    _token: String,
    _ttl: Duration,
}

impl SimpleCacheLock {
    pub fn new(store: Arc<Box<dyn AbstractCacheStore>>, key: String, ttl: Duration) -> Self {
        Self {
            _store: store,
            _key: key,
            _token: generate_holder_token(),
            _ttl: ttl,
        }
    }
}

#[async_trait]
impl AbstractDistLock for SimpleCacheLock {
    async fn try_acquire(&mut self) -> Result<bool, AppCacheError> {
        self._store
            .save_if_absent(self._key.as_str(), self._token.as_str(), self._ttl)
            .await
    }

    async fn release(&mut self) -> Result<(), AppCacheError> {
        let _owned = self
            ._store
            .delete_if_match(self._key.as_str(), self._token.as_str())
            .await?;
        Ok(())
    }
} // end of impl SimpleCacheLock

/// Variant keeping a holder-local hold count, nested acquisitions by
/// the owning holder succeed immediately and only the final release
/// removes the key. While held, a background task extends the TTL at
/// one-third intervals so a long critical section does not lose the
/// lock, while a crashed holder still frees it within one TTL.
pub struct ReentrantCacheLock {
    _store: Arc<Box<dyn AbstractCacheStore>>,
    _key: String,
    _token: String,
    _ttl: Duration,
    _hold_count: u32,
    _renewer: Option<JoinHandle<()>>,
}

impl ReentrantCacheLock {
    pub fn new(store: Arc<Box<dyn AbstractCacheStore>>, key: String, ttl: Duration) -> Self {
        Self {
            _store: store,
            _key: key,
            _token: generate_holder_token(),
            _ttl: ttl,
            _hold_count: 0,
            _renewer: None,
        }
    }

    pub fn num_holds(&self) -> u32 {
        self._hold_count
    }

    fn _start_renewal(&mut self) {
        let store = self._store.clone();
        let key = self._key.clone();
        let ttl = self._ttl;
        let interval = ttl / 3;
        let handle = tokio::spawn(async move {
            loop {
                sleep(interval).await;
                match store.extend_expiry(key.as_str(), ttl).await {
                    Ok(true) => {}
                    // key gone or store unreachable, the entry will
                    // simply expire on its own
                    Ok(false) | Err(_) => break,
                }
            }
        });
        self._renewer = Some(handle);
    }

    fn _stop_renewal(&mut self) {
        if let Some(handle) = self._renewer.take() {
            handle.abort();
        }
    }
} // end of impl ReentrantCacheLock

#[async_trait]
impl AbstractDistLock for ReentrantCacheLock {
    async fn try_acquire(&mut self) -> Result<bool, AppCacheError> {
        if self._hold_count > 0 {
            self._hold_count += 1;
            return Ok(true);
        }
        let acquired = self
            ._store
            .save_if_absent(self._key.as_str(), self._token.as_str(), self._ttl)
            .await?;
        if acquired {
            self._hold_count = 1;
            self._start_renewal();
        }
        Ok(acquired)
    }

    async fn release(&mut self) -> Result<(), AppCacheError> {
        if self._hold_count == 0 {
            return Ok(());
        }
        self._hold_count -= 1;
        if self._hold_count == 0 {
            self._stop_renewal();
            let _owned = self
                ._store
                .delete_if_match(self._key.as_str(), self._token.as_str())
                .await?;
        }
        Ok(())
    }
} // end of impl ReentrantCacheLock

impl Drop for ReentrantCacheLock {
    // a dropped holder must not keep extending the TTL forever
    fn drop(&mut self) {
        self._stop_renewal();
    }
}
