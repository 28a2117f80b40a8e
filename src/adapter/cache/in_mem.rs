use std::collections::{HashMap, HashSet};
use std::result::Result;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{
    AbstractCacheStore, AppCacheError, AppCacheErrorFnLabel, AppCacheErrorReason, ReserveOutcome,
};

struct InnerState {
    // value with optional deadline, expiry is applied lazily on access
    kv: HashMap<String, (String, Option<Instant>)>,
    sets: HashMap<String, HashSet<String>>,
}

/// single-process stand-in for the shared cache store, mainly for
/// development and tests. All operations take one coarse mutex so
/// every command is linearizable exactly like the network-based
/// backend guarantees.
pub struct AppInMemCacheStore {
    _max_items: u32,
    _inner: Mutex<InnerState>,
}

impl AppInMemCacheStore {
    pub fn build(max_items: u32) -> Self {
        Self {
            _max_items: max_items,
            _inner: Mutex::new(InnerState {
                kv: HashMap::new(),
                sets: HashMap::new(),
            }),
        }
    }

    fn _lock(
        &self,
        fn_label: AppCacheErrorFnLabel,
    ) -> Result<std::sync::MutexGuard<'_, InnerState>, AppCacheError> {
        self._inner.lock().map_err(|e| AppCacheError {
            fn_label,
            reason: AppCacheErrorReason::LocalLock(e.to_string()),
        })
    }

    fn _fetch_live<'a>(inner: &'a mut InnerState, key: &str) -> Option<&'a String> {
        let expired = match inner.kv.get(key) {
            Some((_v, Some(deadline))) => *deadline <= Instant::now(),
            Some((_v, None)) => false,
            None => return None,
        };
        if expired {
            let _removed = inner.kv.remove(key);
            None
        } else {
            inner.kv.get(key).map(|(v, _d)| v)
        }
    }

    fn _check_capacity(
        &self,
        inner: &InnerState,
        fn_label: AppCacheErrorFnLabel,
        key: &str,
    ) -> Result<(), AppCacheError> {
        let num_used = inner.kv.len() + inner.sets.len();
        if num_used >= (self._max_items as usize) && !inner.kv.contains_key(key) {
            Err(AppCacheError {
                fn_label,
                reason: AppCacheErrorReason::ExceedingMaxLimit,
            })
        } else {
            Ok(())
        }
    }
} // end of impl AppInMemCacheStore

#[async_trait]
impl AbstractCacheStore for AppInMemCacheStore {
    async fn fetch(&self, key: &str) -> Result<Option<String>, AppCacheError> {
        let mut guard = self._lock(AppCacheErrorFnLabel::Fetch)?;
        Ok(Self::_fetch_live(&mut guard, key).cloned())
    }

    async fn save(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), AppCacheError> {
        let mut guard = self._lock(AppCacheErrorFnLabel::Save)?;
        self._check_capacity(&guard, AppCacheErrorFnLabel::Save, key)?;
        let deadline = ttl.map(|d| Instant::now() + d);
        let _old = guard.kv.insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn save_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AppCacheError> {
        let mut guard = self._lock(AppCacheErrorFnLabel::SaveIfAbsent)?;
        if Self::_fetch_live(&mut guard, key).is_some() {
            return Ok(false);
        }
        self._check_capacity(&guard, AppCacheErrorFnLabel::SaveIfAbsent, key)?;
        let deadline = Some(Instant::now() + ttl);
        let _old = guard.kv.insert(key.to_string(), (value.to_string(), deadline));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), AppCacheError> {
        let mut guard = self._lock(AppCacheErrorFnLabel::Delete)?;
        // a key may name either a plain value or a membership set
        let _removed = guard.kv.remove(key);
        let _members = guard.sets.remove(key);
        Ok(())
    }

    async fn delete_if_match(&self, key: &str, expect: &str) -> Result<bool, AppCacheError> {
        let mut guard = self._lock(AppCacheErrorFnLabel::DeleteIfMatch)?;
        let matched = Self::_fetch_live(&mut guard, key)
            .map(|v| v.as_str() == expect)
            .unwrap_or(false);
        if matched {
            let _removed = guard.kv.remove(key);
        }
        Ok(matched)
    }

    async fn extend_expiry(&self, key: &str, ttl: Duration) -> Result<bool, AppCacheError> {
        let mut guard = self._lock(AppCacheErrorFnLabel::ExtendExpiry)?;
        if Self::_fetch_live(&mut guard, key).is_none() {
            return Ok(false);
        }
        if let Some(entry) = guard.kv.get_mut(key) {
            entry.1 = Some(Instant::now() + ttl);
        }
        Ok(true)
    }

    async fn incr(&self, key: &str) -> Result<i64, AppCacheError> {
        let mut guard = self._lock(AppCacheErrorFnLabel::Increment)?;
        let curr = match Self::_fetch_live(&mut guard, key) {
            Some(v) => v.parse::<i64>().map_err(|e| AppCacheError {
                fn_label: AppCacheErrorFnLabel::Increment,
                reason: AppCacheErrorReason::CorruptedPayload(e.to_string()),
            })?,
            None => {
                self._check_capacity(&guard, AppCacheErrorFnLabel::Increment, key)?;
                0i64
            }
        };
        let updated = curr + 1;
        let deadline = guard.kv.get(key).and_then(|(_v, d)| *d);
        let _old = guard.kv.insert(key.to_string(), (updated.to_string(), deadline));
        Ok(updated)
    }

    async fn reserve_once(
        &self,
        stock_key: &str,
        buyers_key: &str,
        member: &str,
    ) -> Result<ReserveOutcome, AppCacheError> {
        let mut guard = self._lock(AppCacheErrorFnLabel::ReserveOnce)?;
        let remaining = match Self::_fetch_live(&mut guard, stock_key) {
            Some(v) => v.parse::<i64>().map_err(|e| AppCacheError {
                fn_label: AppCacheErrorFnLabel::ReserveOnce,
                reason: AppCacheErrorReason::CorruptedPayload(e.to_string()),
            })?,
            None => 0i64,
        };
        if remaining <= 0 {
            return Ok(ReserveOutcome::OutOfStock);
        }
        let duplicate = guard
            .sets
            .get(buyers_key)
            .map(|s| s.contains(member))
            .unwrap_or(false);
        if duplicate {
            return Ok(ReserveOutcome::AlreadyReserved);
        }
        let deadline = guard.kv.get(stock_key).and_then(|(_v, d)| *d);
        let _old = guard
            .kv
            .insert(stock_key.to_string(), ((remaining - 1).to_string(), deadline));
        let _added = guard
            .sets
            .entry(buyers_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(ReserveOutcome::Granted)
    } // end of fn reserve_once
} // end of impl AbstractCacheStore
