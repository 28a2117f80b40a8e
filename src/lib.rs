pub mod adapter;
pub mod confidentiality;
pub mod config;
pub mod constant;
pub mod error;
pub mod logging;
pub mod model;
pub mod usecase;

use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use crate::adapter::cache::{self, AbstractCacheStore, AppCacheError};
use crate::adapter::datastore::{AppDStoreError, AppDataStoreContext};
use crate::adapter::mq::{self, AbstractIntentQueue, AppQueueError};
use crate::confidentiality::AbstractConfidentiality;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::logging::AppLogContext;

pub type AppLogAlias = String;

pub struct AppSharedState {
    _config: Arc<AppConfig>,
    _log_ctx: Arc<AppLogContext>,
    _cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
    _dstore: Arc<AppDataStoreContext>,
    _cache_store: Arc<Box<dyn AbstractCacheStore>>,
    _intent_queue: Arc<Box<dyn AbstractIntentQueue>>,
}

#[derive(Debug)]
pub enum ShrStateInitProgress {
    Confidentiality,
    DataStore,
    CacheStore,
    IntentQueue,
}

#[derive(Debug)]
pub struct ShrStateInitError {
    pub progress: ShrStateInitProgress,
}
impl From<AppError> for ShrStateInitError {
    fn from(_value: AppError) -> Self {
        Self {
            progress: ShrStateInitProgress::Confidentiality,
        }
    }
}
impl From<AppDStoreError> for ShrStateInitError {
    fn from(_value: AppDStoreError) -> Self {
        Self {
            progress: ShrStateInitProgress::DataStore,
        }
    }
}
impl From<AppCacheError> for ShrStateInitError {
    fn from(_value: AppCacheError) -> Self {
        Self {
            progress: ShrStateInitProgress::CacheStore,
        }
    }
}
impl From<AppQueueError> for ShrStateInitError {
    fn from(_value: AppQueueError) -> Self {
        Self {
            progress: ShrStateInitProgress::IntentQueue,
        }
    }
}

impl AppSharedState {
    pub fn new(cfg: AppConfig) -> Result<Self, ShrStateInitError> {
        let logctx = {
            let lc = AppLogContext::new(&cfg.basepath, &cfg.service.logging);
            Arc::new(lc)
        };
        let _cfdntl = {
            let c = confidentiality::build_context(&cfg)?;
            Arc::new(c)
        };
        let _dstore = {
            let d =
                AppDataStoreContext::new(&cfg.service.data_store, _cfdntl.clone(), logctx.clone())?;
            Arc::new(d)
        };
        let _cache_store = {
            let c = cache::build_context(&cfg.service.cache_store, _cfdntl.clone(), logctx.clone())?;
            Arc::new(c)
        };
        let _intent_queue = {
            let q = mq::build_context(&cfg.service.intent_queue, _cfdntl.clone(), logctx.clone())?;
            Arc::new(q)
        };
        Ok(Self {
            _config: Arc::new(cfg),
            _log_ctx: logctx,
            _cfdntl,
            _dstore,
            _cache_store,
            _intent_queue,
        })
    } // end of fn new

    pub fn datastore(&self) -> Arc<AppDataStoreContext> {
        self._dstore.clone()
    }
    pub fn cache_store(&self) -> Arc<Box<dyn AbstractCacheStore>> {
        self._cache_store.clone()
    }
    pub fn intent_queue(&self) -> Arc<Box<dyn AbstractIntentQueue>> {
        self._intent_queue.clone()
    }
    pub fn confidentiality(&self) -> Arc<Box<dyn AbstractConfidentiality>> {
        self._cfdntl.clone()
    }
    pub fn log_context(&self) -> Arc<AppLogContext> {
        self._log_ctx.clone()
    }
    pub fn config(&self) -> Arc<AppConfig> {
        self._config.clone()
    }
} // end of impl AppSharedState

impl Clone for AppSharedState {
    fn clone(&self) -> Self {
        Self {
            _config: self._config.clone(),
            _log_ctx: self._log_ctx.clone(),
            _cfdntl: self._cfdntl.clone(),
            _dstore: self._dstore.clone(),
            _cache_store: self._cache_store.clone(),
            _intent_queue: self._intent_queue.clone(),
        }
    }
}
