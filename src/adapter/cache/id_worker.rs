use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use chrono::Utc;

use super::{AbstractCacheStore, AppCacheError};
use crate::constant::{cache_key, id_gen};

/// Cluster-wide unique ID generator. The high bits carry seconds
/// since a fixed service epoch so the IDs stay roughly time-ordered,
/// the low 32 bits come from a per-day counter in the shared cache
/// store. Daily counter keys keep any single counter far away from
/// its numeric ceiling.
pub struct AppIdWorker {
    _store: Arc<Box<dyn AbstractCacheStore>>,
}

impl AppIdWorker {
    pub fn new(store: Arc<Box<dyn AbstractCacheStore>>) -> Self {
        Self { _store: store }
    }

    pub async fn next_id(&self, scope: &str) -> Result<i64, AppCacheError> {
        let now = Utc::now();
        let elapsed_secs = now.timestamp() - id_gen::EPOCH_SECS;
        let datestr = now.format(id_gen::COUNTER_DATE_FMT);
        let counter_key = format!("{}{}:{}", cache_key::ID_COUNTER, scope, datestr);
        let sequence = self._store.incr(counter_key.as_str()).await?;
        let seq_mask = (1i64 << id_gen::SEQUENCE_BITS) - 1;
        Ok((elapsed_secs << id_gen::SEQUENCE_BITS) | (sequence & seq_mask))
    }
} // end of impl AppIdWorker
