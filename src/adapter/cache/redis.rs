use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{
    AbstractCacheStore, AppCacheError, AppCacheErrorFnLabel, AppCacheErrorReason, ReserveOutcome,
};
use crate::config::AppRedisCacheCfg;
use crate::confidentiality::AbstractConfidentiality;
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};

#[derive(Deserialize)]
struct SECRET {
    host: String,
    port: u16,
    username: String,
    password: String,
}

// evaluated server-side so the stock check, the duplicate-buyer check
// and both mutations appear as one step to every concurrent caller
const LUA_RESERVE_ONCE: &str = r#"
    local stock = tonumber(redis.call('GET', KEYS[1]))
    if (stock == nil or stock <= 0) then
        return 1
    end
    if (redis.call('SISMEMBER', KEYS[2], ARGV[1]) == 1) then
        return 2
    end
    redis.call('INCRBY', KEYS[1], -1)
    redis.call('SADD', KEYS[2], ARGV[1])
    return 0
"#;

const LUA_DELETE_IF_MATCH: &str = r#"
    if (redis.call('GET', KEYS[1]) == ARGV[1]) then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

pub(crate) struct AppRedisCacheStore {
    _logctx: Arc<AppLogContext>,
    _client: Client,
    // the manager reconnects by itself, building it is async so it is
    // deferred to the first command instead of context construction
    _manager: Mutex<Option<ConnectionManager>>,
}

impl AppRedisCacheStore {
    pub(super) fn try_build(
        cfg: &AppRedisCacheCfg,
        cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
        logctx: Arc<AppLogContext>,
    ) -> Result<Self, AppCacheError> {
        let serial = cfdntl
            .try_get_payload(cfg.confidentiality_path.as_str())
            .map_err(|_e| Self::_map_err_init(AppCacheErrorReason::InvalidCredential))?;
        let secret = serde_json::from_str::<SECRET>(serial.as_str())
            .map_err(|e| Self::_map_err_init(AppCacheErrorReason::CorruptedCredential(e.to_string())))?;
        let uri = format!(
            "redis://{}:{}@{}:{}/{}",
            secret.username, secret.password, secret.host, secret.port, cfg.db_index,
        );
        let _client = Client::open(uri)
            .map_err(|e| Self::_map_err_init(AppCacheErrorReason::LowLevelConn(e.to_string())))?;
        Ok(Self {
            _logctx: logctx,
            _client,
            _manager: Mutex::new(None),
        })
    }

    fn _map_err_init(reason: AppCacheErrorReason) -> AppCacheError {
        AppCacheError {
            fn_label: AppCacheErrorFnLabel::InitCtx,
            reason,
        }
    }

    fn _map_err_cmd(&self, fn_label: AppCacheErrorFnLabel, e: RedisError) -> AppCacheError {
        let logctx = self._logctx.as_ref();
        app_log_event!(logctx, AppLogLevel::ERROR, "{:?}, {}", fn_label, e);
        AppCacheError {
            fn_label,
            reason: AppCacheErrorReason::LowLevelConn(e.to_string()),
        }
    }

    async fn _acquire(&self, fn_label: AppCacheErrorFnLabel) -> Result<ConnectionManager, AppCacheError> {
        let mut guard = self._manager.lock().await;
        if guard.is_none() {
            let m = ConnectionManager::new(self._client.clone())
                .await
                .map_err(|e| self._map_err_cmd(fn_label, e))?;
            *guard = Some(m);
        }
        Ok(guard.as_ref().unwrap().clone())
    }
} // end of impl AppRedisCacheStore

#[async_trait]
impl AbstractCacheStore for AppRedisCacheStore {
    async fn fetch(&self, key: &str) -> Result<Option<String>, AppCacheError> {
        let mut conn = self._acquire(AppCacheErrorFnLabel::Fetch).await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| self._map_err_cmd(AppCacheErrorFnLabel::Fetch, e))
    }

    async fn save(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), AppCacheError> {
        let mut conn = self._acquire(AppCacheErrorFnLabel::Save).await?;
        let result = match ttl {
            Some(d) => conn.set_ex::<_, _, ()>(key, value, d.as_secs().max(1)).await,
            None => conn.set::<_, _, ()>(key, value).await,
        };
        result.map_err(|e| self._map_err_cmd(AppCacheErrorFnLabel::Save, e))
    }

    async fn save_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AppCacheError> {
        let mut conn = self._acquire(AppCacheErrorFnLabel::SaveIfAbsent).await?;
        // single SET with NX / EX , the key and its expiry must appear together
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| self._map_err_cmd(AppCacheErrorFnLabel::SaveIfAbsent, e))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), AppCacheError> {
        let mut conn = self._acquire(AppCacheErrorFnLabel::Delete).await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| self._map_err_cmd(AppCacheErrorFnLabel::Delete, e))
    }

    async fn delete_if_match(&self, key: &str, expect: &str) -> Result<bool, AppCacheError> {
        let mut conn = self._acquire(AppCacheErrorFnLabel::DeleteIfMatch).await?;
        let num_removed = Script::new(LUA_DELETE_IF_MATCH)
            .key(key)
            .arg(expect)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| self._map_err_cmd(AppCacheErrorFnLabel::DeleteIfMatch, e))?;
        Ok(num_removed > 0)
    }

    async fn extend_expiry(&self, key: &str, ttl: Duration) -> Result<bool, AppCacheError> {
        let mut conn = self._acquire(AppCacheErrorFnLabel::ExtendExpiry).await?;
        conn.expire::<_, bool>(key, ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| self._map_err_cmd(AppCacheErrorFnLabel::ExtendExpiry, e))
    }

    async fn incr(&self, key: &str) -> Result<i64, AppCacheError> {
        let mut conn = self._acquire(AppCacheErrorFnLabel::Increment).await?;
        conn.incr::<_, _, i64>(key, 1i64)
            .await
            .map_err(|e| self._map_err_cmd(AppCacheErrorFnLabel::Increment, e))
    }

    async fn reserve_once(
        &self,
        stock_key: &str,
        buyers_key: &str,
        member: &str,
    ) -> Result<ReserveOutcome, AppCacheError> {
        let mut conn = self._acquire(AppCacheErrorFnLabel::ReserveOnce).await?;
        let reply = Script::new(LUA_RESERVE_ONCE)
            .key(stock_key)
            .key(buyers_key)
            .arg(member)
            .invoke_async::<i64>(&mut conn)
            .await
            .map_err(|e| self._map_err_cmd(AppCacheErrorFnLabel::ReserveOnce, e))?;
        match reply {
            0 => Ok(ReserveOutcome::Granted),
            1 => Ok(ReserveOutcome::OutOfStock),
            2 => Ok(ReserveOutcome::AlreadyReserved),
            n => Err(AppCacheError {
                fn_label: AppCacheErrorFnLabel::ReserveOnce,
                reason: AppCacheErrorReason::ScriptReply(format!("unexpected-code: {n}")),
            }),
        }
    } // end of fn reserve_once
} // end of impl AbstractCacheStore
