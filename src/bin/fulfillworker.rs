use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use tokio::runtime::Builder as RuntimeBuilder;

use flashsale::adapter::repository::app_repo_voucher_order;
use flashsale::config::{AppCfgHardLimit, AppCfgInitArgs, AppConfig};
use flashsale::constant::{env_vars, hard_limit};
use flashsale::logging::{app_log_event, AppLogLevel};
use flashsale::usecase::{run_fulfillment_loop, OrderFulfillUseCase};
use flashsale::AppSharedState;

async fn start_fulfill_workers(shr_state: AppSharedState) {
    let logctx = shr_state.log_context();
    let repo = match app_repo_voucher_order(shr_state.datastore()).await {
        Ok(r) => Arc::new(r),
        Err(e) => {
            app_log_event!(logctx, AppLogLevel::ERROR, "repo-init: {:?}", e);
            return;
        }
    };
    let uc = Arc::new(OrderFulfillUseCase {
        cache_store: shr_state.cache_store(),
        repo,
        logctx: logctx.clone(),
    });
    let num_consumers = shr_state.config().service.num_fulfill_consumers.max(1);
    let handles = (0..num_consumers)
        .map(|_n| {
            let uc = uc.clone();
            let queue = shr_state.intent_queue();
            let lc = logctx.clone();
            tokio::spawn(async move { run_fulfillment_loop(uc, queue, lc).await })
        })
        .collect::<Vec<_>>();
    let aborters = handles.iter().map(|h| h.abort_handle()).collect::<Vec<_>>();
    let mut joined = futures_util::future::join_all(handles);
    tokio::select! {
        results = &mut joined => {
            for r in results {
                match r {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        app_log_event!(logctx, AppLogLevel::ERROR, "consumer-exit: {:?}", e);
                    }
                    Err(e) => {
                        app_log_event!(logctx, AppLogLevel::ERROR, "consumer-join: {:?}", e);
                    }
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            app_log_event!(logctx, AppLogLevel::INFO, "shutdown signal, stopping consumers");
            // in-flight deliveries stay unacked, the broker redelivers
            // them and persistence is idempotent
            aborters.iter().for_each(|a| a.abort());
        }
    }
} // end of fn start_fulfill_workers

fn start_async_runtime(cfg: AppConfig) {
    let shr_state = match flashsale::AppSharedState::new(cfg) {
        Ok(s) => s,
        Err(e) => {
            println!("app failed to init shared state, progress: {:?}", e.progress);
            return;
        }
    };
    let result = RuntimeBuilder::new_multi_thread()
        .thread_name("fulfill-worker")
        // manage low-level I/O drivers used by network types
        .enable_io()
        .enable_time()
        .build();
    match result {
        Ok(rt) => {
            // new worker threads spawned
            rt.block_on(async move {
                start_fulfill_workers(shr_state).await;
            }); // runtime started
        }
        Err(e) => {
            println!("async runtime failed to build, {e}");
        }
    }
} // end of fn start_async_runtime

fn main() {
    let iter = env::vars().filter(|(k, _v)| env_vars::EXPECTED_LABELS.contains(&k.as_str()));
    let env_var_map: HashMap<String, String, RandomState> = HashMap::from_iter(iter);
    let limit = AppCfgHardLimit {
        nitems_per_inmem_table: hard_limit::MAX_ITEMS_PER_INMEM_TABLE,
        num_db_conns: hard_limit::MAX_DB_CONNECTIONS,
        seconds_db_idle: hard_limit::MAX_SECONDS_DB_IDLE,
    };
    match AppConfig::new(AppCfgInitArgs { env_var_map, limit }) {
        Ok(cfg) => start_async_runtime(cfg),
        Err(e) => {
            println!("app failed to configure, error code: {:?}", e.code);
        }
    }
} // end of main
