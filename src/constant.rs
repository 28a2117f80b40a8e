pub mod app_meta {
    pub const LABAL: &str = "flashsale";
}

pub mod env_vars {
    pub const SYS_BASEPATH: &str = "SYS_BASE_PATH";
    pub const SERVICE_BASEPATH: &str = "SERVICE_BASE_PATH";
    // relative path starting from app / service home folder
    pub const CFG_FILEPATH: &str = "CONFIG_FILE_PATH";
    pub const EXPECTED_LABELS: [&str; 3] = [SYS_BASEPATH, SERVICE_BASEPATH, CFG_FILEPATH];
}

pub mod logging {
    use serde::Deserialize;

    #[allow(clippy::upper_case_acronyms)]
    #[derive(Deserialize)]
    pub enum Level {
        TRACE,
        DEBUG,
        INFO,
        WARNING,
        ERROR,
        FATAL,
    }

    #[allow(clippy::upper_case_acronyms)]
    #[derive(Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Destination {
        CONSOLE,
        LOCALFS,
    } // TODO, Fluentd
}

// layout of keys in the shared cache store, all of them are built
// by appending an identifier to one of the prefixes below
pub mod cache_key {
    pub const VOUCHER_ENTITY: &str = "cache:voucher:";
    // plain JSON rendition for browsing, kept apart from the
    // envelope form stored under `VOUCHER_ENTITY`
    pub const VOUCHER_DETAIL: &str = "cache:voucher:detail:";
    pub const SECKILL_STOCK: &str = "seckill:stock:";
    pub const SECKILL_BUYERS: &str = "seckill:buyers:";
    pub const LOCK_ORDER: &str = "lock:order:";
    pub const LOCK_REBUILD: &str = "lock:rebuild:";
    pub const ID_COUNTER: &str = "icr:";
}

pub mod cache_ttl {
    // entity cache written by the pass-through / mutex strategies
    pub const ENTITY_SECS: u64 = 1800;
    // short-lived tombstone for keys proven absent at the source
    pub const NEGATIVE_SECS: u64 = 120;
    // per-key rebuild lock, long enough for one source fetch
    pub const REBUILD_LOCK_SECS: u64 = 10;
    // per-user order lock held across the fulfillment transaction
    pub const ORDER_LOCK_SECS: u64 = 30;
}

pub mod id_gen {
    // 2022-01-01T00:00:00Z , fixed epoch of the distributed ID layout
    pub const EPOCH_SECS: i64 = 1_640_995_200;
    pub const SEQUENCE_BITS: u8 = 32;
    pub const COUNTER_DATE_FMT: &str = "%Y%m%d";
}

pub mod rebuild_retry {
    // losing callers poll the rebuilt entry this many times before
    // reporting contention
    pub const MAX_ATTEMPTS: u8 = 4;
    pub const PAUSE_MILLIS: u64 = 50;
}

pub mod hard_limit {
    pub const MAX_DB_CONNECTIONS: u32 = 1800u32;
    pub const MAX_SECONDS_DB_IDLE: u16 = 360u16;
    pub const MAX_ITEMS_PER_INMEM_TABLE: u32 = 65536u32;
}
