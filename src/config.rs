use std::collections::hash_map::RandomState;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::result::Result as DefaultResult;

use serde::de::{Error as DeserializeError, Expected};
use serde::Deserialize;

use crate::constant::{env_vars, logging as const_log};
use crate::error::{AppCfgError, AppErrorCode};
use crate::AppLogAlias;

#[derive(Deserialize)]
pub struct AppLogHandlerCfg {
    pub min_level: const_log::Level,
    pub destination: const_log::Destination,
    pub alias: AppLogAlias,
    pub path: Option<String>,
}

#[derive(Deserialize)]
pub struct AppLoggerCfg {
    pub alias: AppLogAlias,
    pub handlers: Vec<String>,
    pub level: Option<const_log::Level>,
}

#[derive(Deserialize)]
pub struct AppLoggingCfg {
    pub handlers: Vec<AppLogHandlerCfg>,
    pub loggers: Vec<AppLoggerCfg>,
}

#[derive(Deserialize, Debug)]
pub struct AppDbServerCfg {
    #[serde(deserialize_with = "jsn_deny_empty_string")]
    pub alias: String,
    pub max_conns: u32,
    pub idle_timeout_secs: u16,
    pub confidentiality_path: String,
    pub db_name: String,
}

#[derive(Deserialize, Debug)]
pub struct AppInMemoryDbCfg {
    #[serde(deserialize_with = "jsn_deny_empty_string")]
    pub alias: String,
    pub max_items: u32,
}

#[allow(non_camel_case_types)]
#[derive(Deserialize)]
#[serde(tag = "_type")]
pub enum AppDataStoreCfg {
    InMemory(AppInMemoryDbCfg),
    DbServer(AppDbServerCfg),
}

#[derive(Deserialize)]
pub struct AppRedisCacheCfg {
    #[serde(deserialize_with = "jsn_deny_empty_string")]
    pub confidentiality_path: String,
    pub db_index: u8,
}

#[allow(non_camel_case_types)]
#[derive(Deserialize)]
#[serde(tag = "_type")]
pub enum AppCacheStoreCfg {
    InMemory(AppInMemoryDbCfg),
    Redis(AppRedisCacheCfg),
}

#[derive(Deserialize)]
pub struct AppAmqpBindingCfg {
    #[serde(deserialize_with = "jsn_deny_empty_string")]
    pub queue: String,
    #[serde(deserialize_with = "jsn_deny_empty_string")]
    pub exchange: String,
    #[serde(deserialize_with = "jsn_deny_empty_string")]
    pub routing_key: String,
    pub ttl_secs: u16,
    pub max_length: u32, // max number of messages preserved in the queue
    pub durable: bool,
}

#[derive(Deserialize)]
pub struct AppAmqpAttriCfg {
    #[serde(deserialize_with = "jsn_deny_empty_string")]
    pub vhost: String,
    pub max_channels: u16,
    pub timeout_secs: u16,
}

#[derive(Deserialize)]
pub struct AppAmqpQueueCfg {
    pub binding: Arc<AppAmqpBindingCfg>,
    pub attributes: AppAmqpAttriCfg,
    pub max_connections: u16,
    #[serde(deserialize_with = "jsn_deny_empty_string")]
    pub confidential_id: String,
}

#[allow(non_camel_case_types)]
#[derive(Deserialize)]
#[serde(tag = "handler_type")]
pub enum AppQueueCfg {
    Mock,
    AMQP(AppAmqpQueueCfg),
}

#[derive(Deserialize)]
#[serde(tag = "source")]
pub enum AppConfidentialCfg {
    UserSpace {
        #[serde(deserialize_with = "jsn_deny_empty_string")]
        sys_path: String,
    }, // TODO, support kernel key management utility
}

#[derive(Deserialize)]
pub struct AppServiceCfg {
    pub logging: AppLoggingCfg,
    pub data_store: AppDataStoreCfg,
    pub cache_store: AppCacheStoreCfg,
    pub intent_queue: AppQueueCfg,
    pub confidentiality: AppConfidentialCfg,
    pub num_fulfill_consumers: u8,
}

pub struct AppBasepathCfg {
    pub system: String,
    pub service: String,
}

pub struct AppConfig {
    pub basepath: AppBasepathCfg,
    pub service: AppServiceCfg,
}

pub struct AppCfgHardLimit {
    pub nitems_per_inmem_table: u32,
    pub num_db_conns: u32,
    pub seconds_db_idle: u16,
}
pub struct AppCfgInitArgs {
    pub env_var_map: HashMap<String, String, RandomState>,
    pub limit: AppCfgHardLimit,
}

impl AppConfig {
    pub fn new(args: AppCfgInitArgs) -> DefaultResult<Self, AppCfgError> {
        let (mut env_var_map, limit) = (args.env_var_map, args.limit);
        let sys_basepath = if let Some(s) = env_var_map.remove(env_vars::SYS_BASEPATH) {
            s + "/"
        } else {
            return Err(AppCfgError {
                detail: None,
                code: AppErrorCode::MissingSysBasePath,
            });
        };
        let app_basepath = if let Some(a) = env_var_map.remove(env_vars::SERVICE_BASEPATH) {
            a + "/"
        } else {
            return Err(AppCfgError {
                detail: None,
                code: AppErrorCode::MissingAppBasePath,
            });
        };
        let service_cfg = if let Some(cfg_path) = env_var_map.remove(env_vars::CFG_FILEPATH) {
            let fullpath = app_basepath.clone() + &cfg_path;
            Self::parse_from_file(fullpath, limit)?
        } else {
            return Err(AppCfgError {
                detail: None,
                code: AppErrorCode::MissingConfigPath,
            });
        };
        Ok(Self {
            service: service_cfg,
            basepath: AppBasepathCfg {
                system: sys_basepath,
                service: app_basepath,
            },
        })
    } // end of fn new

    pub fn parse_from_file(
        filepath: String,
        limit: AppCfgHardLimit,
    ) -> DefaultResult<AppServiceCfg, AppCfgError> {
        // load and parse a config file with given path
        match File::open(filepath) {
            Ok(fileobj) => {
                let reader = BufReader::new(fileobj);
                match serde_json::from_reader::<BufReader<File>, AppServiceCfg>(reader) {
                    Ok(jsnobj) => {
                        Self::_check_logging(&jsnobj.logging)?;
                        Self::_check_datastore(&jsnobj.data_store, &limit)?;
                        Self::_check_cachestore(&jsnobj.cache_store, &limit)?;
                        Self::_check_queue(&jsnobj.intent_queue)?;
                        Ok(jsnobj)
                    }
                    Err(e) => Err(AppCfgError {
                        detail: Some(e.to_string()),
                        code: AppErrorCode::InvalidJsonFormat,
                    }),
                }
            }
            Err(e) => Err(AppCfgError {
                detail: Some(e.to_string()),
                code: AppErrorCode::IOerror(e.kind()),
            }),
        }
    }

    fn _check_logging(obj: &AppLoggingCfg) -> DefaultResult<(), AppCfgError> {
        let mut filtered = obj.loggers.iter().filter(|item| item.handlers.is_empty());
        let mut filtered2 = obj.handlers.iter().filter(|item| match &item.destination {
            const_log::Destination::LOCALFS => item.path.is_none(),
            _other => false,
        }); // for file-type handler, the field `path` has to be provided
        let mut filtered3 = obj.handlers.iter().filter(|item| item.alias.is_empty());
        let mut filtered4 = obj.loggers.iter().filter(|item| item.alias.is_empty());
        if obj.handlers.is_empty() {
            Err(AppCfgError {
                detail: None,
                code: AppErrorCode::NoLogHandlerCfg,
            })
        } else if obj.loggers.is_empty() {
            Err(AppCfgError {
                detail: None,
                code: AppErrorCode::NoLoggerCfg,
            })
        } else if let Some(alogger) = filtered.next() {
            let msg = format!("the logger does not have handler: {}", alogger.alias);
            Err(AppCfgError {
                detail: Some(msg),
                code: AppErrorCode::NoHandlerInLoggerCfg,
            })
        } else if let Some(_hdlr) = filtered3.next() {
            Err(AppCfgError {
                detail: None,
                code: AppErrorCode::MissingAliasLogHdlerCfg,
            })
        } else if let Some(_logger) = filtered4.next() {
            Err(AppCfgError {
                detail: None,
                code: AppErrorCode::MissingAliasLoggerCfg,
            })
        } else if let Some(alogger) = filtered2.next() {
            let msg = format!("file-type handler does not contain path: {}", alogger.alias);
            Err(AppCfgError {
                detail: Some(msg),
                code: AppErrorCode::InvalidHandlerLoggerCfg,
            })
        } else {
            let iter = obj.handlers.iter().map(|i| i.alias.as_str());
            let hdlr_alias_map: HashSet<&str> = HashSet::from_iter(iter);
            let mut filtered = obj.loggers.iter().filter(|item| {
                let mut inner_iter = item
                    .handlers
                    .iter()
                    .filter(|i| !hdlr_alias_map.contains(i.as_str()));
                inner_iter.next().is_some()
            }); // handler alias in each logger has to be present
            if let Some(alogger) = filtered.next() {
                let msg = format!(
                    "the logger contains invalid handler alias: {}",
                    alogger.alias
                );
                Err(AppCfgError {
                    detail: Some(msg),
                    code: AppErrorCode::InvalidHandlerLoggerCfg,
                })
            } else {
                Ok(())
            }
        }
    } // end of fn _check_logging

    fn _check_datastore(
        obj: &AppDataStoreCfg,
        limit: &AppCfgHardLimit,
    ) -> DefaultResult<(), AppCfgError> {
        match obj {
            AppDataStoreCfg::InMemory(c) => Self::_check_inmem_limit(c, limit),
            AppDataStoreCfg::DbServer(c) => {
                let lmt_conn = limit.num_db_conns;
                let lmt_idle = limit.seconds_db_idle;
                if c.max_conns > lmt_conn {
                    Err(AppCfgError {
                        detail: Some(format!("limit-conn:{}", lmt_conn)),
                        code: AppErrorCode::ExceedingMaxLimit,
                    })
                } else if c.idle_timeout_secs > lmt_idle {
                    Err(AppCfgError {
                        detail: Some(format!("limit-idle-time:{}", lmt_idle)),
                        code: AppErrorCode::ExceedingMaxLimit,
                    })
                } else {
                    Ok(())
                }
            }
        }
    } // end of fn _check_datastore

    fn _check_cachestore(
        obj: &AppCacheStoreCfg,
        limit: &AppCfgHardLimit,
    ) -> DefaultResult<(), AppCfgError> {
        match obj {
            AppCacheStoreCfg::InMemory(c) => Self::_check_inmem_limit(c, limit),
            AppCacheStoreCfg::Redis(_c) => Ok(()),
        }
    }

    fn _check_inmem_limit(
        c: &AppInMemoryDbCfg,
        limit: &AppCfgHardLimit,
    ) -> DefaultResult<(), AppCfgError> {
        let lmt = limit.nitems_per_inmem_table;
        if c.max_items > lmt {
            Err(AppCfgError {
                detail: Some(format!("limit:{}", lmt)),
                code: AppErrorCode::ExceedingMaxLimit,
            })
        } else {
            Ok(())
        }
    }

    fn _check_queue(obj: &AppQueueCfg) -> DefaultResult<(), AppCfgError> {
        match obj {
            AppQueueCfg::Mock => Ok(()),
            AppQueueCfg::AMQP(c) => {
                let b = &c.binding;
                if b.queue.is_empty() || b.exchange.is_empty() || b.routing_key.is_empty() {
                    Err(AppCfgError {
                        detail: Some("intent-queue".to_string()),
                        code: AppErrorCode::NoQueueBindingCfg,
                    })
                } else {
                    Ok(())
                }
            }
        }
    } // end of fn _check_queue
} // end of impl AppConfig

struct ExpectNonEmptyString {
    min_len: u32,
}

impl Expected for ExpectNonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        let msg = format!("minimum string length >= {}", self.min_len);
        formatter.write_str(msg.as_str())
    }
}

fn jsn_deny_empty_string<'de, D>(raw: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match String::deserialize(raw) {
        Ok(s) => {
            if s.is_empty() {
                let unexp = s.len();
                let exp = ExpectNonEmptyString { min_len: 1 };
                Err(DeserializeError::invalid_length(unexp, &exp))
            } else {
                Ok(s)
            }
        }
        Err(e) => Err(e),
    }
}
