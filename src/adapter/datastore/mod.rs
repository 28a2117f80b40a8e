mod mariadb;

use std::boxed::Box;
use std::io::ErrorKind;
use std::result::Result;
use std::sync::Arc;

use crate::config::AppDataStoreCfg;
use crate::confidentiality::AbstractConfidentiality;
use crate::error::AppErrorCode;
use crate::logging::AppLogContext;

pub(crate) use mariadb::AppDStoreMariaDB;

#[derive(Debug)]
pub enum AppDStoreError {
    ConfidentialLoad(AppErrorCode, String),
    ConfidentialResolve(String),
    GetConnIo(ErrorKind, String),
    GetConnTls(String),
    GetConnDbDriver(String),
    GetConnDbServer(AppErrorCode, u16, String),
    GetConnUnclassified(AppErrorCode, String),
}

pub struct AppDataStoreContext {
    _mariadb: Option<Arc<AppDStoreMariaDB>>,
    _inmem_max_items: Option<u32>,
}

impl AppDataStoreContext {
    pub fn new(
        cfg: &AppDataStoreCfg,
        cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
        logctx: Arc<AppLogContext>,
    ) -> Result<Self, AppDStoreError> {
        match cfg {
            AppDataStoreCfg::InMemory(c) => Ok(Self {
                _mariadb: None,
                _inmem_max_items: Some(c.max_items),
            }),
            AppDataStoreCfg::DbServer(c) => {
                let db = AppDStoreMariaDB::try_build(c, cfdntl, logctx)?;
                Ok(Self {
                    _mariadb: Some(Arc::new(db)),
                    _inmem_max_items: None,
                })
            }
        }
    }

    pub(crate) fn mariadb(&self) -> Option<Arc<AppDStoreMariaDB>> {
        self._mariadb.clone()
    }

    pub(crate) fn inmem_max_items(&self) -> Option<u32> {
        self._inmem_max_items
    }
} // end of impl AppDataStoreContext
