//! The process-wide scheme → driver registry.

use crate::{ConnectParams, ConnectionConfiguration, DbError, DbResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Static facts about a driver, consulted for capability gating and pool
/// defaults.
#[derive(Clone, Debug)]
pub struct DriverInfo {
    /// The canonical scheme.
    pub name: &'static str,
    /// Whether connections of this driver may be used from concurrent tasks
    /// (each connection still serialises its own requests).
    pub can_concur: bool,
    /// Whether connections may be kept idle and reused.
    pub can_pool: bool,
    /// Pool size used when the caller does not set one.
    pub default_max_size: usize,
    /// Idle bound used when the caller does not set one.
    pub default_max_idle_size: usize,
}

/// A database driver: static info plus one connect entry point per flavour.
#[cfg_attr(feature = "async", async_trait::async_trait)]
pub trait Driver: Send + Sync {
    fn info(&self) -> &DriverInfo;

    #[cfg(feature = "sync")]
    fn connect_sync(
        &self,
        params: &ConnectParams,
        config: &ConnectionConfiguration,
    ) -> DbResult<crate::sync::Connection>;

    #[cfg(feature = "async")]
    async fn connect_async(
        &self,
        params: &ConnectParams,
        config: &ConnectionConfiguration,
    ) -> DbResult<crate::a_sync::Connection>;
}

/// A hook for discovering drivers that are not registered; consulted at most
/// once per scheme.
pub type DriverLoader = fn(&str) -> Option<Arc<dyn Driver>>;

struct LoaderState {
    loader: Option<DriverLoader>,
    attempted: HashSet<String>,
}

lazy_static! {
    static ref REGISTRY: RwLock<HashMap<String, Arc<dyn Driver>>> = {
        let mut map: HashMap<String, Arc<dyn Driver>> = HashMap::new();
        let pg: Arc<dyn Driver> = Arc::new(crate::pg::PgDriver);
        map.insert("postgresql".to_string(), Arc::clone(&pg));
        map.insert("postgres".to_string(), pg);
        RwLock::new(map)
    };
    static ref LOADER: RwLock<LoaderState> = RwLock::new(LoaderState {
        loader: None,
        attempted: HashSet::new(),
    });
}

/// Registers a driver for a URI scheme. The registry grows monotonically;
/// re-registration replaces the entry.
pub fn register_driver(scheme: &str, driver: Arc<dyn Driver>) {
    if let Ok(mut map) = REGISTRY.write() {
        map.insert(scheme.to_string(), driver);
    }
}

/// Installs the dynamic discovery hook used for unknown schemes.
pub fn set_driver_loader(loader: DriverLoader) {
    if let Ok(mut state) = LOADER.write() {
        state.loader = Some(loader);
    }
}

pub(crate) fn load_driver(scheme: &str, uri: &str) -> DbResult<Arc<dyn Driver>> {
    if let Some(driver) = REGISTRY.read().map_err(|_| DbError::Poison)?.get(scheme) {
        return Ok(Arc::clone(driver));
    }
    let mut state = LOADER.write().map_err(|_| DbError::Poison)?;
    if state.attempted.insert(scheme.to_string()) {
        if let Some(loader) = state.loader {
            if let Some(driver) = loader(scheme) {
                debug!("dynamically discovered driver for scheme \"{scheme}\"");
                register_driver(scheme, Arc::clone(&driver));
                return Ok(driver);
            }
        }
    } else if let Some(driver) = REGISTRY.read().map_err(|_| DbError::Poison)?.get(scheme) {
        return Ok(Arc::clone(driver));
    }
    Err(DbError::LoadRejected {
        uri: uri.to_string(),
        detail: format!("no driver for scheme \"{scheme}\""),
    })
}
