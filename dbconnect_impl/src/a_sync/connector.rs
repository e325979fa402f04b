//! URI → driver resolution and scoped connection helpers.

use crate::{
    a_sync::{
        pool::{ManageConnection, Pool},
        Connection,
    },
    driver_registry,
    pool_config::PoolConfig,
    ConnectParams, ConnectionConfiguration, DbResult, IntoConnectParams,
};
use std::future::Future;
use std::sync::Arc;

/// Resolves the driver for the endpoint's scheme and connects.
///
/// # Errors
///
/// `DbError::LoadRejected` if no driver serves the scheme; connect-phase
/// errors otherwise.
pub async fn connect<P: IntoConnectParams>(params: P) -> DbResult<Connection> {
    connect_with(params, &ConnectionConfiguration::default()).await
}

/// Like [`connect`], with an explicit configuration.
pub async fn connect_with<P: IntoConnectParams>(
    params: P,
    config: &ConnectionConfiguration,
) -> DbResult<Connection> {
    let params = params.into_connect_params()?;
    let driver = driver_registry::load_driver(params.scheme(), &params.to_string())?;
    driver.connect_async(&params, config).await
}

/// Runs `f` with a fresh connection and disconnects on all exit paths (on
/// unwind the connection closes through its teardown).
pub async fn with_connection<P, T, F, Fut>(params: P, f: F) -> DbResult<T>
where
    P: IntoConnectParams,
    F: FnOnce(Connection) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let connection = connect(params).await?;
    let outcome = f(connection.clone()).await;
    connection.disconnect().await;
    outcome
}

/// The post-connect hook of a pooled connector.
pub type PostConnect = Arc<dyn Fn(&Connection) -> DbResult<()> + Send + Sync>;

/// Opens driver connections for a [`Pool`].
pub struct ConnectionManager {
    params: ConnectParams,
    config: ConnectionConfiguration,
    post_connect: Option<PostConnect>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("params", &self.params)
            .field("config", &self.config)
            .field("post_connect", &self.post_connect.is_some())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a new `ConnectionManager`.
    pub fn new<P: IntoConnectParams>(params: P) -> DbResult<Self> {
        Ok(Self {
            params: params.into_connect_params()?,
            config: ConnectionConfiguration::default(),
            post_connect: None,
        })
    }

    /// Creates a new `ConnectionManager` with the provided configuration.
    pub fn with_configuration<P: IntoConnectParams>(
        params: P,
        config: &ConnectionConfiguration,
    ) -> DbResult<Self> {
        Ok(Self {
            params: params.into_connect_params()?,
            config: config.clone(),
            post_connect: None,
        })
    }

    /// Installs a hook that runs after each successful connect; its error
    /// fails the acquisition.
    #[must_use]
    pub fn with_post_connect(mut self, hook: PostConnect) -> Self {
        self.post_connect = Some(hook);
        self
    }
}

#[async_trait::async_trait]
impl ManageConnection for ConnectionManager {
    type Connection = Connection;

    async fn connect(&self) -> DbResult<Connection> {
        trace!("ConnectionManager::connect()");
        let connection = connect_with(&self.params, &self.config).await?;
        if let Some(ref hook) = self.post_connect {
            if let Err(e) = hook(&connection) {
                connection.disconnect().await;
                return Err(e);
            }
        }
        Ok(connection)
    }

    async fn validate(&self, conn: &mut Connection) -> bool {
        trace!("ConnectionManager::validate()");
        conn.validate().await
    }

    fn disconnect(&self, conn: Connection) {
        trace!("ConnectionManager::disconnect()");
        // the termination message goes out from the connection's teardown
        drop(conn);
    }
}

/// Builds a pool of driver connections, applying the driver's capability
/// gating to the requested sizes.
pub async fn connect_pool<P: IntoConnectParams>(
    params: P,
    config: &ConnectionConfiguration,
    pool_config: PoolConfig,
    post_connect: Option<PostConnect>,
) -> DbResult<Pool<ConnectionManager>> {
    let params = params.into_connect_params()?;
    let driver = driver_registry::load_driver(params.scheme(), &params.to_string())?;
    let info = driver.info().clone();
    let mut manager = ConnectionManager::with_configuration(params, config)?;
    if let Some(hook) = post_connect {
        manager = manager.with_post_connect(hook);
    }
    Pool::new(manager, pool_config, &info)
}
