//! A bounded connection pool for the asynchronous API.

use crate::{
    pool_config::{effective_pool_sizes, PoolConfig, DEFAULT_MAX_USE_COUNT},
    DbError, DbResult, DriverInfo,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The resource management hooks of a [`Pool`].
#[async_trait::async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send;

    /// Opens a fresh connection.
    async fn connect(&self) -> DbResult<Self::Connection>;

    /// Decides whether an idle connection may be handed out, repairing it if
    /// possible.
    async fn validate(&self, conn: &mut Self::Connection) -> bool;

    /// Decides whether a returned connection may be idled.
    fn check(&self, conn: &mut Self::Connection) -> bool {
        let _ = conn;
        true
    }

    /// Closes a connection that leaves the pool. Cleanup that needs the
    /// runtime happens from the connection's own teardown.
    fn disconnect(&self, conn: Self::Connection);
}

struct IdleEntry<C> {
    conn: C,
    use_count: u64,
}

struct PoolInner<M: ManageConnection> {
    manager: M,
    max_size: usize,
    max_idle_size: usize,
    max_use_count: u64,
    // one permit per connection that may be handed out
    semaphore: Arc<Semaphore>,
    // once set, released connections are closed instead of idled
    draining: AtomicBool,
    idle: Mutex<Vec<IdleEntry<M::Connection>>>,
}

/// A pool of connections with bounds on size, idle count, and per-connection
/// use count.
///
/// Acquisition beyond the size bound waits until a connection is released.
pub struct Pool<M: ManageConnection> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ManageConnection> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ManageConnection> std::fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("max_size", &self.inner.max_size)
            .field("max_idle_size", &self.inner.max_idle_size)
            .field("max_use_count", &self.inner.max_use_count)
            .finish()
    }
}

impl<M: ManageConnection> Pool<M> {
    /// Creates a pool; the requested sizes are validated and gated by the
    /// driver's capabilities.
    pub fn new(manager: M, config: PoolConfig, info: &DriverInfo) -> DbResult<Self> {
        let (max_size, max_idle_size) = effective_pool_sizes(info, &config)?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                manager,
                max_size,
                max_idle_size,
                max_use_count: config.max_use_count.unwrap_or(DEFAULT_MAX_USE_COUNT),
                semaphore: Arc::new(Semaphore::new(max_size)),
                draining: AtomicBool::new(false),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// The effective size bound after capability gating.
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// The effective idle bound after capability gating.
    pub fn max_idle_size(&self) -> usize {
        self.inner.max_idle_size
    }

    /// The number of connections currently handed out.
    pub fn in_use_count(&self) -> usize {
        self.inner.max_size - self.inner.semaphore.available_permits()
    }

    /// The number of idle connections.
    pub fn idle_count(&self) -> DbResult<usize> {
        Ok(self.inner.idle.lock().map_err(|_| DbError::Poison)?.len())
    }

    /// Acquires a connection, waiting while the pool is at capacity.
    pub async fn get(&self) -> DbResult<PooledConnection<M>> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| DbError::Usage("pool is closed"))?;
        let idle_entry = self
            .inner
            .idle
            .lock()
            .map_err(|_| DbError::Poison)?
            .pop();
        match idle_entry {
            Some(mut entry) => {
                if self.inner.manager.validate(&mut entry.conn).await {
                    return Ok(self.guard(entry.conn, entry.use_count + 1, permit));
                }
                // synthesise a fresh connection in place of the failed one
                debug!("idle connection failed validation; replacing it");
                self.inner.manager.disconnect(entry.conn);
                let conn = self.inner.manager.connect().await?;
                Ok(self.guard(conn, 1, permit))
            }
            None => {
                let conn = self.inner.manager.connect().await?;
                Ok(self.guard(conn, 1, permit))
            }
        }
    }

    /// Closes all idle connections; handed-out ones close on their eventual
    /// release.
    pub fn drain(&self) -> DbResult<()> {
        self.inner.draining.store(true, Ordering::SeqCst);
        let drained = {
            let mut idle = self.inner.idle.lock().map_err(|_| DbError::Poison)?;
            std::mem::take(&mut *idle)
        };
        for entry in drained {
            self.inner.manager.disconnect(entry.conn);
        }
        Ok(())
    }

    fn guard(
        &self,
        conn: M::Connection,
        use_count: u64,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection<M> {
        PooledConnection {
            pool: self.clone(),
            conn: Some(conn),
            use_count,
            _permit: permit,
        }
    }

    fn release(&self, conn: M::Connection, use_count: u64) {
        let mut conn = conn;
        let keep = !self.inner.draining.load(Ordering::SeqCst)
            && use_count < self.inner.max_use_count
            && self.inner.manager.check(&mut conn);
        if keep {
            if let Ok(mut idle) = self.inner.idle.lock() {
                if idle.len() < self.inner.max_idle_size {
                    idle.push(IdleEntry { conn, use_count });
                    return;
                }
            } else {
                return;
            }
        }
        self.inner.manager.disconnect(conn);
    }
}

/// A connection on loan from a [`Pool`]; returns on drop.
pub struct PooledConnection<M: ManageConnection> {
    pool: Pool<M>,
    conn: Option<M::Connection>,
    use_count: u64,
    _permit: OwnedSemaphorePermit,
}

impl<M: ManageConnection> PooledConnection<M> {
    /// How often the underlying connection has been handed out.
    pub fn use_count(&self) -> u64 {
        self.use_count
    }
}

impl<M: ManageConnection> std::fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("use_count", &self.use_count)
            .finish()
    }
}

impl<M: ManageConnection> std::ops::Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<M: ManageConnection> std::ops::DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.use_count);
        }
        // the permit drops afterwards, freeing the capacity slot
    }
}
