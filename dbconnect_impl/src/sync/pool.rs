//! A bounded connection pool for the synchronous API.

use crate::{
    pool_config::{effective_pool_sizes, PoolConfig, DEFAULT_MAX_USE_COUNT},
    DbResult, DriverInfo,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
};

/// The resource management hooks of a [`Pool`].
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send;

    /// Opens a fresh connection.
    fn connect(&self) -> DbResult<Self::Connection>;

    /// Decides whether an idle connection may be handed out, repairing it if
    /// possible.
    fn validate(&self, conn: &mut Self::Connection) -> bool;

    /// Decides whether a returned connection may be idled.
    fn check(&self, conn: &mut Self::Connection) -> bool {
        let _ = conn;
        true
    }

    /// Closes a connection that leaves the pool.
    fn disconnect(&self, conn: Self::Connection);
}

struct IdleEntry<C> {
    conn: C,
    use_count: u64,
}

struct PoolState<C> {
    idle: Vec<IdleEntry<C>>,
    // connections accounted to the pool: handed out plus idle
    total: usize,
}

struct PoolInner<M: ManageConnection> {
    manager: M,
    max_size: usize,
    max_idle_size: usize,
    max_use_count: u64,
    // once set, released connections are closed instead of idled
    draining: AtomicBool,
    state: Mutex<PoolState<M::Connection>>,
    available: Condvar,
}

/// A pool of connections with bounds on size, idle count, and per-connection
/// use count.
///
/// Acquisition beyond the size bound blocks until a connection is released.
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
                draining: AtomicBool::new(false),
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    total: 0,
                }),
                available: Condvar::new(),
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

    /// The number of connections currently accounted to the pool.
    pub fn size(&self) -> DbResult<usize> {
        Ok(self.inner.state.lock()?.total)
    }

    /// The number of idle connections.
    pub fn idle_count(&self) -> DbResult<usize> {
        Ok(self.inner.state.lock()?.idle.len())
    }

    /// Acquires a connection, waiting while the pool is at capacity.
    pub fn get(&self) -> DbResult<PooledConnection<M>> {
        let mut state = self.inner.state.lock()?;
        loop {
            if let Some(entry) = state.idle.pop() {
                drop(state);
                let IdleEntry {
                    mut conn,
                    use_count,
                } = entry;
                if self.inner.manager.validate(&mut conn) {
                    return Ok(self.guard(conn, use_count + 1));
                }
                // synthesise a fresh connection in place of the failed one
                debug!("idle connection failed validation; replacing it");
                self.inner.manager.disconnect(conn);
                return self.connect_into_slot();
            }
            if state.total < self.inner.max_size {
                state.total += 1;
                drop(state);
                return self.connect_into_slot();
            }
            trace!("pool at capacity; waiting for a release");
            state = self.inner.available.wait(state)?;
        }
    }

    /// Closes all idle connections; handed-out ones close on their eventual
    /// release.
    pub fn drain(&self) -> DbResult<()> {
        self.inner.draining.store(true, Ordering::SeqCst);
        let drained = {
            let mut state = self.inner.state.lock()?;
            let drained = std::mem::take(&mut state.idle);
            state.total -= drained.len();
            drained
        };
        for entry in drained {
            self.inner.manager.disconnect(entry.conn);
        }
        self.inner.available.notify_all();
        Ok(())
    }

    // The caller holds a reserved slot in `total`; it is given back on
    // failure.
    fn connect_into_slot(&self) -> DbResult<PooledConnection<M>> {
        match self.inner.manager.connect() {
            Ok(conn) => Ok(self.guard(conn, 1)),
            Err(e) => {
                if let Ok(mut state) = self.inner.state.lock() {
                    state.total -= 1;
                }
                self.inner.available.notify_one();
                Err(e)
            }
        }
    }

    fn guard(&self, conn: M::Connection, use_count: u64) -> PooledConnection<M> {
        PooledConnection {
            pool: self.clone(),
            conn: Some(conn),
            use_count,
        }
    }

    fn release(&self, conn: M::Connection, use_count: u64) {
        let mut conn = conn;
        let keep = !self.inner.draining.load(Ordering::SeqCst)
            && use_count < self.inner.max_use_count
            && self.inner.manager.check(&mut conn);
        if keep {
            if let Ok(mut state) = self.inner.state.lock() {
                if state.idle.len() < self.inner.max_idle_size {
                    state.idle.push(IdleEntry { conn, use_count });
                    drop(state);
                    self.inner.available.notify_one();
                    return;
                }
            } else {
                return;
            }
        }
        if let Ok(mut state) = self.inner.state.lock() {
            state.total -= 1;
        }
        self.inner.manager.disconnect(conn);
        self.inner.available.notify_one();
    }
}

/// A connection on loan from a [`Pool`]; returns on drop.
pub struct PooledConnection<M: ManageConnection> {
    pool: Pool<M>,
    conn: Option<M::Connection>,
    use_count: u64,
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
    }
}

#[cfg(test)]
mod tests {
    use super::{ManageConnection, Pool};
    use crate::{pool_config::PoolConfig, DbResult, DriverInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingManager {
        connected: AtomicUsize,
        disconnected: AtomicUsize,
    }

    impl CountingManager {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicUsize::new(0),
                disconnected: AtomicUsize::new(0),
            })
        }
    }

    impl ManageConnection for Arc<CountingManager> {
        type Connection = usize;

        fn connect(&self) -> DbResult<usize> {
            Ok(self.connected.fetch_add(1, Ordering::SeqCst))
        }

        fn validate(&self, _conn: &mut usize) -> bool {
            true
        }

        fn disconnect(&self, _conn: usize) {
            self.disconnected.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn info() -> DriverInfo {
        DriverInfo {
            name: "testdb",
            can_concur: true,
            can_pool: true,
            default_max_size: 8,
            default_max_idle_size: 8,
        }
    }

    fn pool(
        manager: Arc<CountingManager>,
        max_size: usize,
        max_idle_size: usize,
        max_use_count: u64,
    ) -> Pool<Arc<CountingManager>> {
        Pool::new(
            manager,
            PoolConfig {
                max_size: Some(max_size),
                max_idle_size: Some(max_idle_size),
                max_use_count: Some(max_use_count),
            },
            &info(),
        )
        .unwrap()
    }

    #[test]
    fn released_connections_are_reused() {
        let manager = CountingManager::new();
        let pool = pool(Arc::clone(&manager), 2, 2, 100);
        let c1 = pool.get().unwrap();
        drop(c1);
        let c2 = pool.get().unwrap();
        assert_eq!(c2.use_count(), 2);
        assert_eq!(manager.connected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn idle_bound_disposes_excess_releases() {
        let manager = CountingManager::new();
        let pool = pool(Arc::clone(&manager), 2, 1, 100);
        let c1 = pool.get().unwrap();
        let c2 = pool.get().unwrap();
        drop(c1);
        drop(c2);
        // one kept idle, one disposed
        assert_eq!(pool.idle_count().unwrap(), 1);
        assert_eq!(pool.size().unwrap(), 1);
        assert_eq!(manager.disconnected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn use_count_bound_disposes_worn_connections() {
        let manager = CountingManager::new();
        let pool = pool(Arc::clone(&manager), 2, 1, 2);
        drop(pool.get().unwrap()); // use 1, idled
        drop(pool.get().unwrap()); // use 2 reaches the bound, disposed
        assert_eq!(manager.connected.load(Ordering::SeqCst), 1);
        assert_eq!(manager.disconnected.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count().unwrap(), 0);
    }

    #[test]
    fn capacity_blocks_and_wakes_waiters() {
        let manager = CountingManager::new();
        let pool = pool(Arc::clone(&manager), 1, 1, 100);
        let held = pool.get().unwrap();
        let pool2 = pool.clone();
        let waiter = std::thread::spawn(move || pool2.get().map(|c| c.use_count()));
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(held);
        let use_count = waiter.join().unwrap().unwrap();
        assert_eq!(use_count, 2);
        assert_eq!(manager.connected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connections_released_after_drain_are_closed() {
        let manager = CountingManager::new();
        let pool = pool(Arc::clone(&manager), 2, 2, 100);
        let held = pool.get().unwrap();
        pool.drain().unwrap();
        drop(held);
        assert_eq!(pool.idle_count().unwrap(), 0);
        assert_eq!(pool.size().unwrap(), 0);
        assert_eq!(manager.disconnected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drain_closes_idle_connections() {
        let manager = CountingManager::new();
        let pool = pool(Arc::clone(&manager), 2, 2, 100);
        let c1 = pool.get().unwrap();
        drop(c1);
        assert_eq!(pool.idle_count().unwrap(), 1);
        pool.drain().unwrap();
        assert_eq!(pool.idle_count().unwrap(), 0);
        assert_eq!(pool.size().unwrap(), 0);
        assert_eq!(manager.disconnected.load(Ordering::SeqCst), 1);
    }
}
