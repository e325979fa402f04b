mod test_utils;

use dbconnect_async::{
    DbResult, DriverInfo, ManageConnection, Pool, PoolConfig, RequestSpec, RowMult, SqlType,
    SqlValue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_utils::{exec_int_rows, prepare_ok, session, StubServer};

#[tokio::test]
async fn pooled_driver_connections_are_reused() {
    test_utils::init_logger("info");
    let server = StubServer::start(vec![
        session(vec![prepare_ok(), exec_int_rows(&[1])]),
        session(vec![]),
    ]);
    let pool = dbconnect_async::connect_pool(
        &server.uri,
        &dbconnect_async::ConnectionConfiguration::default(),
        PoolConfig {
            max_size: Some(2),
            max_idle_size: Some(1),
            max_use_count: Some(100),
        },
        None,
    )
    .await
    .unwrap();

    let first = pool.get().await.unwrap();
    let second = pool.get().await.unwrap();
    assert_eq!(server.startup_count(), 2);
    drop(first);
    drop(second);
    assert_eq!(pool.idle_count().unwrap(), 1);

    let again = pool.get().await.unwrap();
    assert_eq!(again.use_count(), 2);
    let req = RequestSpec::prepared(
        SqlType::UNIT,
        SqlType::INT,
        RowMult::ZeroOrOne,
        "SELECT weight FROM seeds LIMIT 1",
    );
    let row = again.find_opt(&req, &SqlValue::Unit).await.unwrap();
    assert_eq!(row, Some(SqlValue::Int(1)));
    assert_eq!(server.startup_count(), 2);
}

struct CountingManager {
    connected: AtomicUsize,
    disconnected: AtomicUsize,
}

struct CountingManagerHandle(Arc<CountingManager>);

#[async_trait::async_trait]
impl ManageConnection for CountingManagerHandle {
    type Connection = usize;

    async fn connect(&self) -> DbResult<usize> {
        Ok(self.0.connected.fetch_add(1, Ordering::SeqCst))
    }

    async fn validate(&self, _conn: &mut usize) -> bool {
        true
    }

    fn disconnect(&self, _conn: usize) {
        self.0.disconnected.fetch_add(1, Ordering::SeqCst);
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

#[tokio::test]
async fn use_count_and_idle_bounds_dispose_connections() {
    let manager = Arc::new(CountingManager {
        connected: AtomicUsize::new(0),
        disconnected: AtomicUsize::new(0),
    });
    let pool = Pool::new(
        CountingManagerHandle(Arc::clone(&manager)),
        PoolConfig {
            max_size: Some(2),
            max_idle_size: Some(1),
            max_use_count: Some(2),
        },
        &info(),
    )
    .unwrap();

    let first = pool.get().await.unwrap();
    let second = pool.get().await.unwrap();
    drop(first);
    drop(second);
    assert_eq!(manager.disconnected.load(Ordering::SeqCst), 1);

    let again = pool.get().await.unwrap();
    assert_eq!(again.use_count(), 2);
    drop(again);
    assert_eq!(manager.disconnected.load(Ordering::SeqCst), 2);
    assert_eq!(pool.idle_count().unwrap(), 0);
}

#[tokio::test]
async fn acquisition_waits_at_the_capacity_bound() {
    let manager = Arc::new(CountingManager {
        connected: AtomicUsize::new(0),
        disconnected: AtomicUsize::new(0),
    });
    let pool = Pool::new(
        CountingManagerHandle(Arc::clone(&manager)),
        PoolConfig {
            max_size: Some(1),
            max_idle_size: Some(1),
            max_use_count: Some(100),
        },
        &info(),
    )
    .unwrap();

    let held = pool.get().await.unwrap();
    assert_eq!(pool.in_use_count(), 1);

    let pool2 = pool.clone();
    let waiter = tokio::spawn(async move {
        let conn = pool2.get().await.unwrap();
        conn.use_count()
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(held);
    let use_count = waiter.await.unwrap();
    assert_eq!(use_count, 2);
    assert_eq!(manager.connected.load(Ordering::SeqCst), 1);
}
