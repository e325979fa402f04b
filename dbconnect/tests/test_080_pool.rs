mod test_utils;

use dbconnect::{
    DbResult, DriverInfo, ManageConnection, Pool, PoolConfig, RequestSpec, RowMult, SqlType,
    SqlValue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_utils::{exec_int_rows, prepare_ok, session, StubServer};

#[test]
fn pooled_driver_connections_are_reused_and_disposed() {
    test_utils::init_logger("info");
    let server = StubServer::start(vec![
        session(vec![prepare_ok(), exec_int_rows(&[1]), exec_int_rows(&[2])]),
        session(vec![]),
    ]);
    let pool = dbconnect::connect_pool(
        &server.uri,
        &dbconnect::ConnectionConfiguration::default(),
        PoolConfig {
            max_size: Some(2),
            max_idle_size: Some(1),
            max_use_count: Some(100),
        },
        None,
    )
    .unwrap();

    let first = pool.get().unwrap();
    let second = pool.get().unwrap();
    assert_eq!(server.startup_count(), 2);
    drop(first);
    drop(second);
    // one idled, one disposed (idle bound)
    assert_eq!(pool.idle_count().unwrap(), 1);
    assert_eq!(pool.size().unwrap(), 1);

    // the idle connection serves the next acquisition without a new connect
    let again = pool.get().unwrap();
    assert_eq!(again.use_count(), 2);
    let req = RequestSpec::prepared(
        SqlType::UNIT,
        SqlType::INT,
        RowMult::ZeroOrOne,
        "SELECT weight FROM seeds LIMIT 1",
    );
    let row = again.find_opt(&req, &SqlValue::Unit).unwrap();
    assert!(row.is_some());
    assert_eq!(server.startup_count(), 2);
}

struct CountingManager {
    connected: AtomicUsize,
    disconnected: AtomicUsize,
}

struct CountingManagerHandle(Arc<CountingManager>);

impl ManageConnection for CountingManagerHandle {
    type Connection = usize;

    fn connect(&self) -> DbResult<usize> {
        Ok(self.0.connected.fetch_add(1, Ordering::SeqCst))
    }

    fn validate(&self, _conn: &mut usize) -> bool {
        true
    }

    fn disconnect(&self, _conn: usize) {
        self.0.disconnected.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_pool(
    info: &DriverInfo,
    max_size: Option<usize>,
    max_idle_size: Option<usize>,
    max_use_count: u64,
) -> (Arc<CountingManager>, Pool<CountingManagerHandle>) {
    let manager = Arc::new(CountingManager {
        connected: AtomicUsize::new(0),
        disconnected: AtomicUsize::new(0),
    });
    let pool = Pool::new(
        CountingManagerHandle(Arc::clone(&manager)),
        PoolConfig {
            max_size,
            max_idle_size,
            max_use_count: Some(max_use_count),
        },
        info,
    )
    .unwrap();
    (manager, pool)
}

fn info(can_concur: bool, can_pool: bool) -> DriverInfo {
    DriverInfo {
        name: "testdb",
        can_concur,
        can_pool,
        default_max_size: 8,
        default_max_idle_size: 8,
    }
}

// Idle and use-count bounds: of two released connections one is disposed by
// the idle bound, and the survivor is disposed once its use count is spent.
#[test]
fn idle_and_use_count_bounds() {
    let (manager, pool) = counting_pool(&info(true, true), Some(2), Some(1), 2);

    let first = pool.get().unwrap();
    let second = pool.get().unwrap();
    drop(first);
    drop(second);
    assert_eq!(manager.disconnected.load(Ordering::SeqCst), 1);

    // the retained connection reaches its use bound on the second release
    let again = pool.get().unwrap();
    assert_eq!(again.use_count(), 2);
    drop(again);
    assert_eq!(manager.disconnected.load(Ordering::SeqCst), 2);
    assert_eq!(pool.idle_count().unwrap(), 0);
}

// A non-concurrent poolable driver with a zero idle request keeps a single
// always-fresh slot.
#[test]
fn capability_gating_limits_the_sizes() {
    let (_manager, pool) = counting_pool(&info(false, true), Some(5), Some(0), 100);
    assert_eq!(pool.max_size(), 1);
    assert_eq!(pool.max_idle_size(), 0);

    let (_manager, pool) = counting_pool(&info(false, true), Some(5), Some(3), 100);
    assert_eq!(pool.max_size(), 1);
    assert_eq!(pool.max_idle_size(), 1);

    let (_manager, pool) = counting_pool(&info(true, false), Some(5), Some(3), 100);
    assert_eq!(pool.max_size(), 5);
    assert_eq!(pool.max_idle_size(), 0);
}

#[test]
fn outstanding_connections_never_exceed_the_bound() {
    let (manager, pool) = counting_pool(&info(true, true), Some(3), Some(3), 1000);
    let mut handles = Vec::new();
    for _ in 0..3 {
        handles.push(pool.get().unwrap());
    }
    assert_eq!(pool.size().unwrap(), 3);

    // further acquisitions wait until a release
    let pool2 = pool.clone();
    let waiter = std::thread::spawn(move || pool2.get().map(drop));
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(pool.size().unwrap(), 3);
    handles.pop();
    waiter.join().unwrap().unwrap();
    assert!(manager.connected.load(Ordering::SeqCst) <= 3);
}

#[test]
fn invalid_idle_connections_are_replaced() {
    struct FlakyManager {
        connected: AtomicUsize,
    }
    struct FlakyManagerHandle(Arc<FlakyManager>);
    impl ManageConnection for FlakyManagerHandle {
        type Connection = usize;
        fn connect(&self) -> DbResult<usize> {
            Ok(self.0.connected.fetch_add(1, Ordering::SeqCst))
        }
        fn validate(&self, _conn: &mut usize) -> bool {
            false // every idle connection has gone stale
        }
        fn disconnect(&self, _conn: usize) {}
    }

    let manager = Arc::new(FlakyManager {
        connected: AtomicUsize::new(0),
    });
    let pool = Pool::new(
        FlakyManagerHandle(Arc::clone(&manager)),
        PoolConfig {
            max_size: Some(1),
            max_idle_size: Some(1),
            max_use_count: Some(100),
        },
        &info(true, true),
    )
    .unwrap();

    drop(pool.get().unwrap());
    let fresh = pool.get().unwrap();
    assert_eq!(fresh.use_count(), 1);
    assert_eq!(manager.connected.load(Ordering::SeqCst), 2);
}
