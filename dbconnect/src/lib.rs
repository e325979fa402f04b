//! A polymorphic, synchronous database connector.
//!
//! Requests carry first-class descriptors of their parameter and row shapes
//! ([`SqlType`]); the connector binds parameter types, formats values to the
//! server's wire representation, decodes result rows, caches prepared
//! statements per connection, and pools connections.
//!
//! The PostgreSQL driver is built in and serves the `postgresql://` and
//! `postgres://` schemes; further drivers can be registered with
//! [`register_driver`].
//!
//! # Example
//!
//! ```rust,no_run
//! use dbconnect::{RequestSpec, RowMult, SqlType, SqlValue};
//!
//! # fn main() -> dbconnect::DbResult<()> {
//! let conn = dbconnect::connect("postgresql://user:pw@localhost/db")?;
//! let req = RequestSpec::prepared(
//!     SqlType::TEXT,
//!     SqlType::tup2(SqlType::INT, SqlType::TEXT),
//!     RowMult::ZeroOrMore,
//!     "SELECT id, name FROM seeds WHERE variety = ?",
//! );
//! let rows = conn.collect(&req, &SqlValue::from("perennial"))?;
//! # let _ = rows; Ok(())
//! # }
//! ```

pub use dbconnect_impl::sync::{
    connect, connect_pool, connect_with, with_connection, Connection, ConnectionManager,
    ManageConnection, Pool, PooledConnection, Response, RowStream,
};
pub use dbconnect_impl::{
    register_driver, set_driver_loader, Cause, ConnectParams, ConnectParamsBuilder,
    ConnectionConfiguration, CustomCodec, CustomType, DbError, DbResult, Driver, DriverInfo,
    ErrorMsg, IntoConnectParams, NoticeProcessing, PoolConfig, PrimType, QueryResult,
    QueryTemplate, RequestSpec, ResultStatus, RowMult, ServerMsg, Severity, SqlType, SqlValue,
    DEFAULT_MAX_USE_COUNT,
};

pub use dbconnect_impl::url;
