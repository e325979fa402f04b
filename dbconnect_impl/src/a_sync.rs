//! The asynchronous (tokio) API.

pub(crate) mod connection;
mod connector;
mod pool;
mod response;

pub use {
    connection::Connection,
    connector::{connect, connect_pool, connect_with, with_connection, ConnectionManager},
    pool::{ManageConnection, Pool, PooledConnection},
    response::Response,
};
