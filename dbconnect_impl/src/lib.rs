//! Do not use this crate directly.
//!
//! This is the implementation crate for `dbconnect` and `dbconnect_async`.
//!
//! If you need a synchronous connector, use `dbconnect`.
//!
//! If you need an asynchronous connector, use `dbconnect_async`.
//!

#![deny(missing_debug_implementations)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![cfg_attr(not(any(feature = "sync", feature = "async")), allow(unused_imports))]
#![cfg_attr(not(any(feature = "sync", feature = "async")), allow(dead_code))]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

mod base;
mod conn;
mod db_error;
mod driver_registry;
mod pg;
mod pool_config;
mod protocol;
mod requests;
pub mod url;

#[cfg(feature = "async")]
pub mod a_sync;
#[cfg(feature = "sync")]
pub mod sync;

pub use crate::base::{
    CustomCodec, CustomType, PrimType, QueryTemplate, RequestSpec, RowMult, SqlType, SqlValue,
};
pub use crate::conn::{
    ConnectParams, ConnectParamsBuilder, ConnectionConfiguration, IntoConnectParams,
    NoticeProcessing,
};
pub use crate::db_error::{DbError, DbResult, ErrorMsg};
pub use crate::driver_registry::{register_driver, set_driver_loader, Driver, DriverInfo};
pub use crate::pool_config::{PoolConfig, DEFAULT_MAX_USE_COUNT};
pub use crate::protocol::{Cause, QueryResult, ResultStatus, ServerMsg, Severity};
