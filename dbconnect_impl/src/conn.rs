// The database connection: parameters for creating one, the transport, the
// protocol state machine, and authentication.

mod am_conn_core;
mod authentication;
mod connection_configuration;
mod connection_core;
mod params;
mod tcp_client;
pub(crate) mod xmutexed;

pub(crate) use {
    am_conn_core::AmConnCore,
    connection_core::{ConnectionCore, PreparedEntry, RequestPhase},
};

pub use {
    connection_configuration::{ConnectionConfiguration, NoticeProcessing},
    params::{
        connect_params::ConnectParams, connect_params_builder::ConnectParamsBuilder,
        into_connect_params::IntoConnectParams,
    },
};
