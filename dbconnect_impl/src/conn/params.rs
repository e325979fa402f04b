pub mod connect_params;
pub mod connect_params_builder;
pub mod into_connect_params;
