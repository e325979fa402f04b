use crate::{ConnectParams, ConnectParamsBuilder, DbResult};

/// A trait for types that can describe a connection endpoint.
pub trait IntoConnectParams {
    /// Converts the value into a `ConnectParams`.
    fn into_connect_params(self) -> DbResult<ConnectParams>;
}

impl IntoConnectParams for ConnectParams {
    fn into_connect_params(self) -> DbResult<ConnectParams> {
        Ok(self)
    }
}

impl IntoConnectParams for &ConnectParams {
    fn into_connect_params(self) -> DbResult<ConnectParams> {
        Ok(self.clone())
    }
}

impl IntoConnectParams for &str {
    fn into_connect_params(self) -> DbResult<ConnectParams> {
        ConnectParams::from_uri(self)
    }
}

impl IntoConnectParams for String {
    fn into_connect_params(self) -> DbResult<ConnectParams> {
        ConnectParams::from_uri(&self)
    }
}

impl IntoConnectParams for &String {
    fn into_connect_params(self) -> DbResult<ConnectParams> {
        ConnectParams::from_uri(self)
    }
}

impl IntoConnectParams for url::Url {
    fn into_connect_params(self) -> DbResult<ConnectParams> {
        ConnectParams::from_uri(self.as_str())
    }
}

impl IntoConnectParams for ConnectParamsBuilder {
    fn into_connect_params(self) -> DbResult<ConnectParams> {
        self.build()
    }
}
