use crate::{ConnectParams, DbResult};
use secstr::SecUtf8;
use std::collections::BTreeMap;

/// A builder for [`ConnectParams`].
///
/// ```rust
/// use dbconnect_impl::ConnectParams;
/// let params = ConnectParams::builder()
///     .hostname("db.example.org")
///     .port(5433)
///     .dbuser("alice")
///     .password("secret")
///     .dbname("accounting")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct ConnectParamsBuilder {
    scheme: String,
    hostname: String,
    port: u16,
    dbuser: Option<String>,
    password: SecUtf8,
    dbname: Option<String>,
    settings: BTreeMap<String, Vec<String>>,
    use_single_row_mode: Option<bool>,
    tweaks_version: Option<String>,
}

impl Default for ConnectParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectParamsBuilder {
    pub fn new() -> Self {
        Self {
            scheme: "postgresql".to_string(),
            hostname: "localhost".to_string(),
            port: 5432,
            dbuser: None,
            password: SecUtf8::from(String::new()),
            dbname: None,
            settings: BTreeMap::new(),
            use_single_row_mode: None,
            tweaks_version: None,
        }
    }

    /// Starts from a URI; explicitly set fields afterwards override its parts.
    pub fn from_endpoint_uri(uri: &str) -> DbResult<Self> {
        let params = ConnectParams::from_uri(uri)?;
        Ok(Self {
            scheme: params.scheme().to_string(),
            hostname: params.host().to_string(),
            port: params.port(),
            dbuser: Some(params.user().to_string()),
            password: params.password().clone(),
            dbname: Some(params.dbname().to_string()),
            settings: params.settings().clone(),
            use_single_row_mode: params.use_single_row_mode(),
            tweaks_version: params.tweaks_version().map(str::to_string),
        })
    }

    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn dbuser(mut self, dbuser: impl Into<String>) -> Self {
        self.dbuser = Some(dbuser.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = SecUtf8::from(password.into());
        self
    }

    #[must_use]
    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    /// Adds a passthrough setting; repeated keys accumulate and are
    /// CSV-joined in key/value form.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.entry(key.into()).or_default().push(value.into());
        self
    }

    #[must_use]
    pub fn use_single_row_mode(mut self, on: bool) -> Self {
        self.use_single_row_mode = Some(on);
        self
    }

    #[must_use]
    pub fn tweaks_version(mut self, version: impl Into<String>) -> Self {
        self.tweaks_version = Some(version.into());
        self
    }

    pub fn build(self) -> DbResult<ConnectParams> {
        let user = self.dbuser.unwrap_or_else(|| "postgres".to_string());
        let dbname = self.dbname.unwrap_or_else(|| user.clone());
        Ok(ConnectParams::new(
            self.scheme,
            self.hostname,
            self.port,
            user,
            self.password,
            dbname,
            self.settings,
            self.use_single_row_mode,
            self.tweaks_version,
        ))
    }
}
