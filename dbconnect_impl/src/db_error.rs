use crate::protocol::{Cause, ServerMsg};
use thiserror::Error;

/// A list specifying categories of [`DbError`](crate::DbError).
///
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DbError {
    /// The URI could not be mapped to a driver.
    #[error("cannot load driver for {uri}: {detail}")]
    LoadRejected {
        /// The URI for which driver resolution failed.
        uri: String,
        detail: String,
    },

    /// The server refused to establish a connection.
    #[error("failed to connect to {uri}: {msg}")]
    ConnectFailed { uri: String, msg: ErrorMsg },

    /// The connection was established, but session setup failed.
    #[error("session setup failed for {uri}")]
    PostConnect {
        uri: String,
        /// The causing error.
        source: Box<DbError>,
    },

    /// Wire-level or transport failure during a send/await cycle.
    #[error("request to {uri} failed{}: {msg}", for_query(.query))]
    RequestFailed {
        uri: String,
        query: Option<String>,
        msg: ErrorMsg,
    },

    /// The server responded, but the response violates the request's contract.
    #[error("unexpected response from {uri}{}: {detail}", for_query(.query))]
    ResponseRejected {
        uri: String,
        query: Option<String>,
        detail: String,
    },

    /// No parameter encoding is available for the given type.
    #[error("no parameter encoding for {sql_type} towards {uri}")]
    EncodeMissing { uri: String, sql_type: String },

    /// A parameter encoding refused the given value.
    #[error("cannot encode parameter as {sql_type} for {uri}: {detail}")]
    EncodeRejected {
        uri: String,
        sql_type: String,
        detail: String,
    },

    /// No row decoding is available for the given type.
    #[error("no row decoding for {sql_type} from {uri}")]
    DecodeMissing { uri: String, sql_type: String },

    /// A row cell could not be decoded to the given type.
    #[error("cannot decode row field as {sql_type} from {uri}: {detail}")]
    DecodeRejected {
        uri: String,
        sql_type: String,
        detail: String,
    },

    /// Operation is not meaningful for the current response.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Error caused by wrong usage.
    #[error("wrong usage: {0}")]
    Usage(&'static str),

    /// Error occured in thread synchronization.
    #[error("error occured in thread synchronization")]
    Poison,
}

/// Abbreviation of `Result<T, DbError>`.
pub type DbResult<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Returns the contained [`ServerMsg`], if any.
    ///
    /// This method helps in case you need programmatic access to e.g. the SQLSTATE.
    #[must_use]
    pub fn server_msg(&self) -> Option<&ServerMsg> {
        match self {
            Self::ConnectFailed { msg, .. } | Self::RequestFailed { msg, .. } => match msg {
                ErrorMsg::Server(server_msg) => Some(server_msg),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the categorical cause derived from the server's SQLSTATE, if any.
    #[must_use]
    pub fn cause(&self) -> Option<Cause> {
        self.server_msg().map(ServerMsg::cause)
    }

    /// Returns the query text the failing request was built from, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::RequestFailed { query, .. } | Self::ResponseRejected { query, .. } => {
                query.as_deref()
            }
            _ => None,
        }
    }

    // Attaches the query text to request-phase errors that lack one.
    pub(crate) fn with_query(self, sql: &str) -> Self {
        match self {
            Self::RequestFailed {
                uri,
                query: None,
                msg,
            } => Self::RequestFailed {
                uri,
                query: Some(sql.to_string()),
                msg,
            },
            Self::ResponseRejected {
                uri,
                query: None,
                detail,
            } => Self::ResponseRejected {
                uri,
                query: Some(sql.to_string()),
                detail,
            },
            other => other,
        }
    }

    // A transport-level loss of the connection, as opposed to a protocol anomaly.
    // Only this class of error is eligible for reconnect-and-retry.
    pub(crate) fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed {
                msg: ErrorMsg::Connection { .. },
                ..
            }
        )
    }
}

#[cfg(feature = "sync")]
impl<G> From<std::sync::PoisonError<G>> for DbError {
    fn from(_error: std::sync::PoisonError<G>) -> Self {
        Self::Poison
    }
}

/// The message payload of a connection- or request-phase error.
///
/// The pretty-printer dispatches on the variant; [`ErrorMsg::cause`] exposes
/// the categorical cause for server-reported errors.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorMsg {
    /// Failure reported while establishing the session.
    Connect { detail: String },
    /// Transport-level failure on an established connection.
    Connection {
        /// The causing I/O error.
        source: std::io::Error,
    },
    /// An error reported by the server in response to a request.
    Server(ServerMsg),
    /// A response that could not be interpreted.
    Protocol { detail: String },
}

impl ErrorMsg {
    /// Maps the server's SQLSTATE to a categorical cause, where one is carried.
    #[must_use]
    pub fn cause(&self) -> Option<Cause> {
        match self {
            Self::Server(msg) => Some(msg.cause()),
            _ => None,
        }
    }

    pub(crate) fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ErrorMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Connect { detail } => write!(f, "{detail}"),
            Self::Connection { source } => write!(f, "connection lost: {source}"),
            Self::Server(msg) => write!(f, "{msg}"),
            Self::Protocol { detail } => write!(f, "{detail}"),
        }
    }
}

fn for_query(query: &Option<String>) -> String {
    match query {
        Some(q) => format!(" for query \"{q}\""),
        None => String::new(),
    }
}
