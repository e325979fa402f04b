// The PostgreSQL v3 wire vocabulary: frontend message builders, backend
// message parsing, and response classification.

pub(crate) mod backend;
pub(crate) mod frontend;
mod query_result;
mod server_msg;

pub(crate) use query_result::{
    anomaly_to_error, check_query_result, classify_result, ResponseAnomaly,
};
pub use {
    query_result::{QueryResult, ResultStatus},
    server_msg::{Cause, Severity, ServerMsg},
};
