use crate::{protocol::ServerMsg, RowMult};

/// Classification of one server response, following the C client library's
/// result-status vocabulary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultStatus {
    /// A command that returns no rows completed.
    CommandOk,
    /// A row-returning request completed; in single-row mode this is the
    /// empty terminating result.
    TuplesOk,
    /// One row of a single-row-mode response.
    SingleTuple,
    /// The query string was empty.
    EmptyQuery,
    /// The server asks for COPY FROM STDIN data.
    CopyIn,
    /// The server announces COPY TO STDOUT data.
    CopyOut,
    /// The server's response could not be interpreted.
    BadResponse,
    /// A warning was received; the request itself succeeded.
    NonfatalError,
    /// The request failed.
    FatalError,
}

/// One response from the server: a status, any rows delivered with it, the
/// command tag, and the server error for failed requests.
#[derive(Debug)]
pub struct QueryResult {
    pub(crate) status: ResultStatus,
    pub(crate) rows: Vec<Vec<Option<String>>>,
    pub(crate) command_tag: String,
    pub(crate) error: Option<ServerMsg>,
}

impl QueryResult {
    pub(crate) fn command_ok(tag: String) -> Self {
        Self {
            status: ResultStatus::CommandOk,
            rows: Vec::new(),
            command_tag: tag,
            error: None,
        }
    }

    pub(crate) fn tuples(rows: Vec<Vec<Option<String>>>, tag: String) -> Self {
        Self {
            status: ResultStatus::TuplesOk,
            rows,
            command_tag: tag,
            error: None,
        }
    }

    pub(crate) fn single_tuple(row: Vec<Option<String>>) -> Self {
        Self {
            status: ResultStatus::SingleTuple,
            rows: vec![row],
            command_tag: String::new(),
            error: None,
        }
    }

    pub(crate) fn empty_query() -> Self {
        Self {
            status: ResultStatus::EmptyQuery,
            rows: Vec::new(),
            command_tag: String::new(),
            error: None,
        }
    }

    pub(crate) fn copy_in() -> Self {
        Self {
            status: ResultStatus::CopyIn,
            rows: Vec::new(),
            command_tag: String::new(),
            error: None,
        }
    }

    pub(crate) fn copy_out() -> Self {
        Self {
            status: ResultStatus::CopyOut,
            rows: Vec::new(),
            command_tag: String::new(),
            error: None,
        }
    }

    pub(crate) fn bad_response() -> Self {
        Self {
            status: ResultStatus::BadResponse,
            rows: Vec::new(),
            command_tag: String::new(),
            error: None,
        }
    }

    pub(crate) fn fatal(msg: ServerMsg) -> Self {
        Self {
            status: ResultStatus::FatalError,
            rows: Vec::new(),
            command_tag: String::new(),
            error: Some(msg),
        }
    }

    #[must_use]
    pub fn status(&self) -> ResultStatus {
        self.status
    }

    /// The number of rows delivered with this result.
    #[must_use]
    pub fn ntuples(&self) -> usize {
        self.rows.len()
    }

    /// The number of rows the completed command reports as affected; 0 when
    /// the command tag carries no count (`BEGIN`, `SET`, …).
    #[must_use]
    pub fn affected_count(&self) -> usize {
        self.command_tag
            .rsplit(' ')
            .next()
            .and_then(|word| word.parse().ok())
            .unwrap_or(0)
    }
}

/// Classifies one response against the request's contract, converting an
/// anomaly into the error value for the given endpoint and query.
pub(crate) fn classify_result(
    uri: String,
    row_mult: RowMult,
    single_row_mode: bool,
    result: &QueryResult,
    sql: &str,
) -> crate::DbResult<()> {
    check_query_result(row_mult, single_row_mode, result)
        .map_err(|anomaly| anomaly_to_error(uri, anomaly, sql))
}

pub(crate) fn anomaly_to_error(
    uri: String,
    anomaly: ResponseAnomaly,
    sql: &str,
) -> crate::DbError {
    use crate::{DbError, ErrorMsg};
    match anomaly {
        ResponseAnomaly::Reject { detail } => DbError::ResponseRejected {
            uri,
            query: Some(sql.to_string()),
            detail,
        },
        ResponseAnomaly::Fail { detail } => DbError::RequestFailed {
            uri,
            query: Some(sql.to_string()),
            msg: ErrorMsg::protocol(detail),
        },
        ResponseAnomaly::FailServer { msg } => DbError::RequestFailed {
            uri,
            query: Some(sql.to_string()),
            msg: ErrorMsg::Server(msg),
        },
    }
}

/// The ways a response can violate a request's contract.
#[derive(Debug)]
pub(crate) enum ResponseAnomaly {
    /// The response shape contradicts the request descriptor.
    Reject { detail: String },
    /// The request itself failed at the wire or server level.
    Fail { detail: String },
    /// The request failed with a server-reported error.
    FailServer { msg: ServerMsg },
}

/// Decides whether one response satisfies the request's row-multiplicity
/// contract, given whether single-row delivery was requested.
pub(crate) fn check_query_result(
    row_mult: RowMult,
    single_row_mode: bool,
    result: &QueryResult,
) -> Result<(), ResponseAnomaly> {
    let reject = |detail: String| Err(ResponseAnomaly::Reject { detail });
    let n = result.ntuples();
    match result.status {
        ResultStatus::CommandOk => {
            if row_mult.expects_tuples() {
                reject("Tuples expected.".to_string())
            } else {
                Ok(())
            }
        }
        ResultStatus::TuplesOk => {
            if single_row_mode {
                if n == 0 {
                    Ok(())
                } else {
                    reject(format!(
                        "Received terminating result with {n} tuples in single-row mode."
                    ))
                }
            } else {
                match row_mult {
                    RowMult::Zero if n > 0 => {
                        reject(format!("Received {n} tuples, expected none."))
                    }
                    RowMult::One if n != 1 => {
                        reject(format!("Received {n} tuples, expected one."))
                    }
                    RowMult::ZeroOrOne if n > 1 => {
                        reject(format!("Received {n} tuples, expected at most one."))
                    }
                    _ => Ok(()),
                }
            }
        }
        ResultStatus::SingleTuple => {
            if !single_row_mode {
                reject("Unexpected single-tuple response.".to_string())
            } else if n == 1 {
                Ok(())
            } else {
                reject(format!("Received a single-tuple response with {n} tuples."))
            }
        }
        ResultStatus::EmptyQuery => Err(ResponseAnomaly::Fail {
            detail: "The query was empty.".to_string(),
        }),
        ResultStatus::BadResponse => reject(match result.error {
            Some(ref msg) => format!("{msg}"),
            None => "Bad response.".to_string(),
        }),
        ResultStatus::FatalError => match result.error {
            Some(ref msg) => Err(ResponseAnomaly::FailServer { msg: msg.clone() }),
            None => Err(ResponseAnomaly::Fail {
                detail: "Fatal error without server message.".to_string(),
            }),
        },
        // warnings count as success
        ResultStatus::NonfatalError => Ok(()),
        ResultStatus::CopyIn | ResultStatus::CopyOut => {
            reject("Received unexpected copy response.".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{check_query_result, QueryResult, ResponseAnomaly, ResultStatus};
    use crate::protocol::{Severity, ServerMsg};
    use crate::RowMult;

    const MULTS: [RowMult; 4] = [
        RowMult::Zero,
        RowMult::One,
        RowMult::ZeroOrOne,
        RowMult::ZeroOrMore,
    ];

    fn tuples(n: usize) -> QueryResult {
        QueryResult::tuples(vec![vec![Some("1".to_string())]; n], format!("SELECT {n}"))
    }

    fn single(n: usize) -> QueryResult {
        let mut r = QueryResult::single_tuple(vec![Some("1".to_string())]);
        r.rows = vec![vec![Some("1".to_string())]; n];
        r
    }

    #[test]
    fn command_ok_only_satisfies_zero() {
        for mult in MULTS {
            let ok = check_query_result(mult, false, &QueryResult::command_ok("BEGIN".into()));
            assert_eq!(ok.is_ok(), mult == RowMult::Zero, "mult {mult:?}");
        }
    }

    #[test]
    fn tuples_ok_decision_table() {
        for mult in MULTS {
            for n in 0..4_usize {
                let expected = match mult {
                    RowMult::Zero => n == 0,
                    RowMult::One => n == 1,
                    RowMult::ZeroOrOne => n <= 1,
                    RowMult::ZeroOrMore => true,
                };
                let got = check_query_result(mult, false, &tuples(n));
                assert_eq!(got.is_ok(), expected, "mult {mult:?}, ntuples {n}");
            }
        }
    }

    #[test]
    fn tuples_ok_in_single_row_mode_must_be_empty() {
        for mult in MULTS {
            for n in 0..4_usize {
                let got = check_query_result(mult, true, &tuples(n));
                assert_eq!(got.is_ok(), n == 0, "mult {mult:?}, ntuples {n}");
            }
        }
    }

    #[test]
    fn single_tuple_requires_single_row_mode_and_one_row() {
        for n in 0..3_usize {
            assert_eq!(
                check_query_result(RowMult::ZeroOrMore, true, &single(n)).is_ok(),
                n == 1
            );
            assert!(check_query_result(RowMult::ZeroOrMore, false, &single(n)).is_err());
        }
    }

    #[test]
    fn zero_expectation_message() {
        match check_query_result(RowMult::One, false, &tuples(0)) {
            Err(ResponseAnomaly::Reject { detail }) => {
                assert_eq!(detail, "Received 0 tuples, expected one.");
            }
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn empty_query_fails_the_request() {
        match check_query_result(RowMult::Zero, false, &QueryResult::empty_query()) {
            Err(ResponseAnomaly::Fail { detail }) => {
                assert_eq!(detail, "The query was empty.");
            }
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn fatal_error_carries_the_server_message() {
        let msg = ServerMsg::for_test(Severity::Error, "42P01", "relation does not exist");
        match check_query_result(
            RowMult::ZeroOrMore,
            false,
            &QueryResult::fatal(msg.clone()),
        ) {
            Err(ResponseAnomaly::FailServer { msg: got }) => assert_eq!(got, msg),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn warnings_and_copy_statuses() {
        let mut warn = QueryResult::command_ok(String::new());
        warn.status = ResultStatus::NonfatalError;
        assert!(check_query_result(RowMult::One, false, &warn).is_ok());
        assert!(check_query_result(RowMult::ZeroOrMore, false, &QueryResult::copy_in()).is_err());
        assert!(check_query_result(RowMult::ZeroOrMore, false, &QueryResult::copy_out()).is_err());
    }

    #[test]
    fn affected_count_parses_command_tags() {
        assert_eq!(QueryResult::command_ok("INSERT 0 5".into()).affected_count(), 5);
        assert_eq!(QueryResult::command_ok("UPDATE 12".into()).affected_count(), 12);
        assert_eq!(QueryResult::command_ok("BEGIN".into()).affected_count(), 0);
        assert_eq!(QueryResult::command_ok("CREATE TABLE".into()).affected_count(), 0);
    }
}
