mod test_utils;

use dbconnect::{
    ConnectionConfiguration, DbError, RequestSpec, RowMult, SqlType, SqlValue,
};
use test_utils::{
    batch, bind_complete, command_complete, data_row, error_response, exec_command, exec_int_rows,
    prepare_ok, ready, row_description, session, StubServer,
};

fn streaming_config() -> ConnectionConfiguration {
    ConnectionConfiguration::default().with_use_single_row_mode(true)
}

fn int_stream_request() -> RequestSpec {
    RequestSpec::prepared(
        SqlType::UNIT,
        SqlType::INT,
        RowMult::ZeroOrMore,
        "SELECT weight FROM seeds",
    )
}

#[test]
fn streams_rows_one_by_one() {
    test_utils::init_logger("info");
    let server = StubServer::start(vec![session(vec![prepare_ok(), exec_int_rows(&[1, 2, 3])])]);
    let conn = dbconnect::connect_with(&server.uri, &streaming_config()).unwrap();

    let mut response = conn.call(&int_stream_request(), &SqlValue::Unit).unwrap();
    assert!(response.returned_count().is_err()); // not meaningful while streaming
    assert_eq!(response.next_row().unwrap(), Some(SqlValue::Int(1)));
    assert_eq!(response.next_row().unwrap(), Some(SqlValue::Int(2)));
    assert_eq!(response.next_row().unwrap(), Some(SqlValue::Int(3)));
    assert_eq!(response.next_row().unwrap(), None);
    assert_eq!(response.next_row().unwrap(), None);

    // the stream finished, so the connection is usable again
    assert!(conn.check());
}

#[test]
fn an_error_mid_stream_ends_it_after_the_delivered_rows() {
    let server = StubServer::start(vec![session(vec![
        prepare_ok(),
        batch(&[
            bind_complete(),
            row_description(&[("weight", 20)]),
            data_row(&[Some("1")]),
            data_row(&[Some("2")]),
            error_response("57014", "canceling statement due to statement timeout"),
            ready(b'I'),
        ]),
    ])]);
    let conn = dbconnect::connect_with(&server.uri, &streaming_config()).unwrap();

    let mut rows = conn
        .call(&int_stream_request(), &SqlValue::Unit)
        .unwrap()
        .rows();
    assert_eq!(rows.next().unwrap().unwrap(), SqlValue::Int(1));
    assert_eq!(rows.next().unwrap().unwrap(), SqlValue::Int(2));
    match rows.next().unwrap() {
        Err(DbError::RequestFailed { msg, .. }) => {
            assert!(msg.to_string().contains("statement timeout"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(rows.next().is_none()); // fused after the error
}

#[test]
fn an_abandoned_stream_poisons_the_connection_until_reset() {
    let server = StubServer::start(vec![
        session(vec![prepare_ok(), exec_int_rows(&[1, 2, 3])]),
        // the reset opens a fresh session and re-prepares
        session(vec![prepare_ok(), exec_int_rows(&[7])]),
    ]);
    let conn = dbconnect::connect_with(&server.uri, &streaming_config()).unwrap();

    let mut response = conn.call(&int_stream_request(), &SqlValue::Unit).unwrap();
    assert_eq!(response.next_row().unwrap(), Some(SqlValue::Int(1)));
    drop(response);

    assert!(!conn.check());
    let values = conn
        .call(&int_stream_request(), &SqlValue::Unit)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(values, vec![SqlValue::Int(7)]);
    assert_eq!(server.startup_count(), 2);
}

// A poisoned connection inside a transaction must not silently reconnect;
// the failure surfaces, and only once commit/rollback has cleared the
// transaction flag does the usual reset path apply.
#[test]
fn no_silent_reset_while_a_transaction_is_open() {
    let server = StubServer::start(vec![
        session(vec![
            prepare_ok(),
            exec_command("BEGIN"),
            prepare_ok(),
            exec_int_rows(&[1, 2, 3]),
        ]),
        // only reachable after the transaction flag is gone
        session(vec![prepare_ok(), exec_int_rows(&[7])]),
    ]);
    let conn = dbconnect::connect_with(&server.uri, &streaming_config()).unwrap();

    conn.start().unwrap();
    let mut response = conn.call(&int_stream_request(), &SqlValue::Unit).unwrap();
    assert_eq!(response.next_row().unwrap(), Some(SqlValue::Int(1)));
    drop(response); // poisons the connection mid-transaction

    match conn.call(&int_stream_request(), &SqlValue::Unit) {
        Err(DbError::RequestFailed { msg, .. }) => {
            assert!(msg.to_string().contains("transaction"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(server.startup_count(), 1);
    assert!(conn.is_in_transaction().unwrap());

    // rollback fails on the same grounds but clears the flag
    assert!(conn.rollback().is_err());
    assert!(!conn.is_in_transaction().unwrap());
    let values = conn
        .call(&int_stream_request(), &SqlValue::Unit)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(values, vec![SqlValue::Int(7)]);
    assert_eq!(server.startup_count(), 2);
}

#[test]
fn overlapping_use_fails_loudly() {
    let server = StubServer::start(vec![session(vec![prepare_ok(), exec_int_rows(&[1, 2])])]);
    let conn = dbconnect::connect_with(&server.uri, &streaming_config()).unwrap();

    let mut response = conn.call(&int_stream_request(), &SqlValue::Unit).unwrap();
    assert_eq!(response.next_row().unwrap(), Some(SqlValue::Int(1)));

    match conn.call(&int_stream_request(), &SqlValue::Unit) {
        Err(DbError::Usage(_)) => {}
        other => panic!("unexpected outcome {other:?}"),
    }

    // the first stream is still intact
    assert_eq!(response.next_row().unwrap(), Some(SqlValue::Int(2)));
    assert_eq!(response.next_row().unwrap(), None);
}

#[test]
fn single_row_mode_is_limited_to_many_row_requests() {
    let server = StubServer::start(vec![session(vec![
        prepare_ok(),
        batch(&[
            bind_complete(),
            row_description(&[("weight", 20)]),
            data_row(&[Some("5")]),
            command_complete("SELECT 1"),
            ready(b'I'),
        ]),
    ])]);
    let conn = dbconnect::connect_with(&server.uri, &streaming_config()).unwrap();

    // multiplicity zero-or-one never streams, even in single-row mode
    let req = RequestSpec::prepared(
        SqlType::UNIT,
        SqlType::INT,
        RowMult::ZeroOrOne,
        "SELECT weight FROM seeds LIMIT 1",
    );
    let response = conn.call(&req, &SqlValue::Unit).unwrap();
    assert_eq!(response.returned_count().unwrap(), 1);
    assert_eq!(response.find_opt().unwrap(), Some(SqlValue::Int(5)));
}
