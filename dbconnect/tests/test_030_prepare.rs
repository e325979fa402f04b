mod test_utils;

use dbconnect::{DbError, RequestSpec, RowMult, SqlType, SqlValue};
use test_utils::{error_response, exec_command, exec_int_rows, prepare_ok, ready, session,
    batch, StubServer};

// One PREPARE serves any number of executions of the same request.
#[test]
fn a_request_is_prepared_once_per_connection() {
    test_utils::init_logger("info");
    let server = StubServer::start(vec![session(vec![
        prepare_ok(),
        exec_int_rows(&[1]),
        exec_int_rows(&[2]),
    ])]);
    let conn = dbconnect::connect(&server.uri).unwrap();

    let req = RequestSpec::prepared(
        SqlType::UNIT,
        SqlType::INT,
        RowMult::ZeroOrOne,
        "SELECT weight FROM seeds LIMIT 1",
    );
    assert_eq!(
        conn.find_opt(&req, &SqlValue::Unit).unwrap(),
        Some(SqlValue::Int(1))
    );
    assert_eq!(
        conn.find_opt(&req, &SqlValue::Unit).unwrap(),
        Some(SqlValue::Int(2))
    );
    // exactly one named Parse went over the wire
    assert_eq!(server.count_frames_containing(b'P', "_caq"), 1);
}

#[test]
fn a_failed_prepare_is_not_cached() {
    let server = StubServer::start(vec![session(vec![
        batch(&[
            error_response("42P01", "relation \"seeds\" does not exist"),
            ready(b'I'),
        ]),
        prepare_ok(),
        exec_command("DELETE 0"),
    ])]);
    let conn = dbconnect::connect(&server.uri).unwrap();

    let req = RequestSpec::prepared(
        SqlType::UNIT,
        SqlType::UNIT,
        RowMult::Zero,
        "DELETE FROM seeds",
    );
    match conn.exec(&req, &SqlValue::Unit) {
        Err(DbError::RequestFailed { msg, .. }) => {
            assert!(msg.to_string().contains("does not exist"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    // the identity was not cached, so the next call prepares again
    conn.exec(&req, &SqlValue::Unit).unwrap();
    assert_eq!(server.count_frames_containing(b'P', "_caq"), 2);
}

#[test]
fn deallocate_drops_the_statement_and_allows_repreparing() {
    let server = StubServer::start(vec![session(vec![
        prepare_ok(),
        exec_command("DELETE 1"),
        test_utils::oneshot_command("DEALLOCATE"),
        prepare_ok(),
        exec_command("DELETE 1"),
    ])]);
    let conn = dbconnect::connect(&server.uri).unwrap();

    let req = RequestSpec::prepared(
        SqlType::UNIT,
        SqlType::UNIT,
        RowMult::Zero,
        "DELETE FROM seeds WHERE id = 1",
    );
    conn.exec(&req, &SqlValue::Unit).unwrap();
    conn.deallocate(&req).unwrap();
    assert_eq!(server.count_frames_containing(b'P', "DEALLOCATE _caq"), 1);

    conn.exec(&req, &SqlValue::Unit).unwrap();
    assert_eq!(server.count_frames_containing(b'P', "DELETE FROM seeds"), 2);
}

#[test]
fn deallocating_an_unprepared_request_is_a_no_op() {
    let server = StubServer::start(vec![session(vec![])]);
    let conn = dbconnect::connect(&server.uri).unwrap();

    let req = RequestSpec::prepared(SqlType::UNIT, SqlType::UNIT, RowMult::Zero, "SELECT 1");
    conn.deallocate(&req).unwrap();

    let oneshot = RequestSpec::oneshot(SqlType::UNIT, SqlType::UNIT, RowMult::Zero, "SELECT 1");
    match conn.deallocate(&oneshot) {
        Err(DbError::Usage(_)) => {}
        other => panic!("unexpected outcome {other:?}"),
    }
}
