mod test_utils;

use dbconnect_async::{Cause, DbError, RequestSpec, RowMult, SqlType, SqlValue};
use test_utils::{
    batch, bind_complete, command_complete, data_row, error_response, prepare_ok, ready,
    row_description, session, ConnScript, Step, StubServer,
};

#[tokio::test]
async fn connects_and_runs_the_session_setup() {
    test_utils::init_logger("info");
    let server = StubServer::start(vec![session(vec![])]);

    let conn = dbconnect_async::connect(&server.uri).await.unwrap();
    assert!(conn.check().await);
    assert_eq!(conn.call_count().await, 1);
    assert_eq!(server.count_frames_containing(b'P', "SET TimeZone TO 'UTC'"), 1);
}

#[tokio::test]
async fn refused_authentication_is_a_connect_failure() {
    let server = StubServer::start(vec![ConnScript::new(vec![Step::Reply(error_response(
        "53300",
        "too many connections",
    ))])]);

    match dbconnect_async::connect(&server.uri).await {
        Err(DbError::ConnectFailed { msg, .. }) => {
            assert_eq!(msg.cause(), Some(Cause::TooManyConnections));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn prepares_once_and_decodes_rows() {
    let server = StubServer::start(vec![session(vec![
        prepare_ok(),
        batch(&[
            bind_complete(),
            row_description(&[("oid", 20)]),
            data_row(&[Some("42")]),
            command_complete("SELECT 1"),
            ready(b'I'),
        ]),
        batch(&[
            bind_complete(),
            row_description(&[("oid", 20)]),
            data_row(&[Some("43")]),
            command_complete("SELECT 1"),
            ready(b'I'),
        ]),
    ])]);
    let conn = dbconnect_async::connect(&server.uri).await.unwrap();

    let req = RequestSpec::prepared(
        SqlType::TEXT,
        SqlType::INT,
        RowMult::ZeroOrOne,
        "SELECT oid FROM pg_type WHERE typname = ?",
    );
    let first = conn.find_opt(&req, &SqlValue::from("mood")).await.unwrap();
    assert_eq!(first, Some(SqlValue::Int(42)));
    let second = conn.find_opt(&req, &SqlValue::from("hue")).await.unwrap();
    assert_eq!(second, Some(SqlValue::Int(43)));
    assert_eq!(server.count_frames_containing(b'P', "_caq"), 1);
}

#[tokio::test]
async fn with_connection_disconnects_after_use() {
    let server = StubServer::start(vec![session(vec![])]);

    let value = dbconnect_async::with_connection(&server.uri, |conn| async move {
        assert!(conn.check().await);
        Ok(23)
    })
    .await
    .unwrap();
    assert_eq!(value, 23);

    for _ in 0..100 {
        if server.count_frames_containing(b'X', "") == 1 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("no disconnect observed");
}
