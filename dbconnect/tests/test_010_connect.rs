mod test_utils;

use dbconnect::{Cause, ConnectionConfiguration, DbError, NoticeProcessing};
use std::sync::{Arc, Mutex};
use test_utils::{
    accept_startup, auth_cleartext, auth_ok, batch, bind_complete, command_complete,
    error_response, no_data, notice_response, oneshot_command, prepare_ok, ready, session,
    ConnScript, Step, StubServer,
};

#[test]
fn connects_and_runs_the_session_setup() {
    test_utils::init_logger("info");
    let server = StubServer::start(vec![session(vec![])]);

    let conn = dbconnect::connect(&server.uri).unwrap();
    assert!(conn.check());
    assert_eq!(conn.call_count().unwrap(), 1); // the TimeZone setup
    assert_eq!(
        conn.connect_string().unwrap(),
        server.uri.replace(":tiger@", "@")
    );
    // the setup statement went over the wire
    assert_eq!(server.count_frames_containing(b'P', "SET TimeZone TO 'UTC'"), 1);
}

#[test]
fn answers_a_cleartext_password_challenge() {
    let server = StubServer::start(vec![ConnScript::new(vec![
        Step::Reply(auth_cleartext()),
        batch(&[auth_ok(), ready(b'I')]),
        oneshot_command("SET"),
    ])]);

    let conn = dbconnect::connect(&server.uri).unwrap();
    assert!(conn.check());
    assert_eq!(server.payloads(b'p'), vec!["tiger\0".to_string()]);
}

#[test]
fn refused_authentication_is_a_connect_failure() {
    let server = StubServer::start(vec![ConnScript::new(vec![Step::Reply(error_response(
        "28P01",
        "password authentication failed for user \"scott\"",
    ))])]);

    match dbconnect::connect(&server.uri) {
        Err(DbError::ConnectFailed { msg, .. }) => {
            assert_eq!(msg.cause(), Some(Cause::Unspecified));
            assert!(msg.to_string().contains("password authentication failed"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn failing_session_setup_is_post_connect() {
    let server = StubServer::start(vec![ConnScript::new(vec![
        accept_startup(),
        batch(&[
            error_response("42601", "syntax error"),
            ready(b'I'),
        ]),
    ])]);

    match dbconnect::connect(&server.uri) {
        Err(DbError::PostConnect { source, .. }) => {
            assert!(matches!(*source, DbError::RequestFailed { .. }));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn missing_scheme_is_load_rejected() {
    match dbconnect::connect("just-a-hostname/db") {
        Err(DbError::LoadRejected { .. }) => {}
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn unknown_scheme_is_load_rejected() {
    match dbconnect::connect("maria://localhost/db") {
        Err(DbError::LoadRejected { .. }) => {}
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn with_connection_disconnects_on_success_and_on_panic() {
    let server = StubServer::start(vec![session(vec![]), session(vec![])]);

    let value = dbconnect::with_connection(&server.uri, |conn| {
        assert!(conn.check());
        Ok(17)
    })
    .unwrap();
    assert_eq!(value, 17);
    wait_for(|| server.count_frames_containing(b'X', "") == 1);

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        dbconnect::with_connection(&server.uri, |_conn| -> dbconnect::DbResult<()> {
            panic!("boom")
        })
    }));
    assert!(caught.is_err());
    wait_for(|| server.count_frames_containing(b'X', "") == 2);
}

// Warnings do not fail the request; they route to the notice handler.
#[test]
fn notices_reach_the_configured_handler() {
    let server = StubServer::start(vec![session(vec![
        prepare_ok(),
        batch(&[
            bind_complete(),
            notice_response("implicit index will be created"),
            no_data(),
            command_complete("CREATE TABLE"),
            ready(b'I'),
        ]),
    ])]);

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let config = ConnectionConfiguration::default().with_notice_processing(
        NoticeProcessing::Custom(Arc::new(move |msg| {
            sink.lock().unwrap().push(msg.message().to_string());
        })),
    );
    let conn = dbconnect::connect_with(&server.uri, &config).unwrap();

    let req = dbconnect::RequestSpec::prepared(
        dbconnect::SqlType::UNIT,
        dbconnect::SqlType::UNIT,
        dbconnect::RowMult::Zero,
        "CREATE TABLE seeds (id int8 PRIMARY KEY)",
    );
    conn.exec(&req, &dbconnect::SqlValue::Unit).unwrap();
    assert_eq!(
        seen.lock().unwrap().clone(),
        vec!["implicit index will be created".to_string()]
    );
}

fn wait_for(mut probe: impl FnMut() -> bool) {
    for _ in 0..100 {
        if probe() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    panic!("condition not reached in time");
}
