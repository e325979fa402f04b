mod test_utils;

use dbconnect::{DbError, RequestSpec, RowMult, SqlType, SqlValue};
use test_utils::{
    batch, bind_complete, command_complete, data_row, exec_command, parse_complete, prepare_ok,
    ready, row_description, session, Step, StubServer,
};

// The reply to the type-OID catalog probe.
fn probe_found(oid: &str) -> Step {
    batch(&[
        parse_complete(),
        bind_complete(),
        row_description(&[("oid", 20)]),
        data_row(&[Some(oid)]),
        command_complete("SELECT 1"),
        ready(b'I'),
    ])
}

fn probe_not_found() -> Step {
    batch(&[
        parse_complete(),
        bind_complete(),
        row_description(&[("oid", 20)]),
        command_complete("SELECT 0"),
        ready(b'I'),
    ])
}

#[test]
fn enum_oids_are_probed_once_and_cached() {
    test_utils::init_logger("info");
    let server = StubServer::start(vec![session(vec![
        probe_found("42"),
        prepare_ok(),
        exec_command("INSERT 0 1"),
        // second request with the same enum: no second probe
        prepare_ok(),
        exec_command("UPDATE 1"),
    ])]);
    let conn = dbconnect::connect(&server.uri).unwrap();

    let insert = RequestSpec::prepared(
        SqlType::enum_type("mood"),
        SqlType::UNIT,
        RowMult::Zero,
        "INSERT INTO people (current_mood) VALUES (?)",
    );
    conn.exec(&insert, &SqlValue::from("happy")).unwrap();

    let update = RequestSpec::prepared(
        SqlType::enum_type("mood"),
        SqlType::UNIT,
        RowMult::Zero,
        "UPDATE people SET current_mood = ?",
    );
    conn.exec(&update, &SqlValue::from("ok")).unwrap();

    assert_eq!(
        server.count_frames_containing(b'P', "pg_catalog.pg_type"),
        1
    );
}

#[test]
fn an_unknown_enum_is_a_missing_encoding() {
    let server = StubServer::start(vec![session(vec![probe_not_found()])]);
    let conn = dbconnect::connect(&server.uri).unwrap();

    let req = RequestSpec::prepared(
        SqlType::enum_type("flavor"),
        SqlType::UNIT,
        RowMult::Zero,
        "INSERT INTO sweets (f) VALUES (?)",
    );
    match conn.exec(&req, &SqlValue::from("sour")) {
        Err(DbError::EncodeMissing { sql_type, .. }) => {
            assert_eq!(sql_type, "enum(flavor)");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}
