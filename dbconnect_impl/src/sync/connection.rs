use crate::{
    base::{RequestSpec, RowMult, SqlType, SqlValue},
    conn::{AmConnCore, ConnectionCore, PreparedEntry, RequestPhase},
    pg::{codec, driver},
    protocol::{
        anomaly_to_error, check_query_result, classify_result, frontend, QueryResult, ResultStatus,
    },
    requests,
    sync::response::Response,
    ConnectionConfiguration, DbError, DbResult, IntoConnectParams,
};

/// A synchronous connection to the database.
///
/// Clones share one underlying connection; requests on it are serialised,
/// and overlapping use while a streamed response is unconsumed fails with
/// [`DbError::Usage`].
#[derive(Clone, Debug)]
pub struct Connection {
    am_conn_core: AmConnCore,
}

impl Connection {
    /// Factory method for connections with default configuration.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use dbconnect_impl::sync::Connection;
    /// let conn = Connection::new("postgresql://user:pw@localhost:5432/db").unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// Several variants of `DbError` can occur.
    pub fn new<P: IntoConnectParams>(params: P) -> DbResult<Self> {
        Self::with_configuration(params, &ConnectionConfiguration::default())
    }

    /// Factory method for connections with the given configuration.
    ///
    /// # Errors
    ///
    /// Several variants of `DbError` can occur.
    pub fn with_configuration<P: IntoConnectParams>(
        params: P,
        config: &ConnectionConfiguration,
    ) -> DbResult<Self> {
        let am_conn_core = AmConnCore::try_new_sync(params.into_connect_params()?, config)?;
        let connection = Self { am_conn_core };
        connection.setup_session()?;
        Ok(connection)
    }

    // The session always runs in UTC; the calendar codecs rely on it.
    fn setup_session(&self) -> DbResult<()> {
        let mut core = self.am_conn_core.sync_lock()?;
        let uri = core.uri();
        attempt_call(&mut core, &requests::SET_TIMEZONE_UTC, &SqlValue::Unit)
            .map(drop)
            .map_err(|e| DbError::PostConnect {
                uri,
                source: Box::new(e),
            })
    }

    /// Performs a request and returns its response.
    ///
    /// For a request whose multiplicity admits many rows on a connection in
    /// single-row mode, the response streams; otherwise it is complete.
    ///
    /// # Errors
    ///
    /// Several variants of `DbError` can occur.
    pub fn call(&self, request: &RequestSpec, params: &SqlValue) -> DbResult<Response> {
        let mut core = self.am_conn_core.sync_lock()?;
        if core.in_use {
            return Err(DbError::Usage(
                "concurrent use of one connection; a previous response may be unconsumed",
            ));
        }
        if core.poisoned || !core.is_connected() {
            // never reconnect under an open transaction
            if core.in_transaction {
                return Err(core.broken_in_transaction_err());
            }
            reset_with_session(&mut core)?;
        }
        core.in_use = true;
        match call_on_core(&mut core, request, params) {
            Ok(outcome) => {
                let uri = core.uri();
                let row_type = request.row_type().clone();
                match outcome.source {
                    OutcomeSource::Complete(result) => {
                        core.in_use = false;
                        drop(core);
                        Ok(Response::complete(
                            self.am_conn_core.clone(),
                            uri,
                            outcome.sql,
                            row_type,
                            result,
                        ))
                    }
                    OutcomeSource::SingleRow => {
                        // in_use stays set until the stream is consumed
                        drop(core);
                        Ok(Response::single_row(
                            self.am_conn_core.clone(),
                            uri,
                            outcome.sql,
                            row_type,
                        ))
                    }
                }
            }
            Err(e) => {
                if core.has_pending() {
                    core.poisoned = true;
                }
                core.in_use = false;
                Err(e)
            }
        }
    }

    /// Performs a request and expects a response without rows.
    pub fn exec(&self, request: &RequestSpec, params: &SqlValue) -> DbResult<()> {
        self.call(request, params)?.exec()
    }

    /// Performs a request and decodes its single row.
    pub fn find(&self, request: &RequestSpec, params: &SqlValue) -> DbResult<SqlValue> {
        self.call(request, params)?.find()
    }

    /// Performs a request and decodes its row, if one was returned.
    pub fn find_opt(&self, request: &RequestSpec, params: &SqlValue) -> DbResult<Option<SqlValue>> {
        self.call(request, params)?.find_opt()
    }

    /// Performs a request and collects all decoded rows.
    pub fn collect(&self, request: &RequestSpec, params: &SqlValue) -> DbResult<Vec<SqlValue>> {
        self.call(request, params)?.collect()
    }

    /// Starts a transaction.
    ///
    /// While a transaction is open, a lost connection is not transparently
    /// re-established; the error surfaces instead.
    pub fn start(&self) -> DbResult<()> {
        self.call(&requests::BEGIN, &SqlValue::Unit)?.exec()?;
        self.am_conn_core.sync_lock()?.in_transaction = true;
        Ok(())
    }

    /// Commits the current transaction. The transaction flag is cleared even
    /// if the server reports a failure.
    pub fn commit(&self) -> DbResult<()> {
        let outcome = self
            .call(&requests::COMMIT, &SqlValue::Unit)
            .and_then(Response::exec);
        self.am_conn_core.sync_lock()?.in_transaction = false;
        outcome
    }

    /// Rolls back the current transaction. The transaction flag is cleared
    /// even if the server reports a failure.
    pub fn rollback(&self) -> DbResult<()> {
        let outcome = self
            .call(&requests::ROLLBACK, &SqlValue::Unit)
            .and_then(Response::exec);
        self.am_conn_core.sync_lock()?.in_transaction = false;
        outcome
    }

    /// Sets or disables (`None`) the server-side statement timeout.
    pub fn set_statement_timeout(&self, seconds: Option<f64>) -> DbResult<()> {
        let ms = match seconds {
            None => 0,
            Some(s) => ((s * 1000.0).round() as i64).max(1),
        };
        let request = RequestSpec::oneshot(
            SqlType::UNIT,
            SqlType::UNIT,
            RowMult::Zero,
            &format!("SET statement_timeout TO {ms}"),
        );
        self.call(&request, &SqlValue::Unit)?.exec()
    }

    /// Bulk-loads rows into a table via COPY FROM STDIN.
    ///
    /// # Errors
    ///
    /// The first failing row aborts the copy and surfaces its error.
    pub fn populate<I>(
        &self,
        table: &str,
        columns: &[&str],
        row_type: &SqlType,
        rows: I,
    ) -> DbResult<()>
    where
        I: IntoIterator<Item = DbResult<SqlValue>>,
    {
        let mut core = self.am_conn_core.sync_lock()?;
        if core.in_use {
            return Err(DbError::Usage(
                "concurrent use of one connection; a previous response may be unconsumed",
            ));
        }
        if core.poisoned || !core.is_connected() {
            // never reconnect under an open transaction
            if core.in_transaction {
                return Err(core.broken_in_transaction_err());
            }
            reset_with_session(&mut core)?;
        }
        core.in_use = true;
        let outcome = populate_on_core(&mut core, table, columns, row_type, rows);
        if outcome.is_err() && core.has_pending() {
            core.poisoned = true;
        }
        core.in_use = false;
        outcome
    }

    /// Releases the server-side prepared statement of `request` on this
    /// connection, if present.
    pub fn deallocate(&self, request: &RequestSpec) -> DbResult<()> {
        let id = request
            .id()
            .ok_or(DbError::Usage("cannot deallocate a one-shot request"))?;
        let cached = self.am_conn_core.sync_lock()?.prepared.contains_key(&id);
        if !cached {
            return Ok(());
        }
        let sql = format!("DEALLOCATE {}", driver::statement_name(id));
        let drop_request = RequestSpec::oneshot(SqlType::UNIT, SqlType::UNIT, RowMult::Zero, &sql);
        self.call(&drop_request, &SqlValue::Unit)?.exec()?;
        self.am_conn_core.sync_lock()?.prepared.remove(&id);
        Ok(())
    }

    /// Checks that the connection is usable, attempting a reset when it is
    /// not. Returns the outcome.
    pub fn validate(&self) -> bool {
        match self.am_conn_core.sync_lock() {
            Ok(mut core) => {
                if core.in_use {
                    return false;
                }
                if core.is_connected() && !core.poisoned {
                    return true;
                }
                reset_with_session(&mut core).is_ok()
            }
            Err(_) => false,
        }
    }

    /// Reports the current ok-ness without touching the server.
    pub fn check(&self) -> bool {
        match self.am_conn_core.sync_lock() {
            Ok(core) => core.is_connected() && !core.poisoned && !core.in_use,
            Err(_) => false,
        }
    }

    /// Closes the connection. Connection errors during disconnect are
    /// logged, not surfaced.
    pub fn disconnect(&self) {
        if let Ok(mut core) = self.am_conn_core.sync_lock() {
            if core.in_use {
                warn!("disconnecting a connection with an unconsumed response");
            }
            core.sync_terminate();
        }
    }

    /// Returns whether a transaction is open.
    pub fn is_in_transaction(&self) -> DbResult<bool> {
        Ok(self.am_conn_core.sync_lock()?.in_transaction)
    }

    /// The number of requests sent over this connection, including internal
    /// ones.
    pub fn call_count(&self) -> DbResult<u32> {
        Ok(self.am_conn_core.sync_lock()?.call_count())
    }

    /// The display form of the connection's endpoint, without credentials.
    pub fn connect_string(&self) -> DbResult<String> {
        Ok(self.am_conn_core.sync_lock()?.uri())
    }

    /// A parameter the server reported during the session (e.g.
    /// `server_version`), if known.
    pub fn server_parameter(&self, name: &str) -> DbResult<Option<String>> {
        Ok(self
            .am_conn_core
            .sync_lock()?
            .server_param(name)
            .map(str::to_string))
    }
}

pub(crate) struct CallOutcome {
    pub sql: String,
    pub source: OutcomeSource,
}

pub(crate) enum OutcomeSource {
    Complete(QueryResult),
    SingleRow,
}

// (i) probe enum OIDs, then run the request with one transparent
// reconnect-and-retry outside transactions.
pub(crate) fn call_on_core(
    core: &mut ConnectionCore,
    request: &RequestSpec,
    params: &SqlValue,
) -> DbResult<CallOutcome> {
    probe_enum_oids(core, request.param_type())?;
    match attempt_call(core, request, params) {
        Err(e) if e.is_connection_failure() && !core.in_transaction => {
            debug!("repeating request after reconnect; first attempt failed with {e}");
            reset_with_session(core)?;
            attempt_call(core, request, params)
        }
        other => other,
    }
}

// (ii)-(v) of the request pipeline, without retry.
fn attempt_call(
    core: &mut ConnectionCore,
    request: &RequestSpec,
    params: &SqlValue,
) -> DbResult<CallOutcome> {
    let (entry, stmt_name) = match request.id() {
        Some(id) => {
            if !core.prepared.contains_key(&id) {
                let entry = core.plan_request(request)?;
                prepare_on_core(core, id, entry)?;
            }
            let entry = match core.prepared.get(&id) {
                Some(entry) => entry.clone(),
                None => return Err(DbError::Usage("prepared entry vanished")),
            };
            (entry, driver::statement_name(id))
        }
        None => (core.plan_request(request)?, String::new()),
    };

    let encoded = codec::encode_params(request.param_type(), params).map_err(|e| {
        DbError::EncodeRejected {
            uri: core.uri(),
            sql_type: e.sql_type,
            detail: e.detail,
        }
    })?;

    let mut buf = Vec::new();
    if stmt_name.is_empty() {
        frontend::parse("", &entry.query, &entry.param_oids, &mut buf);
    }
    frontend::bind("", &stmt_name, &entry.binary_flags, &encoded, &mut buf);
    frontend::describe_portal("", &mut buf);
    frontend::execute("", &mut buf);
    frontend::sync(&mut buf);
    core.sync_send_request(&buf, RequestPhase::Exec, entry.single_row_mode)
        .map_err(|e| e.with_query(&entry.query))?;

    if entry.single_row_mode {
        Ok(CallOutcome {
            sql: entry.query,
            source: OutcomeSource::SingleRow,
        })
    } else {
        let result = core
            .sync_get_final_result()
            .map_err(|e| e.with_query(&entry.query))?;
        classify(core, request.row_mult(), false, &result, &entry.query)?;
        Ok(CallOutcome {
            sql: entry.query,
            source: OutcomeSource::Complete(result),
        })
    }
}

// Sends PREPARE for the entry; only a successful prepare is cached.
fn prepare_on_core(core: &mut ConnectionCore, id: u64, entry: PreparedEntry) -> DbResult<()> {
    let name = driver::statement_name(id);
    debug!("preparing statement {name} for: {}", entry.query);
    let mut buf = Vec::new();
    frontend::parse(&name, &entry.query, &entry.param_oids, &mut buf);
    frontend::sync(&mut buf);
    core.sync_send_request(&buf, RequestPhase::Prepare, false)
        .map_err(|e| e.with_query(&entry.query))?;
    let result = core
        .sync_get_final_result()
        .map_err(|e| e.with_query(&entry.query))?;
    classify(core, RowMult::Zero, false, &result, &entry.query)?;
    core.prepared.insert(id, entry);
    Ok(())
}

// Resolves the OID of every enum leaf that is not cached yet. Failures
// degrade to a missing encoding after logging.
fn probe_enum_oids(core: &mut ConnectionCore, param_type: &SqlType) -> DbResult<()> {
    let mut names = Vec::new();
    param_type.collect_enum_names(&mut names);
    let missing: Vec<String> = names
        .iter()
        .filter(|name| !core.type_oids.contains_key(**name))
        .map(|name| (*name).to_string())
        .collect();
    for name in missing {
        let missing_encoding = DbError::EncodeMissing {
            uri: core.uri(),
            sql_type: format!("enum({name})"),
        };
        match attempt_call(core, &requests::TYPE_OID, &SqlValue::Text(name.clone())) {
            Ok(CallOutcome {
                source: OutcomeSource::Complete(result),
                ..
            }) => match result.rows.first() {
                Some(cells) => {
                    let decoded = codec::decode_row(&SqlType::INT64, cells).map_err(|e| {
                        DbError::DecodeRejected {
                            uri: core.uri(),
                            sql_type: e.sql_type,
                            detail: e.detail,
                        }
                    })?;
                    if let SqlValue::Int64(oid) = decoded {
                        trace!("resolved enum \"{name}\" to type oid {oid}");
                        core.type_oids.insert(name, oid as u32);
                    }
                }
                None => {
                    warn!("no type oid found for enum \"{name}\"");
                    return Err(missing_encoding);
                }
            },
            Ok(CallOutcome {
                source: OutcomeSource::SingleRow,
                ..
            }) => {
                warn!("type oid probe for \"{name}\" streamed unexpectedly");
                return Err(missing_encoding);
            }
            Err(e) => {
                warn!("type oid probe for \"{name}\" failed: {e}");
                return Err(missing_encoding);
            }
        }
    }
    Ok(())
}

fn populate_on_core<I>(
    core: &mut ConnectionCore,
    table: &str,
    columns: &[&str],
    row_type: &SqlType,
    rows: I,
) -> DbResult<()>
where
    I: IntoIterator<Item = DbResult<SqlValue>>,
{
    let sql = format!("COPY {table} ({}) FROM STDIN", columns.join(", "));
    let mut buf = Vec::new();
    frontend::parse("", &sql, &[], &mut buf);
    frontend::bind("", "", &[], &[], &mut buf);
    frontend::describe_portal("", &mut buf);
    frontend::execute("", &mut buf);
    frontend::sync(&mut buf);
    core.sync_send_request(&buf, RequestPhase::Exec, false)
        .map_err(|e| e.with_query(&sql))?;

    let first = core.sync_get_one_result().map_err(|e| e.with_query(&sql))?;
    if first.status() != ResultStatus::CopyIn {
        let error = match check_query_result(RowMult::Zero, false, &first) {
            Err(anomaly) => anomaly_to_error(core.uri(), anomaly, &sql),
            Ok(()) => DbError::ResponseRejected {
                uri: core.uri(),
                query: Some(sql.clone()),
                detail: "Expected a copy-in response.".to_string(),
            },
        };
        let _ = core.sync_drain_results();
        return Err(error);
    }

    for row in rows {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                abort_copy(core, "aborted by data source");
                return Err(e);
            }
        };
        match codec::encode_copy_row(row_type, &row) {
            Ok(line) => {
                let mut buf = Vec::new();
                frontend::copy_data(&line, &mut buf);
                core.sync_send(&buf).map_err(|e| e.with_query(&sql))?;
            }
            Err(e) => {
                abort_copy(core, "row could not be encoded");
                return Err(DbError::EncodeRejected {
                    uri: core.uri(),
                    sql_type: e.sql_type,
                    detail: e.detail,
                });
            }
        }
    }

    let mut buf = Vec::new();
    frontend::copy_done(&mut buf);
    core.sync_send(&buf).map_err(|e| e.with_query(&sql))?;
    let result = core
        .sync_get_final_result()
        .map_err(|e| e.with_query(&sql))?;
    classify(core, RowMult::Zero, false, &result, &sql)
}

// Best-effort; the caller surfaces the error that caused the abort.
fn abort_copy(core: &mut ConnectionCore, reason: &str) {
    let mut buf = Vec::new();
    frontend::copy_fail(reason, &mut buf);
    if core.sync_send(&buf).is_ok() {
        if let Err(e) = core.sync_drain_results() {
            debug!("draining after aborted copy failed: {e}");
        }
    }
}

// A reset re-establishes the transport and restores the session defaults.
pub(crate) fn reset_with_session(core: &mut ConnectionCore) -> DbResult<()> {
    core.sync_reset_transport()?;
    attempt_call(core, &requests::SET_TIMEZONE_UTC, &SqlValue::Unit).map(drop)
}

fn classify(
    core: &ConnectionCore,
    row_mult: RowMult,
    single_row_mode: bool,
    result: &QueryResult,
    sql: &str,
) -> DbResult<()> {
    classify_result(core.uri(), row_mult, single_row_mode, result, sql)
}
