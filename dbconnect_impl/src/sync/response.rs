use crate::{
    base::RowMult,
    conn::AmConnCore,
    protocol::{anomaly_to_error, check_query_result, QueryResult, ResultStatus},
    DbError, DbResult, ErrorMsg, SqlType, SqlValue,
};

/// The outcome of a request: either a complete result, or a row stream for
/// single-row-mode requests.
///
/// Streams borrow the connection logically: until the stream is consumed to
/// its end, further requests on the connection fail loudly. Dropping an
/// unfinished stream leaves the connection poisoned; its next use resets it.
#[derive(Debug)]
pub struct Response {
    am_conn_core: AmConnCore,
    uri: String,
    query: String,
    row_type: SqlType,
    source: Source,
}

#[derive(Debug)]
enum Source {
    Complete { result: QueryResult, cursor: usize },
    SingleRow { finished: bool },
}

impl Response {
    pub(crate) fn complete(
        am_conn_core: AmConnCore,
        uri: String,
        query: String,
        row_type: SqlType,
        result: QueryResult,
    ) -> Self {
        Self {
            am_conn_core,
            uri,
            query,
            row_type,
            source: Source::Complete { result, cursor: 0 },
        }
    }

    pub(crate) fn single_row(
        am_conn_core: AmConnCore,
        uri: String,
        query: String,
        row_type: SqlType,
    ) -> Self {
        Self {
            am_conn_core,
            uri,
            query,
            row_type,
            source: Source::SingleRow { finished: false },
        }
    }

    /// The query this response answers.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Accepts the response without looking at rows. A streamed response is
    /// drained.
    pub fn exec(mut self) -> DbResult<()> {
        match self.source {
            Source::Complete { .. } => Ok(()),
            Source::SingleRow { .. } => {
                while self.next_row()?.is_some() {}
                Ok(())
            }
        }
    }

    /// The number of rows the server returned.
    ///
    /// # Errors
    ///
    /// `DbError::Unsupported` for a streamed response.
    pub fn returned_count(&self) -> DbResult<usize> {
        match self.source {
            Source::Complete { ref result, .. } => Ok(result.ntuples()),
            Source::SingleRow { .. } => Err(DbError::Unsupported(
                "returned_count on a streamed response",
            )),
        }
    }

    /// The number of rows the command affected; 0 when the server reports
    /// no count.
    ///
    /// # Errors
    ///
    /// `DbError::Unsupported` for a streamed response.
    pub fn affected_count(&self) -> DbResult<usize> {
        match self.source {
            Source::Complete { ref result, .. } => Ok(result.affected_count()),
            Source::SingleRow { .. } => Err(DbError::Unsupported(
                "affected_count on a streamed response",
            )),
        }
    }

    /// Decodes the single row of the response.
    pub fn find(mut self) -> DbResult<SqlValue> {
        match self.next_row()? {
            Some(value) => Ok(value),
            None => Err(DbError::ResponseRejected {
                uri: self.uri.clone(),
                query: Some(self.query.clone()),
                detail: "Received 0 tuples, expected one.".to_string(),
            }),
        }
    }

    /// Decodes the row of the response, if one was returned.
    pub fn find_opt(mut self) -> DbResult<Option<SqlValue>> {
        self.next_row()
    }

    /// Folds `f` over all decoded rows.
    pub fn fold<B, F>(mut self, mut f: F, mut acc: B) -> DbResult<B>
    where
        F: FnMut(SqlValue, B) -> B,
    {
        while let Some(value) = self.next_row()? {
            acc = f(value, acc);
        }
        Ok(acc)
    }

    /// Folds an effectful `f` over all decoded rows, stopping at the first
    /// error.
    pub fn try_fold<B, F>(mut self, mut f: F, mut acc: B) -> DbResult<B>
    where
        F: FnMut(SqlValue, B) -> DbResult<B>,
    {
        while let Some(value) = self.next_row()? {
            acc = f(value, acc)?;
        }
        Ok(acc)
    }

    /// Applies an effectful `f` to every decoded row.
    pub fn iter<F>(self, mut f: F) -> DbResult<()>
    where
        F: FnMut(SqlValue) -> DbResult<()>,
    {
        self.try_fold(|value, ()| f(value), ())
    }

    /// Collects all decoded rows.
    pub fn collect(self) -> DbResult<Vec<SqlValue>> {
        self.fold(
            |value, mut acc: Vec<SqlValue>| {
                acc.push(value);
                acc
            },
            Vec::new(),
        )
    }

    /// Turns the response into an iterator over decoded rows.
    pub fn rows(self) -> RowStream {
        RowStream {
            response: self,
            done: false,
        }
    }

    /// The next decoded row, or `None` at the end of the response.
    pub fn next_row(&mut self) -> DbResult<Option<SqlValue>> {
        match self.source {
            Source::Complete {
                ref result,
                ref mut cursor,
            } => {
                if *cursor >= result.ntuples() {
                    return Ok(None);
                }
                let cells = &result.rows[*cursor];
                *cursor += 1;
                decode_cells(&self.uri, &self.row_type, cells).map(Some)
            }
            Source::SingleRow { ref mut finished } => {
                if *finished {
                    return Ok(None);
                }
                let mut core = self.am_conn_core.sync_lock()?;
                match core.sync_get_next_result() {
                    Ok(Some(result)) if result.status() == ResultStatus::SingleTuple => {
                        match decode_cells(&self.uri, &self.row_type, &result.rows[0]) {
                            Ok(value) => Ok(Some(value)),
                            Err(e) => {
                                *finished = true;
                                let _ = core.sync_drain_results();
                                core.in_use = false;
                                Err(e)
                            }
                        }
                    }
                    Ok(Some(result))
                        if result.status() == ResultStatus::TuplesOk && result.ntuples() == 0 =>
                    {
                        // the terminating result; the exchange must end here
                        *finished = true;
                        let end = core.sync_expect_end();
                        core.in_use = false;
                        end.map(|()| None)
                    }
                    Ok(Some(result)) => {
                        *finished = true;
                        let error = match check_query_result(RowMult::ZeroOrMore, true, &result) {
                            Err(anomaly) => {
                                anomaly_to_error(self.uri.clone(), anomaly, &self.query)
                            }
                            Ok(()) => DbError::ResponseRejected {
                                uri: self.uri.clone(),
                                query: Some(self.query.clone()),
                                detail: format!(
                                    "Unexpected result status {:?} in a single-row stream.",
                                    result.status()
                                ),
                            },
                        };
                        let _ = core.sync_drain_results();
                        core.in_use = false;
                        Err(error)
                    }
                    Ok(None) => {
                        *finished = true;
                        core.in_use = false;
                        Err(DbError::RequestFailed {
                            uri: self.uri.clone(),
                            query: Some(self.query.clone()),
                            msg: ErrorMsg::protocol(
                                "Single-row stream ended without a terminating result.",
                            ),
                        })
                    }
                    Err(e) => {
                        *finished = true;
                        core.in_use = false;
                        Err(e.with_query(&self.query))
                    }
                }
            }
        }
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if let Source::SingleRow { finished: false } = self.source {
            if let Ok(mut core) = self.am_conn_core.sync_lock() {
                warn!("dropping an unconsumed row stream; the connection is reset before reuse");
                core.poisoned = true;
                core.in_use = false;
            }
        }
    }
}

fn decode_cells(uri: &str, row_type: &SqlType, cells: &[Option<String>]) -> DbResult<SqlValue> {
    crate::pg::codec::decode_row(row_type, cells).map_err(|e| DbError::DecodeRejected {
        uri: uri.to_string(),
        sql_type: e.sql_type,
        detail: e.detail,
    })
}

/// Iterator adapter over a response's rows; fused after the first error.
#[derive(Debug)]
pub struct RowStream {
    response: Response,
    done: bool,
}

impl Iterator for RowStream {
    type Item = DbResult<SqlValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.response.next_row() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
