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
///
/// Streamed rows are pulled with [`Response::next_row`]; an asynchronous
/// response cannot implement the synchronous `Iterator`.
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
    pub async fn exec(mut self) -> DbResult<()> {
        match self.source {
            Source::Complete { .. } => Ok(()),
            Source::SingleRow { .. } => {
                while self.next_row().await?.is_some() {}
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
    pub async fn find(mut self) -> DbResult<SqlValue> {
        match self.next_row().await? {
            Some(value) => Ok(value),
            None => Err(DbError::ResponseRejected {
                uri: self.uri.clone(),
                query: Some(self.query.clone()),
                detail: "Received 0 tuples, expected one.".to_string(),
            }),
        }
    }

    /// Decodes the row of the response, if one was returned.
    pub async fn find_opt(mut self) -> DbResult<Option<SqlValue>> {
        self.next_row().await
    }

    /// Folds `f` over all decoded rows.
    pub async fn fold<B, F>(mut self, mut f: F, mut acc: B) -> DbResult<B>
    where
        F: FnMut(SqlValue, B) -> B,
    {
        while let Some(value) = self.next_row().await? {
            acc = f(value, acc);
        }
        Ok(acc)
    }

    /// Folds an effectful `f` over all decoded rows, stopping at the first
    /// error.
    pub async fn try_fold<B, F>(mut self, mut f: F, mut acc: B) -> DbResult<B>
    where
        F: FnMut(SqlValue, B) -> DbResult<B>,
    {
        while let Some(value) = self.next_row().await? {
            acc = f(value, acc)?;
        }
        Ok(acc)
    }

    /// Applies an effectful `f` to every decoded row.
    pub async fn iter<F>(self, mut f: F) -> DbResult<()>
    where
        F: FnMut(SqlValue) -> DbResult<()>,
    {
        self.try_fold(|value, ()| f(value), ()).await
    }

    /// Collects all decoded rows.
    pub async fn collect(self) -> DbResult<Vec<SqlValue>> {
        self.fold(
            |value, mut acc: Vec<SqlValue>| {
                acc.push(value);
                acc
            },
            Vec::new(),
        )
        .await
    }

    /// The next decoded row, or `None` at the end of the response.
    pub async fn next_row(&mut self) -> DbResult<Option<SqlValue>> {
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
                let mut core = self.am_conn_core.async_lock().await;
                match core.async_get_next_result().await {
                    Ok(Some(result)) if result.status() == ResultStatus::SingleTuple => {
                        match decode_cells(&self.uri, &self.row_type, &result.rows[0]) {
                            Ok(value) => Ok(Some(value)),
                            Err(e) => {
                                *finished = true;
                                let _ = core.async_drain_results().await;
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
                        let end = core.async_expect_end().await;
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
                        let _ = core.async_drain_results().await;
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
            warn!("dropping an unconsumed row stream; the connection is reset before reuse");
            match self.am_conn_core.try_lock_async() {
                Some(mut core) => {
                    core.poisoned = true;
                    core.in_use = false;
                }
                None => {
                    // the lock is held elsewhere; poison from a task
                    let am_conn_core = self.am_conn_core.clone();
                    if let Ok(handle) = tokio::runtime::Handle::try_current() {
                        handle.spawn(async move {
                            let mut core = am_conn_core.async_lock().await;
                            core.poisoned = true;
                            core.in_use = false;
                        });
                    }
                }
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
