use crate::{
    conn::{
        authentication::ScramSha256,
        tcp_client::TcpClient,
        ConnectParams, ConnectionConfiguration, NoticeProcessing,
    },
    pg::oids::Oid,
    protocol::{
        backend::{AuthRequest, BackendMessage},
        frontend, QueryResult, ServerMsg,
    },
    DbError, DbResult, ErrorMsg,
};
use std::collections::HashMap;

#[cfg(feature = "sync")]
use crate::conn::tcp_client::SyncPlainTcpClient;

#[cfg(feature = "async")]
use crate::conn::tcp_client::AsyncPlainTcpClient;

/// What kind of request is currently on the wire; decides how protocol
/// acknowledgements map to results.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RequestPhase {
    Prepare,
    Exec,
}

/// Server-side prepared-statement metadata, owned by one connection.
#[derive(Clone, Debug)]
pub(crate) struct PreparedEntry {
    pub query: String,
    pub param_len: usize,
    pub param_oids: Vec<Oid>,
    pub binary_flags: Vec<bool>,
    pub single_row_mode: bool,
}

#[doc(hidden)]
#[derive(Debug)]
pub struct ConnectionCore {
    params: ConnectParams,
    config: ConnectionConfiguration,
    use_single_row_mode: bool,
    tcp_client: TcpClient,
    server_params: HashMap<String, String>,
    backend_pid: i32,
    // mid-flight request marker; concurrent use is a programming error
    pub(crate) in_use: bool,
    pub(crate) in_transaction: bool,
    // a cancelled or failed exchange left unknown state on the wire
    pub(crate) poisoned: bool,
    pub(crate) broken: bool,
    pending: bool,
    phase: RequestPhase,
    single_row: bool,
    row_returning: bool,
    pub(crate) prepared: HashMap<u64, PreparedEntry>,
    pub(crate) type_oids: HashMap<String, Oid>,
    call_count: u32,
}

impl ConnectionCore {
    fn new_disconnected(params: ConnectParams, config: &ConnectionConfiguration) -> Self {
        let use_single_row_mode = params
            .use_single_row_mode()
            .unwrap_or_else(|| config.is_use_single_row_mode());
        Self {
            params,
            config: config.clone(),
            use_single_row_mode,
            tcp_client: TcpClient::Dead,
            server_params: HashMap::new(),
            backend_pid: 0,
            in_use: false,
            in_transaction: false,
            poisoned: false,
            broken: false,
            pending: false,
            phase: RequestPhase::Exec,
            single_row: false,
            row_returning: false,
            prepared: HashMap::new(),
            type_oids: HashMap::new(),
            call_count: 0,
        }
    }

    pub(crate) fn uri(&self) -> String {
        self.params.to_string()
    }

    pub(crate) fn params(&self) -> &ConnectParams {
        &self.params
    }

    pub(crate) fn use_single_row_mode(&self) -> bool {
        self.use_single_row_mode
    }

    pub(crate) fn server_param(&self, name: &str) -> Option<&str> {
        self.server_params.get(name).map(String::as_str)
    }

    pub(crate) fn backend_pid(&self) -> i32 {
        self.backend_pid
    }

    /// Number of requests sent over this connection, including internal ones.
    pub(crate) fn call_count(&self) -> u32 {
        self.call_count
    }

    pub(crate) fn is_connected(&self) -> bool {
        !self.tcp_client.is_dead() && !self.broken
    }

    /// Whether a request exchange is still open on the wire.
    pub(crate) fn has_pending(&self) -> bool {
        self.pending
    }

    /// Renders the request's template and derives per-field parameter
    /// metadata against this connection's type-OID cache.
    pub(crate) fn plan_request(
        &self,
        request: &crate::base::RequestSpec,
    ) -> DbResult<PreparedEntry> {
        use crate::pg::{driver, types_walk};

        let template = request.query_template(&driver::POSTGRES_DRIVER_INFO);
        let template = template
            .expand(&|_| None, true)
            .map_err(|detail| DbError::RequestFailed {
                uri: self.uri(),
                query: None,
                msg: ErrorMsg::protocol(detail),
            })?;
        let sql = driver::render_query(&template).map_err(|detail| DbError::RequestFailed {
            uri: self.uri(),
            query: None,
            msg: ErrorMsg::protocol(detail),
        })?;
        let param_len = request.param_type().length();
        let mut param_oids = vec![0; param_len];
        let mut binary_flags = vec![false; param_len];
        types_walk::init_param_types(
            &mut param_oids,
            &mut binary_flags,
            request.param_type(),
            &self.type_oids,
        )
        .map_err(|e| match e {
            types_walk::WalkError::MissingEnum { name } => DbError::EncodeMissing {
                uri: self.uri(),
                sql_type: format!("enum({name})"),
            },
            types_walk::WalkError::LengthMismatch { .. } => {
                DbError::Usage("type descriptor length does not match its leaves")
            }
        })?;
        let single_row_mode = request.row_mult().can_be_many() && self.use_single_row_mode();
        Ok(PreparedEntry {
            query: sql,
            param_len,
            param_oids,
            binary_flags,
            single_row_mode,
        })
    }

    fn dispatch_notice(&self, msg: &ServerMsg) {
        match self.config.notice_processing() {
            NoticeProcessing::Log => warn!("server notice: {msg}"),
            NoticeProcessing::Quiet => {}
            NoticeProcessing::Custom(handler) => handler(msg),
        }
    }

    fn transport_err(&mut self, source: std::io::Error) -> DbError {
        self.broken = true;
        self.pending = false;
        DbError::RequestFailed {
            uri: self.uri(),
            query: None,
            msg: ErrorMsg::Connection { source },
        }
    }

    fn protocol_err(&mut self, detail: String) -> DbError {
        self.broken = true;
        DbError::RequestFailed {
            uri: self.uri(),
            query: None,
            msg: ErrorMsg::protocol(detail),
        }
    }

    fn no_response_err(&self) -> DbError {
        DbError::RequestFailed {
            uri: self.uri(),
            query: None,
            msg: ErrorMsg::protocol("No response received after send."),
        }
    }

    // A reset inside a transaction would lose session state silently, so a
    // poisoned or broken connection must fail loudly until the transaction
    // flag is cleared (commit/rollback clear it even on failure).
    pub(crate) fn broken_in_transaction_err(&self) -> DbError {
        DbError::RequestFailed {
            uri: self.uri(),
            query: None,
            msg: ErrorMsg::protocol(
                "The connection is broken inside a transaction; session state cannot be restored.",
            ),
        }
    }

    fn extra_response_err(&self) -> DbError {
        DbError::ResponseRejected {
            uri: self.uri(),
            query: None,
            detail: "More than one response received.".to_string(),
        }
    }

    // Downgrades request-phase transport errors to the connect phase.
    fn as_connect_failed(&self, error: DbError) -> DbError {
        match error {
            DbError::RequestFailed { uri, msg, .. } => DbError::ConnectFailed { uri, msg },
            other => other,
        }
    }

    fn connect_rejected(&self, detail: impl Into<String>) -> DbError {
        DbError::ConnectFailed {
            uri: self.uri(),
            msg: ErrorMsg::Connect {
                detail: detail.into(),
            },
        }
    }

    // Classifies a freshly parsed message; the pump only sees what remains.
    fn absorb_session_message(&mut self, msg: BackendMessage) -> Option<BackendMessage> {
        match msg {
            BackendMessage::NoticeResponse(notice) => {
                self.dispatch_notice(&notice);
                None
            }
            BackendMessage::ParameterStatus { name, value } => {
                trace!("parameter status: {name}={value}");
                self.server_params.insert(name, value);
                None
            }
            BackendMessage::NotificationResponse => None,
            other => Some(other),
        }
    }

    fn start_request(&mut self, phase: RequestPhase, single_row: bool) {
        self.pending = true;
        self.phase = phase;
        self.single_row = single_row;
        self.row_returning = false;
        self.call_count += 1;
    }

    // One step of result assembly; pure given the next message.
    fn assemble(
        &mut self,
        msg: BackendMessage,
        rows: &mut Vec<Vec<Option<String>>>,
    ) -> DbResult<Option<Option<QueryResult>>> {
        match msg {
            BackendMessage::ParseComplete => {
                if self.phase == RequestPhase::Prepare {
                    return Ok(Some(Some(QueryResult::command_ok("PREPARE".to_string()))));
                }
                Ok(None)
            }
            BackendMessage::BindComplete
            | BackendMessage::CloseComplete
            | BackendMessage::ParameterDescription { .. } => Ok(None),
            BackendMessage::NoData => {
                self.row_returning = false;
                Ok(None)
            }
            BackendMessage::RowDescription { .. } => {
                self.row_returning = true;
                Ok(None)
            }
            BackendMessage::DataRow { cells } => {
                let row = text_cells(cells).map_err(|detail| self.protocol_err(detail))?;
                if self.single_row {
                    return Ok(Some(Some(QueryResult::single_tuple(row))));
                }
                rows.push(row);
                Ok(None)
            }
            BackendMessage::CommandComplete { tag } => {
                let result = if self.single_row {
                    QueryResult::tuples(Vec::new(), tag)
                } else if self.row_returning {
                    QueryResult::tuples(std::mem::take(rows), tag)
                } else {
                    QueryResult::command_ok(tag)
                };
                self.row_returning = false;
                Ok(Some(Some(result)))
            }
            BackendMessage::EmptyQueryResponse => Ok(Some(Some(QueryResult::empty_query()))),
            BackendMessage::ErrorResponse(msg) => Ok(Some(Some(QueryResult::fatal(msg)))),
            BackendMessage::CopyInResponse { .. } => Ok(Some(Some(QueryResult::copy_in()))),
            BackendMessage::CopyOutResponse => Ok(Some(Some(QueryResult::copy_out()))),
            BackendMessage::CopyData | BackendMessage::CopyDone => Ok(None),
            BackendMessage::ReadyForQuery { txn_status } => {
                trace!("ready for query, server transaction status '{}'", txn_status as char);
                self.pending = false;
                Ok(Some(None))
            }
            BackendMessage::PortalSuspended
            | BackendMessage::Authentication(_)
            | BackendMessage::BackendKeyData { .. }
            | BackendMessage::NoticeResponse(_)
            | BackendMessage::ParameterStatus { .. }
            | BackendMessage::NotificationResponse
            | BackendMessage::Unknown(_) => Ok(Some(Some(QueryResult::bad_response()))),
        }
    }
}

fn text_cells(cells: Vec<Option<Vec<u8>>>) -> Result<Vec<Option<String>>, String> {
    cells
        .into_iter()
        .map(|cell| {
            cell.map(|bytes| {
                String::from_utf8(bytes).map_err(|_| "non-UTF-8 data in row".to_string())
            })
            .transpose()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Synchronous I/O
// ---------------------------------------------------------------------------

#[cfg(feature = "sync")]
impl ConnectionCore {
    pub(crate) fn try_new_sync(
        params: ConnectParams,
        config: &ConnectionConfiguration,
    ) -> DbResult<Self> {
        let mut core = Self::new_disconnected(params, config);
        core.sync_connect_transport()?;
        core.sync_startup()?;
        Ok(core)
    }

    fn sync_connect_transport(&mut self) -> DbResult<()> {
        let client = SyncPlainTcpClient::try_new(self.params.addr()).map_err(|source| {
            DbError::ConnectFailed {
                uri: self.uri(),
                msg: ErrorMsg::Connection { source },
            }
        })?;
        self.tcp_client = TcpClient::SyncPlain(client);
        Ok(())
    }

    pub(crate) fn sync_send(&mut self, buf: &[u8]) -> DbResult<()> {
        let outcome = match self.tcp_client {
            TcpClient::SyncPlain(ref mut client) => client.send(buf),
            #[cfg(feature = "async")]
            TcpClient::AsyncPlain(_) => unreachable!("async transport in sync context"),
            TcpClient::Dead => return Err(DbError::Usage("connection is closed")),
        };
        outcome.map_err(|source| self.transport_err(source))
    }

    fn sync_read_message(&mut self) -> DbResult<BackendMessage> {
        loop {
            let frame = match self.tcp_client {
                TcpClient::SyncPlain(ref mut client) => client.read_frame(),
                #[cfg(feature = "async")]
                TcpClient::AsyncPlain(_) => unreachable!("async transport in sync context"),
                TcpClient::Dead => return Err(DbError::Usage("connection is closed")),
            };
            let frame = frame.map_err(|source| self.transport_err(source))?;
            let msg = BackendMessage::parse(frame.tag, &frame.payload)
                .map_err(|detail| self.protocol_err(detail))?;
            if let Some(msg) = self.absorb_session_message(msg) {
                return Ok(msg);
            }
        }
    }

    fn sync_startup(&mut self) -> DbResult<()> {
        let buf = frontend::startup(self.params.user(), self.params.dbname(), &[]);
        self.sync_send(&buf)
            .map_err(|e| self.as_connect_failed(e))?;
        loop {
            let msg = self
                .sync_read_message()
                .map_err(|e| self.as_connect_failed(e))?;
            match msg {
                BackendMessage::Authentication(AuthRequest::Ok) => {}
                BackendMessage::Authentication(AuthRequest::CleartextPassword) => {
                    let mut buf = Vec::new();
                    frontend::password(self.params.password().unsecure(), &mut buf);
                    self.sync_send(&buf)
                        .map_err(|e| self.as_connect_failed(e))?;
                }
                BackendMessage::Authentication(AuthRequest::Sasl { mechanisms }) => {
                    self.sync_authenticate_scram(&mechanisms)?;
                }
                BackendMessage::Authentication(AuthRequest::Md5Password) => {
                    return Err(self.connect_rejected("unsupported authentication method: md5"));
                }
                BackendMessage::Authentication(other) => {
                    return Err(self
                        .connect_rejected(format!("unsupported authentication request {other:?}")));
                }
                BackendMessage::BackendKeyData { pid, .. } => {
                    self.backend_pid = pid;
                }
                BackendMessage::ReadyForQuery { .. } => return Ok(()),
                BackendMessage::ErrorResponse(msg) => {
                    return Err(DbError::ConnectFailed {
                        uri: self.uri(),
                        msg: ErrorMsg::Server(msg),
                    });
                }
                other => {
                    return Err(
                        self.connect_rejected(format!("unexpected message {other:?} during startup"))
                    );
                }
            }
        }
    }

    fn sync_authenticate_scram(&mut self, mechanisms: &[String]) -> DbResult<()> {
        if !mechanisms.iter().any(|m| m == ScramSha256::MECHANISM) {
            return Err(self.connect_rejected(format!(
                "no supported SASL mechanism among {mechanisms:?}"
            )));
        }
        let mut scram = ScramSha256::new();
        let mut buf = Vec::new();
        frontend::sasl_initial_response(ScramSha256::MECHANISM, &scram.initial_response(), &mut buf);
        self.sync_send(&buf)
            .map_err(|e| self.as_connect_failed(e))?;

        let server_first = match self
            .sync_read_message()
            .map_err(|e| self.as_connect_failed(e))?
        {
            BackendMessage::Authentication(AuthRequest::SaslContinue { data }) => data,
            BackendMessage::ErrorResponse(msg) => {
                return Err(DbError::ConnectFailed {
                    uri: self.uri(),
                    msg: ErrorMsg::Server(msg),
                });
            }
            other => {
                return Err(
                    self.connect_rejected(format!("unexpected message {other:?} during SASL"))
                );
            }
        };
        let password = self.params.password().clone();
        let response = scram
            .continue_exchange(&server_first, password.unsecure())
            .map_err(|detail| self.connect_rejected(detail))?;
        let mut buf = Vec::new();
        frontend::sasl_response(&response, &mut buf);
        self.sync_send(&buf)
            .map_err(|e| self.as_connect_failed(e))?;

        match self
            .sync_read_message()
            .map_err(|e| self.as_connect_failed(e))?
        {
            BackendMessage::Authentication(AuthRequest::SaslFinal { data }) => scram
                .verify_final(&data)
                .map_err(|detail| self.connect_rejected(detail)),
            BackendMessage::ErrorResponse(msg) => Err(DbError::ConnectFailed {
                uri: self.uri(),
                msg: ErrorMsg::Server(msg),
            }),
            other => {
                Err(self.connect_rejected(format!("unexpected message {other:?} during SASL")))
            }
        }
    }

    pub(crate) fn sync_send_request(
        &mut self,
        buf: &[u8],
        phase: RequestPhase,
        single_row: bool,
    ) -> DbResult<()> {
        self.start_request(phase, single_row);
        self.sync_send(buf)
    }

    /// Pulls the next pending result, or `None` once the exchange finished.
    pub(crate) fn sync_get_next_result(&mut self) -> DbResult<Option<QueryResult>> {
        if !self.pending {
            return Ok(None);
        }
        let mut rows = Vec::new();
        loop {
            let msg = self.sync_read_message()?;
            if let Some(step) = self.assemble(msg, &mut rows)? {
                return Ok(step);
            }
        }
    }

    pub(crate) fn sync_get_one_result(&mut self) -> DbResult<QueryResult> {
        match self.sync_get_next_result()? {
            Some(result) => Ok(result),
            None => Err(self.no_response_err()),
        }
    }

    pub(crate) fn sync_get_final_result(&mut self) -> DbResult<QueryResult> {
        let first = self.sync_get_one_result()?;
        let mut extra = false;
        while self.sync_get_next_result()?.is_some() {
            extra = true;
        }
        if extra {
            Err(self.extra_response_err())
        } else {
            Ok(first)
        }
    }

    /// Reads results until the exchange is finished, dropping them.
    pub(crate) fn sync_drain_results(&mut self) -> DbResult<()> {
        while self.sync_get_next_result()?.is_some() {}
        Ok(())
    }

    /// Verifies that the exchange is finished; an outstanding result is a
    /// protocol violation.
    pub(crate) fn sync_expect_end(&mut self) -> DbResult<()> {
        if self.sync_get_next_result()?.is_some() {
            let _ = self.sync_drain_results();
            Err(self.extra_response_err())
        } else {
            Ok(())
        }
    }

    /// Replaces the transport and re-runs the session startup. Prepared
    /// statements do not survive; the cache restarts empty.
    pub(crate) fn sync_reset_transport(&mut self) -> DbResult<()> {
        debug!("trying to reconnect to {}", self.uri());
        self.tcp_client = TcpClient::Dead;
        self.server_params.clear();
        self.prepared.clear();
        self.pending = false;
        self.poisoned = false;
        self.broken = false;
        self.in_transaction = false;
        self.sync_connect_transport()?;
        self.sync_startup()?;
        debug!("reconnected to {}", self.uri());
        Ok(())
    }

    pub(crate) fn sync_terminate(&mut self) {
        if self.tcp_client.is_dead() {
            return;
        }
        let mut buf = Vec::new();
        frontend::terminate(&mut buf);
        if let TcpClient::SyncPlain(ref mut client) = self.tcp_client {
            if let Err(e) = client.send(&buf) {
                debug!("disconnect request failed with {e:?}");
            }
        }
        self.tcp_client = TcpClient::Dead;
    }
}

// ---------------------------------------------------------------------------
// Asynchronous I/O
// ---------------------------------------------------------------------------

#[cfg(feature = "async")]
impl ConnectionCore {
    pub(crate) async fn try_new_async(
        params: ConnectParams,
        config: &ConnectionConfiguration,
    ) -> DbResult<Self> {
        let mut core = Self::new_disconnected(params, config);
        core.async_connect_transport().await?;
        core.async_startup().await?;
        Ok(core)
    }

    async fn async_connect_transport(&mut self) -> DbResult<()> {
        let client = AsyncPlainTcpClient::try_new(self.params.addr())
            .await
            .map_err(|source| DbError::ConnectFailed {
                uri: self.uri(),
                msg: ErrorMsg::Connection { source },
            })?;
        self.tcp_client = TcpClient::AsyncPlain(client);
        Ok(())
    }

    pub(crate) async fn async_send(&mut self, buf: &[u8]) -> DbResult<()> {
        let outcome = match self.tcp_client {
            TcpClient::AsyncPlain(ref mut client) => client.send(buf).await,
            #[cfg(feature = "sync")]
            TcpClient::SyncPlain(_) => unreachable!("sync transport in async context"),
            TcpClient::Dead => return Err(DbError::Usage("connection is closed")),
        };
        outcome.map_err(|source| self.transport_err(source))
    }

    async fn async_read_message(&mut self) -> DbResult<BackendMessage> {
        loop {
            let frame = match self.tcp_client {
                TcpClient::AsyncPlain(ref mut client) => client.read_frame().await,
                #[cfg(feature = "sync")]
                TcpClient::SyncPlain(_) => unreachable!("sync transport in async context"),
                TcpClient::Dead => return Err(DbError::Usage("connection is closed")),
            };
            let frame = frame.map_err(|source| self.transport_err(source))?;
            let msg = BackendMessage::parse(frame.tag, &frame.payload)
                .map_err(|detail| self.protocol_err(detail))?;
            if let Some(msg) = self.absorb_session_message(msg) {
                return Ok(msg);
            }
        }
    }

    async fn async_startup(&mut self) -> DbResult<()> {
        let buf = frontend::startup(self.params.user(), self.params.dbname(), &[]);
        let sent = self.async_send(&buf).await;
        sent.map_err(|e| self.as_connect_failed(e))?;
        loop {
            let msg = self.async_read_message().await;
            let msg = msg.map_err(|e| self.as_connect_failed(e))?;
            match msg {
                BackendMessage::Authentication(AuthRequest::Ok) => {}
                BackendMessage::Authentication(AuthRequest::CleartextPassword) => {
                    let mut buf = Vec::new();
                    frontend::password(self.params.password().unsecure(), &mut buf);
                    let sent = self.async_send(&buf).await;
                    sent.map_err(|e| self.as_connect_failed(e))?;
                }
                BackendMessage::Authentication(AuthRequest::Sasl { mechanisms }) => {
                    self.async_authenticate_scram(&mechanisms).await?;
                }
                BackendMessage::Authentication(AuthRequest::Md5Password) => {
                    return Err(self.connect_rejected("unsupported authentication method: md5"));
                }
                BackendMessage::Authentication(other) => {
                    return Err(self
                        .connect_rejected(format!("unsupported authentication request {other:?}")));
                }
                BackendMessage::BackendKeyData { pid, .. } => {
                    self.backend_pid = pid;
                }
                BackendMessage::ReadyForQuery { .. } => return Ok(()),
                BackendMessage::ErrorResponse(msg) => {
                    return Err(DbError::ConnectFailed {
                        uri: self.uri(),
                        msg: ErrorMsg::Server(msg),
                    });
                }
                other => {
                    return Err(
                        self.connect_rejected(format!("unexpected message {other:?} during startup"))
                    );
                }
            }
        }
    }

    async fn async_authenticate_scram(&mut self, mechanisms: &[String]) -> DbResult<()> {
        if !mechanisms.iter().any(|m| m == ScramSha256::MECHANISM) {
            return Err(self.connect_rejected(format!(
                "no supported SASL mechanism among {mechanisms:?}"
            )));
        }
        let mut scram = ScramSha256::new();
        let mut buf = Vec::new();
        frontend::sasl_initial_response(ScramSha256::MECHANISM, &scram.initial_response(), &mut buf);
        let sent = self.async_send(&buf).await;
        sent.map_err(|e| self.as_connect_failed(e))?;

        let msg = self.async_read_message().await;
        let server_first = match msg.map_err(|e| self.as_connect_failed(e))? {
            BackendMessage::Authentication(AuthRequest::SaslContinue { data }) => data,
            BackendMessage::ErrorResponse(msg) => {
                return Err(DbError::ConnectFailed {
                    uri: self.uri(),
                    msg: ErrorMsg::Server(msg),
                });
            }
            other => {
                return Err(
                    self.connect_rejected(format!("unexpected message {other:?} during SASL"))
                );
            }
        };
        let password = self.params.password().clone();
        let response = scram
            .continue_exchange(&server_first, password.unsecure())
            .map_err(|detail| self.connect_rejected(detail))?;
        let mut buf = Vec::new();
        frontend::sasl_response(&response, &mut buf);
        let sent = self.async_send(&buf).await;
        sent.map_err(|e| self.as_connect_failed(e))?;

        let msg = self.async_read_message().await;
        match msg.map_err(|e| self.as_connect_failed(e))? {
            BackendMessage::Authentication(AuthRequest::SaslFinal { data }) => scram
                .verify_final(&data)
                .map_err(|detail| self.connect_rejected(detail)),
            BackendMessage::ErrorResponse(msg) => Err(DbError::ConnectFailed {
                uri: self.uri(),
                msg: ErrorMsg::Server(msg),
            }),
            other => {
                Err(self.connect_rejected(format!("unexpected message {other:?} during SASL")))
            }
        }
    }

    pub(crate) async fn async_send_request(
        &mut self,
        buf: &[u8],
        phase: RequestPhase,
        single_row: bool,
    ) -> DbResult<()> {
        self.start_request(phase, single_row);
        self.async_send(buf).await
    }

    /// Pulls the next pending result, or `None` once the exchange finished.
    pub(crate) async fn async_get_next_result(&mut self) -> DbResult<Option<QueryResult>> {
        if !self.pending {
            return Ok(None);
        }
        let mut rows = Vec::new();
        loop {
            let msg = self.async_read_message().await?;
            if let Some(step) = self.assemble(msg, &mut rows)? {
                return Ok(step);
            }
        }
    }

    pub(crate) async fn async_get_one_result(&mut self) -> DbResult<QueryResult> {
        match self.async_get_next_result().await? {
            Some(result) => Ok(result),
            None => Err(self.no_response_err()),
        }
    }

    pub(crate) async fn async_get_final_result(&mut self) -> DbResult<QueryResult> {
        let first = self.async_get_one_result().await?;
        let mut extra = false;
        while self.async_get_next_result().await?.is_some() {
            extra = true;
        }
        if extra {
            Err(self.extra_response_err())
        } else {
            Ok(first)
        }
    }

    /// Reads results until the exchange is finished, dropping them.
    pub(crate) async fn async_drain_results(&mut self) -> DbResult<()> {
        while self.async_get_next_result().await?.is_some() {}
        Ok(())
    }

    /// Verifies that the exchange is finished; an outstanding result is a
    /// protocol violation.
    pub(crate) async fn async_expect_end(&mut self) -> DbResult<()> {
        if self.async_get_next_result().await?.is_some() {
            let _ = self.async_drain_results().await;
            Err(self.extra_response_err())
        } else {
            Ok(())
        }
    }

    pub(crate) async fn async_terminate(&mut self) {
        if self.tcp_client.is_dead() {
            return;
        }
        let mut buf = Vec::new();
        frontend::terminate(&mut buf);
        if let TcpClient::AsyncPlain(ref mut client) = self.tcp_client {
            if let Err(e) = client.send(&buf).await {
                debug!("disconnect request failed with {e:?}");
            }
        }
        self.tcp_client = TcpClient::Dead;
    }

    /// Replaces the transport and re-runs the session startup. Prepared
    /// statements do not survive; the cache restarts empty.
    pub(crate) async fn async_reset_transport(&mut self) -> DbResult<()> {
        debug!("trying to reconnect to {}", self.uri());
        self.tcp_client = TcpClient::Dead;
        self.server_params.clear();
        self.prepared.clear();
        self.pending = false;
        self.poisoned = false;
        self.broken = false;
        self.in_transaction = false;
        self.async_connect_transport().await?;
        self.async_startup().await?;
        debug!("reconnected to {}", self.uri());
        Ok(())
    }
}

impl Drop for ConnectionCore {
    // try to send a disconnect to the server, ignore all errors
    fn drop(&mut self) {
        match self.tcp_client {
            #[cfg(feature = "sync")]
            TcpClient::SyncPlain(_) => {
                debug!("dropping connection to {}", self.uri());
                self.sync_terminate();
            }
            #[cfg(feature = "async")]
            TcpClient::AsyncPlain(_) => {
                debug!("dropping connection to {}", self.uri());
                let mut tcp_client = TcpClient::Dead;
                std::mem::swap(&mut tcp_client, &mut self.tcp_client);
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let TcpClient::AsyncPlain(ref mut client) = tcp_client {
                            let mut buf = Vec::new();
                            frontend::terminate(&mut buf);
                            client.send(&buf).await.ok();
                        }
                    });
                }
            }
            TcpClient::Dead => {}
        }
    }
}
