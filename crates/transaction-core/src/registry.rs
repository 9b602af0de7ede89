//! Matches inbound messages to dialogs and transactions.
//!
//! The registry owns three independently locked maps (dialogs, client transactions,
//! server transactions). Inbound requests go, in order of priority, to a matching
//! dialog, to a matching server transaction, or are reported as new requests.
//! Inbound responses go to the client transaction keyed by their top Via branch
//! and CSeq method.
//!
//! Every transaction the registry creates reports to one internal, bounded channel.
//! A forwarding task relays those events to the unbounded receiver returned by
//! [`TransactionRegistry::new`] and removes transactions once they terminate. The
//! forwarder never waits on the transaction user, so a TU that calls back into the
//! registry from its event loop cannot stall the transactions feeding it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::client::ClientTransaction;
use crate::config::TransactionConfig;
use crate::dialog::{Dialog, DialogId, DialogState, DialogTransaction};
use crate::error::{Error, Result};
use crate::message::{
    assemble_headers, assemble_request, assemble_response, parse_start_line, Message, Method, NameAddr,
    Request, Response, StartLine, StatusCode,
};
use crate::server::ServerTransaction;
use crate::transaction::{PassThrough, SendInterceptor, Transaction, TransactionEvent, TransactionKey};
use crate::transport::{Transport, TransportType};

/// Process-wide transaction and dialog tables.
#[derive(Debug)]
pub struct TransactionRegistry {
    config: TransactionConfig,
    transport: Arc<dyn Transport>,
    interceptor: Arc<dyn SendInterceptor>,
    dialogs: Mutex<HashMap<DialogId, Arc<Dialog>>>,
    client_transactions: Mutex<HashMap<TransactionKey, ClientTransaction>>,
    server_transactions: Mutex<HashMap<TransactionKey, ServerTransaction>>,
    internal_tx: mpsc::Sender<TransactionEvent>,
    events_tx: mpsc::UnboundedSender<TransactionEvent>,
}

impl TransactionRegistry {
    /// Creates a registry and the receiver on which it reports events.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: TransactionConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TransactionEvent>) {
        Self::with_interceptor(transport, config, Arc::new(PassThrough))
    }

    /// Like [`new`](Self::new), with a hook on the error-response path of every
    /// server transaction.
    pub fn with_interceptor(
        transport: Arc<dyn Transport>,
        config: TransactionConfig,
        interceptor: Arc<dyn SendInterceptor>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TransactionEvent>) {
        let capacity = config.event_channel_capacity.max(1);
        let (internal_tx, internal_rx) = mpsc::channel(capacity);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            config,
            transport,
            interceptor,
            dialogs: Mutex::new(HashMap::new()),
            client_transactions: Mutex::new(HashMap::new()),
            server_transactions: Mutex::new(HashMap::new()),
            internal_tx,
            events_tx: events_tx.clone(),
        });
        tokio::spawn(forward_events(Arc::downgrade(&registry), internal_rx, events_tx));
        (registry, events_rx)
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    // ---- inbound path ----

    /// Entry point for the transport: the first line of a message, its header lines,
    /// and where it came from. Failures are answered or logged, never returned.
    pub async fn on_packet_received<S: AsRef<str>>(
        &self,
        raw_line: &str,
        header_lines: &[S],
        source: SocketAddr,
        transport_type: TransportType,
    ) {
        match parse_start_line(raw_line) {
            Ok(StartLine::Request(line)) => {
                let request = assemble_request(line, header_lines);
                self.handle_request(request, source, transport_type).await;
            }
            Ok(StartLine::Status(line)) => {
                let response = assemble_response(line, header_lines);
                self.handle_response(response, source).await;
            }
            Err(error) => self.reject_unparseable(raw_line, header_lines, &error).await,
        }
    }

    /// A start line that did not parse. Requests are answered with 400 if they carry
    /// enough headers to route a response; responses are dropped.
    async fn reject_unparseable<S: AsRef<str>>(&self, raw_line: &str, header_lines: &[S], error: &Error) {
        let looks_like_response = raw_line
            .trim_start()
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SIP/"));
        if looks_like_response {
            warn!(line = raw_line, %error, "dropping response with malformed status line");
            return;
        }

        let headers = assemble_headers(header_lines);
        if headers.via.is_empty() {
            warn!(line = raw_line, %error, "dropping malformed request without Via");
            return;
        }
        let mut response = Response::new(StatusCode::BAD_REQUEST);
        response.headers.via = headers.via;
        response.headers.from = headers.from;
        response.headers.to = headers.to;
        response.headers.call_id = headers.call_id;
        response.headers.cseq = headers.cseq;
        let response = self.decorate(response.with_to_tag(NameAddr::generate_tag()));
        info!(line = raw_line, %error, "rejecting malformed request line");
        self.send_stateless_logged(Message::Response(response)).await;
    }

    async fn handle_request(&self, request: Request, source: SocketAddr, transport_type: TransportType) {
        // The checks are independent: each failing one sends its own rejection.
        let mut rejected = false;
        if !self.config.supports_version(&request.version) {
            self.reject(&request, StatusCode::VERSION_NOT_SUPPORTED).await;
            rejected = true;
        }
        if !self.config.supports_scheme(&request.uri_scheme()) {
            self.reject(&request, StatusCode::UNSUPPORTED_URI_SCHEME).await;
            rejected = true;
        }
        if !self.config.supports_method(&request.method) {
            self.reject(&request, StatusCode::METHOD_NOT_ALLOWED).await;
            rejected = true;
        }
        if rejected {
            return;
        }

        let key = TransactionKey::from_request(&request);

        if let Some(dialog) = self.match_dialog(&request) {
            let dialog_id = dialog.id().clone();
            trace!(dialog = %dialog_id, method = %request.method, "request matched dialog");
            if let Some(tx) = key.as_ref().and_then(|key| self.server_transaction(key)) {
                self.process_on_transaction(tx, request).await;
                return;
            }
            let key = match (&request.method, key) {
                (Method::Ack, _) => None,
                (_, Some(key)) => match self.start_server_transaction(key, &request, transport_type).await {
                    Some(tx) => {
                        dialog.add_transaction(DialogTransaction::Server(tx.clone()));
                        Some(tx.key().clone())
                    }
                    None => return,
                },
                (_, None) => {
                    self.reject_missing_branch(&request).await;
                    return;
                }
            };
            self.emit(TransactionEvent::DialogRequest {
                dialog: dialog_id,
                key,
                request,
                source,
            });
            return;
        }

        if let Some(tx) = key.as_ref().and_then(|key| self.server_transaction(key)) {
            self.process_on_transaction(tx, request).await;
            return;
        }

        let key = match (&request.method, key) {
            (Method::Ack, _) => None,
            (_, Some(key)) => match self.start_server_transaction(key, &request, transport_type).await {
                Some(tx) => Some(tx.key().clone()),
                None => return,
            },
            (_, None) => {
                self.reject_missing_branch(&request).await;
                return;
            }
        };
        debug!(method = %request.method, %source, "new request");
        self.emit(TransactionEvent::NewRequest {
            key,
            request,
            source,
            transport: transport_type,
        });
    }

    async fn process_on_transaction(&self, tx: ServerTransaction, request: Request) {
        if !tx.accepts_method(&request.method) {
            debug!(id = %tx.key(), method = %request.method, "method does not match transaction");
            self.reject(&request, StatusCode::BAD_REQUEST).await;
            return;
        }
        if let Err(error) = tx.process_request(request).await {
            warn!(id = %tx.key(), %error, "transaction rejected request");
        }
    }

    async fn start_server_transaction(
        &self,
        key: TransactionKey,
        request: &Request,
        transport_type: TransportType,
    ) -> Option<ServerTransaction> {
        let tx = match self.create_server_transaction(key, &request.method, transport_type) {
            Ok(tx) => tx,
            Err(error) => {
                warn!(%error, "could not create server transaction");
                return None;
            }
        };
        if let Err(error) = tx.process_request(request.clone()).await {
            warn!(id = %tx.key(), %error, "new server transaction failed");
        }
        Some(tx)
    }

    async fn handle_response(&self, response: Response, source: SocketAddr) {
        let tx = TransactionKey::from_response(&response).and_then(|key| self.client_transaction(&key));
        let Some(tx) = tx else {
            debug!(status = %response.status, %source, "response matched no transaction");
            self.emit(TransactionEvent::StrayResponse { response, source });
            return;
        };
        if tx.is_invite() {
            self.track_dialog(&response, false, DialogTransaction::Client(tx.clone()));
        }
        if let Err(error) = tx.process_response(response).await {
            warn!(id = %tx.key(), %error, "transaction rejected response");
        }
    }

    // ---- outbound path ----

    /// Creates, registers and starts a client transaction for `request`.
    ///
    /// An in-dialog request is also attached to its dialog.
    pub async fn send_request(&self, request: Request, transport_type: TransportType) -> Result<ClientTransaction> {
        if request.method == Method::Ack {
            return Err(Error::Other(
                "ACK does not create a client transaction; use send_stateless".to_string(),
            ));
        }
        let key = TransactionKey::for_outgoing_request(&request)
            .ok_or_else(|| Error::Other("request has no Via branch".to_string()))?;
        let dialog_id = DialogId::from_outgoing_request(&request);
        let tx = ClientTransaction::new(
            key.clone(),
            request,
            self.transport.clone(),
            transport_type,
            self.config.timers,
            self.internal_tx.clone(),
        );
        {
            let mut transactions = self.client_transactions.lock();
            if transactions.contains_key(&key) {
                return Err(Error::TransactionExists(key));
            }
            transactions.insert(key.clone(), tx.clone());
        }
        if let Some(dialog) = dialog_id.and_then(|id| self.dialog(&id)) {
            dialog.add_transaction(DialogTransaction::Client(tx.clone()));
        }
        debug!(id = %key, "client transaction created");
        tx.start().await?;
        Ok(tx)
    }

    /// Sends a response through the server transaction `key`, tracking any dialog
    /// it establishes. A 2xx to an INVITE terminates the transaction, which the
    /// forwarder then removes.
    pub async fn send_response(&self, key: &TransactionKey, response: Response) -> Result<()> {
        let tx = self
            .server_transaction(key)
            .ok_or_else(|| Error::TransactionNotFound(key.clone()))?;
        let response = self.decorate(response);
        let ends_invite = tx.is_invite() && response.status.is_success();
        if tx.is_invite() {
            self.track_dialog(&response, true, DialogTransaction::Server(tx.clone()));
        }
        tx.send_response(response).await?;
        // 2xx retransmission belongs to the TU; the INVITE transaction is done.
        if ends_invite {
            tx.terminate().await;
        }
        Ok(())
    }

    /// Sends a message outside any transaction (ACK for a 2xx, stateless replies).
    pub async fn send_stateless(&self, message: Message) -> Result<()> {
        self.transport.send(&message).await?;
        Ok(())
    }

    async fn send_stateless_logged(&self, message: Message) {
        if let Err(error) = self.transport.send(&message).await {
            warn!(%error, "failed to send stateless message");
        }
    }

    async fn reject(&self, request: &Request, status: StatusCode) {
        if request.method == Method::Ack {
            debug!(%status, "not answering ACK");
            return;
        }
        let mut response = Response::from_request(request, status).with_to_tag(NameAddr::generate_tag());
        if status == StatusCode::METHOD_NOT_ALLOWED {
            let allow = self
                .config
                .supported_methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            response = response.with_header("Allow", allow);
        }
        info!(method = %request.method, %status, "rejecting request");
        self.send_stateless_logged(Message::Response(self.decorate(response))).await;
    }

    async fn reject_missing_branch(&self, request: &Request) {
        debug!(method = %request.method, "request without Via branch");
        self.reject(request, StatusCode::BAD_REQUEST).await;
    }

    fn decorate(&self, response: Response) -> Response {
        match &self.config.user_agent {
            Some(agent) if response.headers.get("Server").is_none() => response.with_header("Server", agent.clone()),
            _ => response,
        }
    }

    // ---- transactions ----

    /// Creates and registers a server transaction without feeding it a request.
    pub fn create_server_transaction(
        &self,
        key: TransactionKey,
        method: &Method,
        transport_type: TransportType,
    ) -> Result<ServerTransaction> {
        let mut transactions = self.server_transactions.lock();
        if transactions.contains_key(&key) {
            return Err(Error::TransactionExists(key));
        }
        let tx = ServerTransaction::new(
            key.clone(),
            method,
            self.transport.clone(),
            transport_type,
            self.config.timers,
            self.interceptor.clone(),
            self.internal_tx.clone(),
        );
        transactions.insert(key.clone(), tx.clone());
        debug!(id = %key, "server transaction created");
        Ok(tx)
    }

    pub fn server_transaction(&self, key: &TransactionKey) -> Option<ServerTransaction> {
        self.server_transactions.lock().get(key).cloned()
    }

    pub fn client_transaction(&self, key: &TransactionKey) -> Option<ClientTransaction> {
        self.client_transactions.lock().get(key).cloned()
    }

    /// Server transaction keyed by the request's top Via branch (and CANCEL marker).
    pub fn match_server_transaction(&self, request: &Request) -> Option<ServerTransaction> {
        self.server_transaction(&TransactionKey::from_request(request)?)
    }

    /// Client transaction keyed by the response's top Via branch and CSeq method.
    pub fn match_client_transaction(&self, response: &Response) -> Option<ClientTransaction> {
        self.client_transaction(&TransactionKey::from_response(response)?)
    }

    /// Removes a transaction from its map and from any dialog, disposing it.
    pub fn remove_transaction(&self, key: &TransactionKey) -> bool {
        let removed = if key.is_server {
            self.server_transactions.lock().remove(key).map(|tx| tx.dispose())
        } else {
            self.client_transactions.lock().remove(key).map(|tx| tx.dispose())
        };
        let dialogs: Vec<Arc<Dialog>> = self.dialogs.lock().values().cloned().collect();
        for dialog in dialogs {
            dialog.remove_transaction(key);
        }
        if removed.is_some() {
            trace!(id = %key, "transaction removed");
        }
        removed.is_some()
    }

    pub fn transaction_count(&self) -> usize {
        let clients = self.client_transactions.lock().len();
        clients + self.server_transactions.lock().len()
    }

    // ---- dialogs ----

    /// Dialog an inbound request belongs to (Call-ID, To tag, From tag).
    pub fn match_dialog(&self, request: &Request) -> Option<Arc<Dialog>> {
        self.dialog(&DialogId::from_incoming_request(request)?)
    }

    /// Dialog an inbound response belongs to (Call-ID, From tag, To tag).
    pub fn match_dialog_for_response(&self, response: &Response) -> Option<Arc<Dialog>> {
        self.dialog(&DialogId::from_incoming_response(response)?)
    }

    pub fn dialog(&self, id: &DialogId) -> Option<Arc<Dialog>> {
        self.dialogs.lock().get(id).cloned()
    }

    /// Registers a dialog; returns the existing one if the id is taken.
    pub fn register_dialog(&self, dialog: Dialog) -> Arc<Dialog> {
        self.dialogs
            .lock()
            .entry(dialog.id().clone())
            .or_insert_with(|| Arc::new(dialog))
            .clone()
    }

    pub fn terminate_dialog(&self, id: &DialogId) -> bool {
        match self.dialogs.lock().remove(id) {
            Some(dialog) => {
                dialog.terminate();
                debug!(dialog = %id, "dialog terminated");
                true
            }
            None => false,
        }
    }

    pub fn dialog_count(&self) -> usize {
        self.dialogs.lock().len()
    }

    /// Creates or updates the dialog a response to an INVITE establishes.
    fn track_dialog(&self, response: &Response, is_server: bool, transaction: DialogTransaction) {
        let id = if is_server {
            DialogId::from_outgoing_response(response)
        } else {
            DialogId::from_incoming_response(response)
        };
        let Some(id) = id else { return };

        if let Some(dialog) = self.dialog(&id) {
            if dialog.update_from_response(response) == DialogState::Terminated {
                self.terminate_dialog(&id);
            }
            return;
        }
        if let Some(dialog) = Dialog::from_response(response, is_server) {
            debug!(dialog = %id, state = ?dialog.state(), "dialog created");
            dialog.add_transaction(transaction);
            self.register_dialog(dialog);
        }
    }

    /// Removes terminated transactions and dialogs. Returns how many entries went.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        let terminated: Vec<TransactionKey> = {
            let servers = self.server_transactions.lock();
            let clients = self.client_transactions.lock();
            servers
                .iter()
                .filter(|(_, tx)| tx.is_terminated())
                .map(|(key, _)| key.clone())
                .chain(
                    clients
                        .iter()
                        .filter(|(_, tx)| tx.is_terminated())
                        .map(|(key, _)| key.clone()),
                )
                .collect()
        };
        for key in &terminated {
            if self.remove_transaction(key) {
                removed += 1;
            }
        }

        let mut dialogs = self.dialogs.lock();
        for dialog in dialogs.values() {
            dialog.prune_terminated();
        }
        let before = dialogs.len();
        dialogs.retain(|_, dialog| !dialog.is_terminated());
        removed += before - dialogs.len();
        removed
    }

    fn emit(&self, event: TransactionEvent) {
        if self.events_tx.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}

async fn forward_events(
    registry: Weak<TransactionRegistry>,
    mut internal_rx: mpsc::Receiver<TransactionEvent>,
    events_tx: mpsc::UnboundedSender<TransactionEvent>,
) {
    while let Some(event) = internal_rx.recv().await {
        if let TransactionEvent::Terminated { key } = &event {
            if let Some(registry) = registry.upgrade() {
                registry.remove_transaction(key);
            }
        }
        if events_tx.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
    trace!("registry event forwarder stopped");
}
