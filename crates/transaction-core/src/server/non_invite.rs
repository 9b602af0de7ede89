//! Non-INVITE server transaction (RFC 3261 Section 17.2.2).
//!
//! `Started -> Trying -> Proceeding -> Completed -> Terminated`. Any final response
//! moves the transaction to `Completed`; Timer J (64*T1 on UDP, zero on reliable
//! transports) then terminates it. Retransmitted requests are answered with the last
//! response sent.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{Message, Method, NameAddr, Request, Response, StatusCode};
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::core::TransactionCore;
use crate::transaction::{
    NoneInviteServerTransactionState as State, SendInterceptor, TransactionEvent, TransactionKey,
};
use crate::transport::{Transport, TransportType};

#[derive(Debug, Default)]
struct Data {
    request: Option<Request>,
    last_provisional: Option<Response>,
    last_final: Option<Response>,
}

#[derive(Debug)]
struct Inner {
    core: TransactionCore<State>,
    interceptor: Arc<dyn SendInterceptor>,
    data: Mutex<Data>,
}

/// Server side of a non-INVITE transaction.
#[derive(Debug, Clone)]
pub struct NoneInviteServerTransaction {
    inner: Arc<Inner>,
}

impl NoneInviteServerTransaction {
    pub fn new(
        key: TransactionKey,
        method: Method,
        transport: Arc<dyn Transport>,
        transport_type: TransportType,
        settings: TimerSettings,
        interceptor: Arc<dyn SendInterceptor>,
        events: mpsc::Sender<TransactionEvent>,
    ) -> Self {
        let core = TransactionCore::new(
            key,
            method,
            State::Started,
            transport,
            transport_type,
            settings,
            events,
        );
        Self {
            inner: Arc::new(Inner {
                core,
                interceptor,
                data: Mutex::new(Data::default()),
            }),
        }
    }

    pub fn key(&self) -> &TransactionKey {
        &self.inner.core.key
    }

    pub fn method(&self) -> &Method {
        &self.inner.core.method
    }

    pub fn state(&self) -> State {
        self.inner.core.state.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }

    pub fn is_timer_armed(&self, timer: TimerType) -> bool {
        self.inner.core.timers.is_armed(timer)
    }

    pub async fn original_request(&self) -> Option<Request> {
        self.inner.data.lock().await.request.clone()
    }

    pub async fn last_response(&self) -> Option<Response> {
        let data = self.inner.data.lock().await;
        data.last_final.clone().or_else(|| data.last_provisional.clone())
    }

    pub async fn process_request(&self, request: Request) -> Result<()> {
        let inner = &self.inner;
        inner.core.ensure_live()?;
        let mut data = inner.data.lock().await;

        match inner.core.state.get() {
            State::Started => {
                if request.method != inner.core.method {
                    return Err(Error::InvalidStateTransition(format!(
                        "{} cannot start a {} transaction",
                        request.method, inner.core.method
                    )));
                }
                data.request = Some(request);
                inner.core.transition(State::Trying).await?;
            }
            State::Trying => {
                trace!(id = %inner.core.key, "retransmission absorbed while trying");
            }
            State::Proceeding => {
                let response = replay_or_forbidden(data.last_provisional.as_ref(), &request);
                inner.core.send(Message::Response(response)).await?;
            }
            State::Completed => {
                let response = replay_or_forbidden(data.last_final.as_ref(), &request);
                inner.core.send(Message::Response(response)).await?;
            }
            State::Terminated => {
                debug!(id = %inner.core.key, "request after termination ignored");
            }
        }
        Ok(())
    }

    /// Sends a response from the TU. 3xx-6xx go through the [`SendInterceptor`].
    pub async fn send_response(&self, response: Response) -> Result<()> {
        let inner = &self.inner;
        inner.core.ensure_live()?;
        let mut data = inner.data.lock().await;
        let state = inner.core.state.get();

        if !matches!(state, State::Trying | State::Proceeding) {
            return Err(Error::InvalidStateTransition(format!(
                "{}: cannot send {} in state {:?}",
                inner.core.key, response.status, state
            )));
        }

        if response.status.is_provisional() {
            data.last_provisional = Some(response.clone());
            inner.core.send(Message::Response(response)).await?;
            inner.core.transition(State::Proceeding).await?;
            return Ok(());
        }

        let error_path = !response.status.is_success();
        if error_path && !inner.interceptor.before_send(&inner.core.key, &response) {
            debug!(id = %inner.core.key, status = %response.status, "error response cancelled by interceptor");
            return Ok(());
        }
        inner.core.send(Message::Response(response.clone())).await?;
        if error_path {
            inner.interceptor.after_send(&inner.core.key, &response);
        }
        data.last_final = Some(response);
        inner.core.transition(State::Completed).await?;
        start_timer(inner, TimerType::J, inner.core.settings.timer_j(inner.core.is_reliable()));
        Ok(())
    }

    /// Runs the expiry logic of `timer` immediately, as if it had fired.
    pub async fn fire_timer(&self, timer: TimerType) {
        self.inner.core.timers.cancel(timer);
        on_timer(self.inner.clone(), timer).await;
    }

    pub async fn terminate(&self) {
        let _guard = self.inner.data.lock().await;
        self.inner.core.terminate().await;
    }

    pub fn dispose(&self) {
        self.inner.core.dispose();
    }
}

fn replay_or_forbidden(last: Option<&Response>, request: &Request) -> Response {
    match last {
        Some(response) => response.clone(),
        None => Response::from_request(request, StatusCode::FORBIDDEN).with_to_tag(NameAddr::generate_tag()),
    }
}

fn start_timer(inner: &Arc<Inner>, timer: TimerType, after: Duration) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    inner.core.timers.arm(timer, after, move |generation| async move {
        let Some(inner) = weak.upgrade() else { return };
        if inner.core.timers.release(timer, generation) {
            on_timer(inner, timer).await;
        }
    });
}

async fn on_timer(inner: Arc<Inner>, timer: TimerType) {
    let _data = inner.data.lock().await;
    if inner.core.is_disposed() {
        return;
    }
    match (timer, inner.core.state.get()) {
        (TimerType::J, State::Completed) => inner.core.terminate().await,
        (timer, state) => trace!(id = %inner.core.key, %timer, ?state, "stale timer ignored"),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use sipmesh_sip_core::SipUri;

    use super::*;
    use crate::message::Via;
    use crate::transaction::PassThrough;
    use crate::transport::TransportError;

    #[derive(Debug, Default)]
    struct Recorder {
        sent: SyncMutex<Vec<Message>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, message: &Message) -> std::result::Result<(), TransportError> {
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    fn options() -> Request {
        Request::new(Method::Options, &SipUri::from_str("sip:bob@biloxi.com").unwrap())
            .with_via(Via::new("UDP", "pc33.atlanta.com", Some("z9hG4bKopt".into())))
            .with_cseq(7)
    }

    fn transaction(transport: Arc<Recorder>, transport_type: TransportType) -> NoneInviteServerTransaction {
        let (tx, _rx) = mpsc::channel(64);
        NoneInviteServerTransaction::new(
            TransactionKey::server("z9hG4bKopt", &Method::Options),
            Method::Options,
            transport,
            transport_type,
            TimerSettings::default(),
            Arc::new(PassThrough),
            tx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle_over_udp() {
        let transport = Arc::new(Recorder::default());
        let tr = transaction(transport.clone(), TransportType::Udp);

        tr.process_request(options()).await.unwrap();
        assert_eq!(tr.state(), State::Trying);
        tr.process_request(options()).await.unwrap();
        assert!(transport.sent.lock().is_empty(), "retransmission in Trying is absorbed");

        tr.send_response(Response::from_request(&options(), StatusCode::TRYING)).await.unwrap();
        assert_eq!(tr.state(), State::Proceeding);
        tr.process_request(options()).await.unwrap();
        assert_eq!(transport.sent.lock().len(), 2, "provisional replayed");

        tr.send_response(Response::from_request(&options(), StatusCode::OK)).await.unwrap();
        assert_eq!(tr.state(), State::Completed);
        assert!(tr.is_timer_armed(TimerType::J));

        tr.process_request(options()).await.unwrap();
        let sent = transport.sent.lock().clone();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[3].as_response().map(|r| r.code()), Some(200));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(tr.state(), State::Completed);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(tr.state(), State::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reliable_transport_terminates_immediately() {
        let tr = transaction(Arc::new(Recorder::default()), TransportType::Tcp);
        tr.process_request(options()).await.unwrap();
        tr.send_response(Response::from_request(&options(), StatusCode::NOT_FOUND)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(tr.state(), State::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_before_request_is_rejected() {
        let tr = transaction(Arc::new(Recorder::default()), TransportType::Udp);
        let result = tr.send_response(Response::new(StatusCode::OK)).await;
        assert!(matches!(result, Err(Error::InvalidStateTransition(_))));
    }
}
