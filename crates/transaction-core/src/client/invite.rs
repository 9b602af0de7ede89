//! INVITE client transaction (RFC 3261 Section 17.1.1, with the RFC 6026 Accepted state).
//!
//! ```text
//!   WaitingToStart --start--> Calling --1xx--> Proceeding
//!                               |  A: retransmit, double A     |
//!                               |  B: timed out                |
//!                               +--------------+---------------+
//!                                              |
//!                      300-699 / send ACK      |      2xx / pass up
//!                     +------------------------+-------------------+
//!                     v                                            v
//!                 Completed --D--> Terminated <--M-- Confirmed (2xx retransmissions passed up)
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{CSeq, HeaderSet, Message, Method, Request, Response};
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::core::TransactionCore;
use crate::transaction::{ClientTransactionState as State, TransactionEvent, TransactionKey};
use crate::transport::{Transport, TransportType};

/// Builds the ACK for a non-2xx final response (RFC 3261 Section 17.1.1.3).
///
/// The ACK reuses the Request-URI, Call-ID, From, top Via and CSeq number of the
/// INVITE, takes To (with its tag) from the response, and copies any Route headers.
pub fn create_ack(request: &Request, response: &Response) -> Request {
    let mut headers = HeaderSet {
        via: request.top_via().cloned().into_iter().collect(),
        from: request.headers.from.clone(),
        to: response.headers.to.clone().or_else(|| request.headers.to.clone()),
        call_id: request.headers.call_id.clone(),
        cseq: request.cseq().map(|cseq| CSeq::new(cseq.seq, Method::Ack)),
        max_forwards: Some(70),
        other: Vec::new(),
    };
    headers.other.extend(
        request
            .headers
            .other
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("Route"))
            .cloned(),
    );
    Request {
        method: Method::Ack,
        uri: request.uri.clone(),
        version: request.version.clone(),
        headers,
        body: String::new(),
    }
}

#[derive(Debug)]
struct Data {
    request: Request,
    last_response: Option<Response>,
    ack: Option<Request>,
    /// Next Timer A interval.
    retransmit_interval: Duration,
}

#[derive(Debug)]
struct Inner {
    core: TransactionCore<State>,
    data: Mutex<Data>,
}

/// Client side of an INVITE transaction.
#[derive(Debug, Clone)]
pub struct InviteClientTransaction {
    inner: Arc<Inner>,
}

impl InviteClientTransaction {
    pub fn new(
        key: TransactionKey,
        request: Request,
        transport: Arc<dyn Transport>,
        transport_type: TransportType,
        settings: TimerSettings,
        events: mpsc::Sender<TransactionEvent>,
    ) -> Self {
        let core = TransactionCore::new(
            key,
            Method::Invite,
            State::WaitingToStart,
            transport,
            transport_type,
            settings,
            events,
        );
        let data = Data {
            request,
            last_response: None,
            ack: None,
            retransmit_interval: settings.timer_a(),
        };
        Self {
            inner: Arc::new(Inner {
                core,
                data: Mutex::new(data),
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

    pub fn is_timer_armed(&self, timer: TimerType) -> bool {
        self.inner.core.timers.is_armed(timer)
    }

    pub async fn original_request(&self) -> Request {
        self.inner.data.lock().await.request.clone()
    }

    pub async fn last_response(&self) -> Option<Response> {
        self.inner.data.lock().await.last_response.clone()
    }

    /// The ACK this transaction generated, if a non-2xx final response arrived.
    pub async fn ack(&self) -> Option<Request> {
        self.inner.data.lock().await.ack.clone()
    }

    /// Sends the INVITE and arms Timers A (unreliable transports only) and B.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        inner.core.ensure_live()?;
        let data = inner.data.lock().await;
        let state = inner.core.state.get();
        if state != State::WaitingToStart {
            return Err(Error::InvalidStateTransition(format!(
                "{}: already started ({:?})",
                inner.core.key, state
            )));
        }
        inner.core.transition(State::Calling).await?;
        inner.core.send(Message::Request(data.request.clone())).await?;
        if !inner.core.is_reliable() {
            start_timer(inner, TimerType::A, data.retransmit_interval);
        }
        start_timer(inner, TimerType::B, inner.core.settings.timer_b());
        Ok(())
    }

    /// Feeds a response that matched this transaction.
    pub async fn process_response(&self, response: Response) -> Result<()> {
        let inner = &self.inner;
        inner.core.ensure_live()?;
        let mut data = inner.data.lock().await;
        let state = inner.core.state.get();
        let status = response.status;

        match state {
            State::Calling | State::Proceeding => {
                inner.core.timers.cancel(TimerType::A);
                inner.core.timers.cancel(TimerType::B);
                if status.is_provisional() {
                    inner.core.transition(State::Proceeding).await?;
                } else if status.is_success() {
                    inner.core.transition(State::Confirmed).await?;
                    start_timer(inner, TimerType::M, inner.core.settings.timer_m());
                } else {
                    let ack = create_ack(&data.request, &response);
                    data.ack = Some(ack.clone());
                    inner.core.transition(State::Completed).await?;
                    inner.core.send(Message::Request(ack)).await?;
                    let wait = inner.core.settings.timer_d(inner.core.is_reliable());
                    start_timer(inner, TimerType::D, wait);
                }
                data.last_response = Some(response.clone());
                inner.core.emit(TransactionEvent::ResponseReceived {
                    key: inner.core.key.clone(),
                    response,
                })
                .await;
            }
            State::Completed if !status.is_provisional() && !status.is_success() => {
                trace!(id = %inner.core.key, %status, "final response retransmitted, resending ACK");
                if let Some(ack) = data.ack.clone() {
                    inner.core.send(Message::Request(ack)).await?;
                }
            }
            State::Confirmed if status.is_success() => {
                data.last_response = Some(response.clone());
                inner.core.emit(TransactionEvent::ResponseReceived {
                    key: inner.core.key.clone(),
                    response,
                })
                .await;
            }
            _ => debug!(id = %inner.core.key, %status, ?state, "response ignored"),
        }
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
    let mut data = inner.data.lock().await;
    if inner.core.is_disposed() {
        return;
    }
    let state = inner.core.state.get();
    match (timer, state) {
        (TimerType::A, State::Calling) => {
            if inner.core.send(Message::Request(data.request.clone())).await.is_err() {
                return;
            }
            // Timer A doubles without the T2 cap.
            data.retransmit_interval *= 2;
            start_timer(&inner, TimerType::A, data.retransmit_interval);
        }
        (TimerType::B, State::Calling) => {
            inner
                .core
                .emit(TransactionEvent::TimedOut {
                    key: inner.core.key.clone(),
                    timer,
                })
                .await;
            inner.core.terminate().await;
        }
        (TimerType::D, State::Completed) | (TimerType::M, State::Confirmed) => {
            inner.core.terminate().await;
        }
        _ => trace!(id = %inner.core.key, %timer, ?state, "stale timer ignored"),
    }
}
