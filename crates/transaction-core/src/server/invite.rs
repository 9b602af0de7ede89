//! INVITE server transaction (RFC 3261 Section 17.2.1).
//!
//! ```text
//!             INVITE / send 100 Trying
//!   Started ---------------------------> Proceeding <--+ INVITE / replay last 1xx
//!                                         |   |        |
//!                     1xx, 2xx / send     |   +--------+
//!                     (state unchanged)   |
//!                                         | 300-699 / send, arm G (UDP) and H
//!                                         v
//!      INVITE / replay final  +------> Completed ---- G / resend final, double G up to T2
//!                             +---------  |  |
//!                                    ACK  |  | H / timed out
//!                          disarm G, H,   |  |
//!                              arm I      v  v
//!                                  Confirmed -> Terminated
//!                                        I
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{Message, Method, NameAddr, Request, Response, StatusCode};
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::core::TransactionCore;
use crate::transaction::{
    InviteServerTransactionState as State, SendInterceptor, TransactionEvent, TransactionKey,
};
use crate::transport::{Transport, TransportType};

#[derive(Debug, Default)]
struct Data {
    request: Option<Request>,
    last_provisional: Option<Response>,
    last_final: Option<Response>,
    /// Next Timer G interval.
    retransmit_interval: Duration,
    retransmissions: u32,
}

#[derive(Debug)]
struct Inner {
    core: TransactionCore<State>,
    interceptor: Arc<dyn SendInterceptor>,
    data: Mutex<Data>,
}

/// Server side of an INVITE transaction. Cloning yields another handle to the
/// same transaction.
#[derive(Debug, Clone)]
pub struct InviteServerTransaction {
    inner: Arc<Inner>,
}

impl InviteServerTransaction {
    pub fn new(
        key: TransactionKey,
        transport: Arc<dyn Transport>,
        transport_type: TransportType,
        settings: TimerSettings,
        interceptor: Arc<dyn SendInterceptor>,
        events: mpsc::Sender<TransactionEvent>,
    ) -> Self {
        let core = TransactionCore::new(
            key,
            Method::Invite,
            State::Started,
            transport,
            transport_type,
            settings,
            events,
        );
        let data = Data {
            retransmit_interval: settings.timer_g(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(Inner {
                core,
                interceptor,
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

    pub fn transport_type(&self) -> TransportType {
        self.inner.core.transport_type
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }

    pub fn is_timer_armed(&self, timer: TimerType) -> bool {
        self.inner.core.timers.is_armed(timer)
    }

    /// Interval Timer G will use the next time it is armed.
    pub async fn retransmit_interval(&self) -> Duration {
        self.inner.data.lock().await.retransmit_interval
    }

    /// Number of Timer G retransmissions so far.
    pub async fn retransmission_count(&self) -> u32 {
        self.inner.data.lock().await.retransmissions
    }

    pub async fn original_request(&self) -> Option<Request> {
        self.inner.data.lock().await.request.clone()
    }

    pub async fn last_response(&self) -> Option<Response> {
        let data = self.inner.data.lock().await;
        data.last_final.clone().or_else(|| data.last_provisional.clone())
    }

    /// Feeds a request that matched this transaction.
    pub async fn process_request(&self, request: Request) -> Result<()> {
        let inner = &self.inner;
        inner.core.ensure_live()?;
        let mut data = inner.data.lock().await;

        match inner.core.state.get() {
            State::Started => {
                if request.method != Method::Invite {
                    return Err(Error::InvalidStateTransition(format!(
                        "{} cannot start an INVITE transaction",
                        request.method
                    )));
                }
                let trying = Response::from_request(&request, StatusCode::TRYING);
                data.request = Some(request);
                data.last_provisional = Some(trying.clone());
                inner.core.transition(State::Proceeding).await?;
                inner.core.send(Message::Response(trying)).await?;
            }
            State::Proceeding => {
                trace!(id = %inner.core.key, method = %request.method, "request while proceeding");
                let response = Self::replay_or_forbidden(&data, data.last_provisional.as_ref(), &request);
                inner.core.send(Message::Response(response)).await?;
            }
            State::Completed if request.method == Method::Ack => {
                inner.core.timers.cancel(TimerType::G);
                inner.core.timers.cancel(TimerType::H);
                inner.core.transition(State::Confirmed).await?;
                let wait = inner.core.settings.timer_i(inner.core.is_reliable());
                start_timer(inner, TimerType::I, wait);
            }
            State::Completed => {
                let response = Self::replay_or_forbidden(&data, data.last_final.as_ref(), &request);
                inner.core.send(Message::Response(response)).await?;
            }
            State::Confirmed => {
                trace!(id = %inner.core.key, "absorbed retransmitted ACK");
            }
            State::Terminated => {
                debug!(id = %inner.core.key, method = %request.method, "request after termination ignored");
            }
        }
        Ok(())
    }

    /// Replays `last`, or answers 403 when nothing was recorded.
    fn replay_or_forbidden(data: &Data, last: Option<&Response>, request: &Request) -> Response {
        match last {
            Some(response) => response.clone(),
            None => {
                debug!(has_request = data.request.is_some(), "no response to replay, sending 403");
                Response::from_request(request, StatusCode::FORBIDDEN).with_to_tag(NameAddr::generate_tag())
            }
        }
    }

    /// Sends a response from the TU.
    ///
    /// 1xx and 2xx are sent as-is and leave the state alone; the TU terminates the
    /// transaction once a 2xx is out. 3xx-6xx go through the [`SendInterceptor`] and
    /// move the transaction to `Completed`.
    pub async fn send_response(&self, response: Response) -> Result<()> {
        let inner = &self.inner;
        inner.core.ensure_live()?;
        let mut data = inner.data.lock().await;
        let state = inner.core.state.get();

        if !matches!(state, State::Started | State::Proceeding) {
            return Err(Error::InvalidStateTransition(format!(
                "{}: cannot send {} in state {:?}",
                inner.core.key, response.status, state
            )));
        }

        if response.status.is_provisional() {
            data.last_provisional = Some(response.clone());
            inner.core.send(Message::Response(response)).await?;
            return Ok(());
        }
        if response.status.is_success() {
            inner.core.send(Message::Response(response)).await?;
            return Ok(());
        }

        if !inner.interceptor.before_send(&inner.core.key, &response) {
            debug!(id = %inner.core.key, status = %response.status, "error response cancelled by interceptor");
            return Ok(());
        }
        inner.core.send(Message::Response(response.clone())).await?;
        inner.interceptor.after_send(&inner.core.key, &response);
        data.last_final = Some(response);
        inner.core.transition(State::Completed).await?;

        if !inner.core.is_reliable() {
            data.retransmit_interval = inner.core.settings.timer_g();
            start_timer(inner, TimerType::G, data.retransmit_interval);
        }
        start_timer(inner, TimerType::H, inner.core.settings.timer_h());
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

    /// Stops all timers and makes further use fail with [`Error::Disposed`].
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
    trace!(id = %inner.core.key, %timer, ?state, "timer fired");

    match (timer, state) {
        (TimerType::G, State::Completed) => {
            let Some(response) = data.last_final.clone() else { return };
            data.retransmissions += 1;
            if inner.core.send(Message::Response(response)).await.is_err() {
                return;
            }
            data.retransmit_interval = inner.core.settings.next_interval(data.retransmit_interval);
            start_timer(&inner, TimerType::G, data.retransmit_interval);
        }
        (TimerType::H, State::Completed) => {
            debug!(id = %inner.core.key, "no ACK before Timer H");
            inner
                .core
                .emit(TransactionEvent::TimedOut {
                    key: inner.core.key.clone(),
                    timer,
                })
                .await;
            inner.core.terminate().await;
        }
        (TimerType::I, State::Confirmed) => inner.core.terminate().await,
        _ => trace!(id = %inner.core.key, %timer, ?state, "stale timer ignored"),
    }
}
