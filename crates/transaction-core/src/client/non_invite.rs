//! Non-INVITE client transaction (RFC 3261 Section 17.1.2).
//!
//! `WaitingToStart -> Trying -> Proceeding -> Completed -> Terminated`. Timer E
//! retransmits the request, doubling up to T2 while `Trying` and at T2 while
//! `Proceeding`. Timer F times the transaction out and Timer K absorbs response
//! retransmissions once `Completed`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{Message, Method, Request, Response};
use crate::timer::{TimerSettings, TimerType};
use crate::transaction::core::TransactionCore;
use crate::transaction::{ClientTransactionState as State, TransactionEvent, TransactionKey};
use crate::transport::{Transport, TransportType};

#[derive(Debug)]
struct Data {
    request: Request,
    last_response: Option<Response>,
    retransmit_interval: Duration,
}

#[derive(Debug)]
struct Inner {
    core: TransactionCore<State>,
    data: Mutex<Data>,
}

/// Client side of a non-INVITE transaction.
#[derive(Debug, Clone)]
pub struct NonInviteClientTransaction {
    inner: Arc<Inner>,
}

impl NonInviteClientTransaction {
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
            request.method.clone(),
            State::WaitingToStart,
            transport,
            transport_type,
            settings,
            events,
        );
        let data = Data {
            request,
            last_response: None,
            retransmit_interval: settings.timer_e(),
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

    /// Sends the request and arms Timers E (unreliable transports only) and F.
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
        inner.core.transition(State::Trying).await?;
        inner.core.send(Message::Request(data.request.clone())).await?;
        if !inner.core.is_reliable() {
            start_timer(inner, TimerType::E, data.retransmit_interval);
        }
        start_timer(inner, TimerType::F, inner.core.settings.timer_f());
        Ok(())
    }

    pub async fn process_response(&self, response: Response) -> Result<()> {
        let inner = &self.inner;
        inner.core.ensure_live()?;
        let mut data = inner.data.lock().await;
        let state = inner.core.state.get();
        let status = response.status;

        match state {
            State::Trying | State::Proceeding => {
                if status.is_provisional() {
                    inner.core.transition(State::Proceeding).await?;
                } else {
                    inner.core.timers.cancel(TimerType::E);
                    inner.core.timers.cancel(TimerType::F);
                    inner.core.transition(State::Completed).await?;
                    let wait = inner.core.settings.timer_k(inner.core.is_reliable());
                    start_timer(inner, TimerType::K, wait);
                }
                data.last_response = Some(response.clone());
                inner.core.emit(TransactionEvent::ResponseReceived {
                    key: inner.core.key.clone(),
                    response,
                })
                .await;
            }
            State::Completed => trace!(id = %inner.core.key, %status, "retransmitted response absorbed"),
            _ => debug!(id = %inner.core.key, %status, ?state, "response ignored"),
        }
        Ok(())
    }

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
        (TimerType::E, State::Trying | State::Proceeding) => {
            if inner.core.send(Message::Request(data.request.clone())).await.is_err() {
                return;
            }
            data.retransmit_interval = if state == State::Trying {
                inner.core.settings.next_interval(data.retransmit_interval)
            } else {
                inner.core.settings.t2
            };
            start_timer(&inner, TimerType::E, data.retransmit_interval);
        }
        (TimerType::F, State::Trying | State::Proceeding) => {
            inner
                .core
                .emit(TransactionEvent::TimedOut {
                    key: inner.core.key.clone(),
                    timer,
                })
                .await;
            inner.core.terminate().await;
        }
        (TimerType::K, State::Completed) => inner.core.terminate().await,
        _ => trace!(id = %inner.core.key, %timer, ?state, "stale timer ignored"),
    }
}
