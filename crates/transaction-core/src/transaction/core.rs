use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::message::{Message, Method};
use crate::timer::TimerSettings;
use crate::transport::{Transport, TransportError, TransportType};

use super::event::TransactionEvent;
use super::key::TransactionKey;
use super::state::{AtomicState, StateMachineState, TransactionState};
use super::timers::TimerSlots;

/// State and plumbing shared by every transaction kind.
#[derive(Debug)]
pub(crate) struct TransactionCore<S: StateMachineState> {
    pub key: TransactionKey,
    pub method: Method,
    pub transport_type: TransportType,
    pub settings: TimerSettings,
    pub state: AtomicState<S>,
    pub timers: TimerSlots,
    transport: Arc<dyn Transport>,
    events: mpsc::Sender<TransactionEvent>,
    disposed: AtomicBool,
}

impl<S> TransactionCore<S>
where
    S: StateMachineState,
    TransactionState: From<S>,
{
    pub fn new(
        key: TransactionKey,
        method: Method,
        initial: S,
        transport: Arc<dyn Transport>,
        transport_type: TransportType,
        settings: TimerSettings,
        events: mpsc::Sender<TransactionEvent>,
    ) -> Self {
        Self {
            key,
            method,
            transport_type,
            settings,
            state: AtomicState::new(initial),
            timers: TimerSlots::new(),
            transport,
            events,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.transport_type.is_reliable()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fails with [`Error::Disposed`] once the transaction has been disposed.
    pub fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(Error::Disposed(self.key.clone()))
        } else {
            Ok(())
        }
    }

    pub async fn emit(&self, event: TransactionEvent) {
        if self.events.send(event).await.is_err() {
            trace!(id = %self.key, "event receiver dropped");
        }
    }

    /// Hands `message` to the transport. A failure is reported as an event and
    /// terminates the transaction before the error is returned.
    pub async fn send(&self, message: Message) -> std::result::Result<(), TransportError> {
        match self.transport.send(&message).await {
            Ok(()) => Ok(()),
            Err(error) => {
                warn!(id = %self.key, %error, "failed to send message");
                self.emit(TransactionEvent::TransportError {
                    key: self.key.clone(),
                    error: error.clone(),
                })
                .await;
                self.terminate().await;
                Err(error)
            }
        }
    }

    /// Moves to `next`, emitting `StateChanged` (and `Terminated` for the terminal
    /// state). Entering `Terminated` cancels every timer.
    pub async fn transition(&self, next: S) -> Result<()> {
        let previous = self.state.get();
        if previous == next {
            return Ok(());
        }
        if !previous.can_transition_to(next) {
            return Err(Error::InvalidStateTransition(format!(
                "{}: {:?} -> {:?}",
                self.key, previous, next
            )));
        }
        if !self.state.transition_if(previous, next) {
            return Err(Error::InvalidStateTransition(format!(
                "{}: state changed concurrently from {:?}",
                self.key, previous
            )));
        }
        debug!(id = %self.key, ?previous, current = ?next, "state transition");

        if next.is_terminated() {
            self.timers.cancel_all();
        }
        self.emit(TransactionEvent::StateChanged {
            key: self.key.clone(),
            previous: previous.into(),
            current: next.into(),
        })
        .await;
        if next.is_terminated() {
            self.emit(TransactionEvent::Terminated { key: self.key.clone() }).await;
        }
        Ok(())
    }

    /// Forces the transaction into `Terminated` from any live state.
    pub async fn terminate(&self) {
        let previous = self.state.get();
        if previous.is_terminated() {
            return;
        }
        if let Err(e) = self.transition(S::TERMINATED).await {
            debug!(id = %self.key, error = %e, "terminate raced with another transition");
        }
    }

    /// Stops every timer, then marks the transaction disposed and terminated.
    /// No events are emitted.
    pub fn dispose(&self) {
        self.timers.cancel_all();
        self.disposed.store(true, Ordering::Release);
        self.state.set(S::TERMINATED);
        trace!(id = %self.key, "transaction disposed");
    }
}
