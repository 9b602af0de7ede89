//! Transaction building blocks shared by clients and servers.

pub(crate) mod core;
pub mod event;
pub mod key;
pub mod state;
pub mod timers;

use async_trait::async_trait;

pub use event::{PassThrough, SendInterceptor, TransactionEvent};
pub use key::TransactionKey;
pub use state::{
    AtomicState, ClientTransactionState, InviteServerTransactionState,
    NoneInviteServerTransactionState, StateMachineState, TransactionState,
};
pub use timers::TimerSlots;

use crate::message::Method;

/// Operations common to every transaction.
#[async_trait]
pub trait Transaction: Send + Sync {
    fn key(&self) -> &TransactionKey;

    fn method(&self) -> &Method;

    fn state(&self) -> TransactionState;

    fn is_terminated(&self) -> bool {
        self.state().is_terminated()
    }

    /// Moves the transaction to `Terminated`, cancelling its timers and emitting
    /// the terminal events.
    async fn terminate(&self);

    /// Cancels all timers and marks the transaction disposed. Later calls that
    /// act on it fail with [`Error::Disposed`](crate::Error::Disposed).
    fn dispose(&self);
}
