//! Per-role transaction states and a lock-free holder for them.
//!
//! Each of the four RFC 3261 Section 17 state machines gets its own enum so a
//! transaction can never be put into a state that belongs to another role.
//! [`TransactionState`] wraps them for code that handles any transaction.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// States of a client transaction (INVITE and non-INVITE).
///
/// INVITE clients go `WaitingToStart -> Calling -> Proceeding -> Completed -> Terminated`;
/// non-INVITE clients use `Trying` in place of `Calling`. `Confirmed` is the RFC 6026
/// "Accepted" state an INVITE client enters after a 2xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientTransactionState {
    WaitingToStart,
    Calling,
    Trying,
    Proceeding,
    Completed,
    Confirmed,
    Terminated,
}

/// States of an INVITE server transaction (RFC 3261 Section 17.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InviteServerTransactionState {
    Started,
    Proceeding,
    Completed,
    Confirmed,
    Terminated,
}

/// States of a non-INVITE server transaction (RFC 3261 Section 17.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoneInviteServerTransactionState {
    Started,
    Trying,
    Proceeding,
    Completed,
    Terminated,
}

/// Behaviour shared by the per-role state enums.
pub trait StateMachineState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// The terminal state.
    const TERMINATED: Self;

    fn to_code(self) -> u8;
    fn from_code(code: u8) -> Self;

    /// Whether `self -> next` is an edge of the state machine. Moving to the same
    /// state or to `Terminated` is always allowed from a live state.
    fn can_transition_to(self, next: Self) -> bool;

    fn is_terminated(self) -> bool {
        self == Self::TERMINATED
    }
}

impl StateMachineState for ClientTransactionState {
    const TERMINATED: Self = ClientTransactionState::Terminated;

    fn to_code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => Self::WaitingToStart,
            1 => Self::Calling,
            2 => Self::Trying,
            3 => Self::Proceeding,
            4 => Self::Completed,
            5 => Self::Confirmed,
            _ => Self::Terminated,
        }
    }

    fn can_transition_to(self, next: Self) -> bool {
        use ClientTransactionState::*;
        if self == Terminated {
            return false;
        }
        if self == next || next == Terminated {
            return true;
        }
        matches!(
            (self, next),
            (WaitingToStart, Calling)
                | (WaitingToStart, Trying)
                | (Calling, Proceeding)
                | (Calling, Completed)
                | (Calling, Confirmed)
                | (Trying, Proceeding)
                | (Trying, Completed)
                | (Proceeding, Completed)
                | (Proceeding, Confirmed)
        )
    }
}

impl StateMachineState for InviteServerTransactionState {
    const TERMINATED: Self = InviteServerTransactionState::Terminated;

    fn to_code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Started,
            1 => Self::Proceeding,
            2 => Self::Completed,
            3 => Self::Confirmed,
            _ => Self::Terminated,
        }
    }

    fn can_transition_to(self, next: Self) -> bool {
        use InviteServerTransactionState::*;
        if self == Terminated {
            return false;
        }
        if self == next || next == Terminated {
            return true;
        }
        matches!(
            (self, next),
            (Started, Proceeding) | (Started, Completed) | (Proceeding, Completed) | (Completed, Confirmed)
        )
    }
}

impl StateMachineState for NoneInviteServerTransactionState {
    const TERMINATED: Self = NoneInviteServerTransactionState::Terminated;

    fn to_code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Started,
            1 => Self::Trying,
            2 => Self::Proceeding,
            3 => Self::Completed,
            _ => Self::Terminated,
        }
    }

    fn can_transition_to(self, next: Self) -> bool {
        use NoneInviteServerTransactionState::*;
        if self == Terminated {
            return false;
        }
        if self == next || next == Terminated {
            return true;
        }
        matches!(
            (self, next),
            (Started, Trying)
                | (Trying, Proceeding)
                | (Trying, Completed)
                | (Proceeding, Completed)
        )
    }
}

/// The state of any transaction, tagged with its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    Client(ClientTransactionState),
    InviteServer(InviteServerTransactionState),
    NoneInviteServer(NoneInviteServerTransactionState),
}

impl TransactionState {
    pub fn is_terminated(&self) -> bool {
        match self {
            TransactionState::Client(s) => s.is_terminated(),
            TransactionState::InviteServer(s) => s.is_terminated(),
            TransactionState::NoneInviteServer(s) => s.is_terminated(),
        }
    }
}

impl From<ClientTransactionState> for TransactionState {
    fn from(state: ClientTransactionState) -> Self {
        TransactionState::Client(state)
    }
}

impl From<InviteServerTransactionState> for TransactionState {
    fn from(state: InviteServerTransactionState) -> Self {
        TransactionState::InviteServer(state)
    }
}

impl From<NoneInviteServerTransactionState> for TransactionState {
    fn from(state: NoneInviteServerTransactionState) -> Self {
        TransactionState::NoneInviteServer(state)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Client(s) => write!(f, "{:?}", s),
            TransactionState::InviteServer(s) => write!(f, "{:?}", s),
            TransactionState::NoneInviteServer(s) => write!(f, "{:?}", s),
        }
    }
}

/// A state that can be read without taking the transaction lock.
pub struct AtomicState<S> {
    value: AtomicU8,
    _state: PhantomData<S>,
}

impl<S: StateMachineState> AtomicState<S> {
    pub fn new(state: S) -> Self {
        Self {
            value: AtomicU8::new(state.to_code()),
            _state: PhantomData,
        }
    }

    pub fn get(&self) -> S {
        S::from_code(self.value.load(Ordering::Acquire))
    }

    /// Stores `state` and returns the previous one.
    pub fn set(&self, state: S) -> S {
        S::from_code(self.value.swap(state.to_code(), Ordering::AcqRel))
    }

    /// Moves from `current` to `next` only if the state is still `current`.
    pub fn transition_if(&self, current: S, next: S) -> bool {
        self.value
            .compare_exchange(current.to_code(), next.to_code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl<S: StateMachineState> fmt::Debug for AtomicState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicState").field(&self.get()).finish()
    }
}
