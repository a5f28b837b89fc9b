//! The four RFC 3261 section 17 state machines and their shared plumbing.

pub mod client_invite;
pub mod client_non_invite;
mod data;
pub mod server_invite;
pub mod server_non_invite;

pub use client_invite::ClientInviteTransaction;
pub use client_non_invite::ClientNonInviteTransaction;
pub use server_invite::ServerInviteTransaction;
pub use server_non_invite::ServerNonInviteTransaction;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use siprelay_sip_core::SipMessage;
use siprelay_sip_transport::Transport;

use crate::key::TransactionKey;

/// Defines whether a transaction is INVITE or non-INVITE, client or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    InviteClient,
    NonInviteClient,
    InviteServer,
    NonInviteServer,
}

/// SIP transaction states. Each kind reaches only its own subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Calling,
    Trying,
    Proceeding,
    Completed,
    Confirmed,
    Terminated,
}

/// Why a transaction died, reported through the termination callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Normal,
    Timeout,
    TransportError,
}

/// Writes a message towards the wire; `false` is an unrecoverable transport
/// failure and kills the transaction.
pub type TransportCallback = Arc<dyn Fn(&Arc<dyn Transport>, &SipMessage) -> bool + Send + Sync>;

/// Delivers a received message up to the transaction user. Must not block:
/// push onto a channel or return promptly.
pub type TuCallback = Arc<dyn Fn(&Arc<dyn Transport>, SipMessage) + Send + Sync>;

/// Fired exactly once when the transaction reaches Terminated; the callback
/// is where the registry entry gets removed.
pub type TerminationCallback = Arc<dyn Fn(&TransactionKey, TerminationReason) + Send + Sync>;

/// The three handles a transaction is wired up with at construction.
#[derive(Clone)]
pub struct TransactionCallbacks {
    pub transport: TransportCallback,
    pub tu: TuCallback,
    pub termination: TerminationCallback,
}

/// Lock-free mirror of a transaction's state, shared between the machine's
/// task and its handle so `event` can cheaply drop post-termination traffic.
#[derive(Debug)]
pub struct AtomicTransactionState(AtomicU8);

impl AtomicTransactionState {
    pub fn new(state: TransactionState) -> Self {
        AtomicTransactionState(AtomicU8::new(Self::encode(state)))
    }

    pub fn get(&self) -> TransactionState {
        Self::decode(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: TransactionState) -> TransactionState {
        Self::decode(self.0.swap(Self::encode(state), Ordering::AcqRel))
    }

    fn encode(state: TransactionState) -> u8 {
        match state {
            TransactionState::Calling => 0,
            TransactionState::Trying => 1,
            TransactionState::Proceeding => 2,
            TransactionState::Completed => 3,
            TransactionState::Confirmed => 4,
            TransactionState::Terminated => 5,
        }
    }

    fn decode(value: u8) -> TransactionState {
        match value {
            0 => TransactionState::Calling,
            1 => TransactionState::Trying,
            2 => TransactionState::Proceeding,
            3 => TransactionState::Completed,
            4 => TransactionState::Confirmed,
            _ => TransactionState::Terminated,
        }
    }
}

/// Inbound event channel capacity. One datagram is dispatched at a time, so
/// a short queue is enough; a full queue briefly backpressures the sender.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 5;

/// What the registry stores: enough to route further messages into the
/// machine's task without ever touching the machine itself.
#[derive(Debug, Clone)]
pub struct TransactionHandle {
    id: TransactionKey,
    kind: TransactionKind,
    state: Arc<AtomicTransactionState>,
    events_tx: mpsc::Sender<SipMessage>,
}

impl TransactionHandle {
    pub(crate) fn new(
        id: TransactionKey,
        kind: TransactionKind,
        state: Arc<AtomicTransactionState>,
        events_tx: mpsc::Sender<SipMessage>,
    ) -> Self {
        TransactionHandle {
            id,
            kind,
            state,
            events_tx,
        }
    }

    pub fn id(&self) -> &TransactionKey {
        &self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    /// Enqueues a message for the transaction. Messages offered after
    /// termination are dropped silently, per the layer's contract.
    pub async fn event(&self, message: SipMessage) {
        if self.state.get() == TransactionState::Terminated {
            trace!(id = %self.id, "dropping event for terminated transaction");
            return;
        }
        if self.events_tx.send(message).await.is_err() {
            trace!(id = %self.id, "dropping event for closed transaction channel");
        }
    }
}
