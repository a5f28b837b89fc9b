use std::sync::Arc;

use tracing::{debug, warn};

use siprelay_sip_core::SipMessage;
use siprelay_sip_transport::Transport;

use crate::key::TransactionKey;
use crate::timer::TimerSettings;
use crate::transaction::{
    AtomicTransactionState, TerminationReason, TransactionCallbacks, TransactionState,
};

/// State common to all four machines: identity, current state (with its
/// shared mirror), the transport and the three callbacks.
///
/// Handlers mutate state only through `set_state`/`terminate` so the mirror
/// the handle reads never lags the machine.
pub(crate) struct TransactionData {
    pub id: TransactionKey,
    pub transport: Arc<dyn Transport>,
    pub settings: TimerSettings,
    state: TransactionState,
    shared_state: Arc<AtomicTransactionState>,
    callbacks: TransactionCallbacks,
    reason: TerminationReason,
}

impl TransactionData {
    pub fn new(
        id: TransactionKey,
        initial: TransactionState,
        transport: Arc<dyn Transport>,
        callbacks: TransactionCallbacks,
        settings: TimerSettings,
    ) -> (Self, Arc<AtomicTransactionState>) {
        let shared_state = Arc::new(AtomicTransactionState::new(initial));
        let data = TransactionData {
            id,
            transport,
            settings,
            state: initial,
            shared_state: shared_state.clone(),
            callbacks,
            reason: TerminationReason::Normal,
        };
        (data, shared_state)
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == TransactionState::Terminated
    }

    pub fn set_state(&mut self, next: TransactionState) {
        if self.state != next {
            debug!(id = %self.id, "state {:?} -> {:?}", self.state, next);
            self.state = next;
            self.shared_state.set(next);
        }
    }

    pub fn terminate(&mut self, reason: TerminationReason) {
        self.reason = reason;
        self.set_state(TransactionState::Terminated);
    }

    /// Hands `message` to the transport callback; a failed send terminates
    /// the transaction with `TransportError` before any further event.
    pub fn pass_to_transport(&mut self, message: &SipMessage) {
        if !(self.callbacks.transport)(&self.transport, message) {
            warn!(id = %self.id, "transport send failed, terminating");
            self.terminate(TerminationReason::TransportError);
        }
    }

    /// Delivers a received message up to the TU.
    pub fn deliver_to_tu(&self, message: SipMessage) {
        (self.callbacks.tu)(&self.transport, message);
    }

    /// Runs the termination callback. Called exactly once, by the machine's
    /// run loop after it has left its select loop and closed its channel.
    pub fn notify_termination(&self) {
        debug!(id = %self.id, reason = ?self.reason, "transaction terminated");
        (self.callbacks.termination)(&self.id, self.reason);
    }
}
