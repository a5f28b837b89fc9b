//! Non-INVITE server transaction (RFC 3261 section 17.2.2).

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use siprelay_sip_core::{Method, SipMessage};
use siprelay_sip_transport::Transport;

use crate::error::{Error, Result};
use crate::key::TransactionKey;
use crate::timer::{TimerSettings, TransactionTimer};
use crate::transaction::data::TransactionData;
use crate::transaction::{
    TerminationReason, TransactionCallbacks, TransactionHandle, TransactionKind, TransactionState,
    EVENT_CHANNEL_CAPACITY,
};

/// The Trying → Proceeding → Completed → Terminated machine for one received
/// non-INVITE request. Retransmitted requests are answered from the saved
/// last response; timer J holds Completed open long enough to keep doing so.
pub struct ServerNonInviteTransaction {
    data: TransactionData,
    request: SipMessage,
    last_response: Option<SipMessage>,
    timer_j: TransactionTimer,
    events_rx: mpsc::Receiver<SipMessage>,
}

impl ServerNonInviteTransaction {
    pub fn new(
        id: TransactionKey,
        request: SipMessage,
        transport: Arc<dyn Transport>,
        callbacks: TransactionCallbacks,
        settings: TimerSettings,
    ) -> Result<(Self, TransactionHandle)> {
        match request.method() {
            None => return Err(Error::NotRequest),
            Some(Method::Invite) | Some(Method::Ack) => {
                return Err(Error::InvalidMethod {
                    kind: TransactionKind::NonInviteServer,
                    method: request.method().unwrap().clone(),
                })
            }
            Some(_) => {}
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (data, shared_state) = TransactionData::new(
            id.clone(),
            TransactionState::Trying,
            transport,
            callbacks,
            settings,
        );
        let handle = TransactionHandle::new(
            id,
            TransactionKind::NonInviteServer,
            shared_state,
            events_tx,
        );

        Ok((
            Self {
                data,
                request,
                last_response: None,
                timer_j: TransactionTimer::new("timer J"),
                events_rx,
            },
            handle,
        ))
    }

    pub async fn run(mut self) {
        debug!(id = %self.data.id, "starting non-INVITE server transaction");

        let request = self.request.clone();
        self.data.deliver_to_tu(request);

        while !self.data.is_terminated() {
            tokio::select! {
                maybe = self.events_rx.recv() => match maybe {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
                _ = self.timer_j.fired() => self.handle_timer_j(),
            }
        }

        self.events_rx.close();
        self.data.notify_termination();
    }

    fn handle_message(&mut self, message: SipMessage) {
        if message.is_request() {
            // Retransmission of the original request.
            if matches!(
                self.data.state(),
                TransactionState::Proceeding | TransactionState::Completed
            ) {
                if let Some(response) = self.last_response.clone() {
                    self.data.pass_to_transport(&response);
                }
            }
            return;
        }

        let Some(status) = message.status_code() else {
            return;
        };
        if !matches!(
            self.data.state(),
            TransactionState::Trying | TransactionState::Proceeding
        ) {
            trace!(id = %self.data.id, status, "dropping TU response after final");
            return;
        }

        self.last_response = Some(message.clone());
        if status < 200 {
            self.data.set_state(TransactionState::Proceeding);
            self.data.pass_to_transport(&message);
        } else {
            self.timer_j.start(self.data.settings.transaction_timeout);
            self.data.set_state(TransactionState::Completed);
            self.data.pass_to_transport(&message);
        }
    }

    fn handle_timer_j(&mut self) {
        if self.data.state() == TransactionState::Completed {
            self.data.terminate(TerminationReason::Normal);
        }
    }
}
