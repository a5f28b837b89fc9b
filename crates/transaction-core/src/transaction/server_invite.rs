//! INVITE server transaction (RFC 3261 section 17.2.1).

use std::cmp;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use siprelay_sip_core::{Method, SipMessage};
use siprelay_sip_transport::Transport;

use crate::builders;
use crate::error::{Error, Result};
use crate::key::TransactionKey;
use crate::timer::{TimerSettings, TransactionTimer};
use crate::transaction::data::TransactionData;
use crate::transaction::{
    TerminationReason, TransactionCallbacks, TransactionHandle, TransactionKind, TransactionState,
    EVENT_CHANNEL_CAPACITY,
};

/// The Proceeding → Completed → Confirmed → Terminated machine for one
/// received INVITE.
///
/// Responses from the TU arrive on the same inbound channel as retransmitted
/// requests; the provisional timer emits an automatic 100 Trying if the TU
/// stays silent past its delay, timer G retransmits a non-2xx final with
/// capped doubling, timer H gives up waiting for the ACK, timer I lingers in
/// Confirmed to absorb ACK retransmissions.
pub struct ServerInviteTransaction {
    data: TransactionData,
    request: SipMessage,
    trying: SipMessage,
    last_response: Option<SipMessage>,
    timer_provisional: TransactionTimer,
    timer_g: TransactionTimer,
    timer_h: TransactionTimer,
    timer_i: TransactionTimer,
    events_rx: mpsc::Receiver<SipMessage>,
}

impl ServerInviteTransaction {
    pub fn new(
        id: TransactionKey,
        request: SipMessage,
        transport: Arc<dyn Transport>,
        callbacks: TransactionCallbacks,
        settings: TimerSettings,
    ) -> Result<(Self, TransactionHandle)> {
        if request.method() != Some(&Method::Invite) {
            return Err(Error::InvalidMethod {
                kind: TransactionKind::InviteServer,
                method: request.cseq_method().clone(),
            });
        }
        let trying = builders::make_trying(&request)?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (data, shared_state) = TransactionData::new(
            id.clone(),
            TransactionState::Proceeding,
            transport,
            callbacks,
            settings,
        );
        let handle = TransactionHandle::new(
            id,
            TransactionKind::InviteServer,
            shared_state,
            events_tx,
        );

        Ok((
            Self {
                data,
                request,
                trying,
                last_response: None,
                timer_provisional: TransactionTimer::new("provisional timer"),
                timer_g: TransactionTimer::new("timer G"),
                timer_h: TransactionTimer::new("timer H"),
                timer_i: TransactionTimer::new("timer I"),
                events_rx,
            },
            handle,
        ))
    }

    pub async fn run(mut self) {
        debug!(id = %self.data.id, "starting INVITE server transaction");

        let request = self.request.clone();
        self.data.deliver_to_tu(request);
        self.timer_provisional
            .start(self.data.settings.provisional_delay);

        while !self.data.is_terminated() {
            tokio::select! {
                maybe = self.events_rx.recv() => match maybe {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
                _ = self.timer_provisional.fired() => self.handle_timer_provisional(),
                _ = self.timer_g.fired() => self.handle_timer_g(),
                _ = self.timer_h.fired() => self.handle_timer_h(),
                _ = self.timer_i.fired() => self.handle_timer_i(),
            }
        }

        self.events_rx.close();
        self.data.notify_termination();
    }

    fn handle_message(&mut self, message: SipMessage) {
        if message.is_request() {
            self.handle_request(message);
        } else {
            self.handle_tu_response(message);
        }
    }

    fn handle_request(&mut self, request: SipMessage) {
        match request.method() {
            Some(Method::Ack) => {
                if self.data.state() == TransactionState::Completed {
                    self.timer_g.stop();
                    self.timer_h.stop();
                    self.timer_i.start(self.data.settings.t4);
                    self.data.set_state(TransactionState::Confirmed);
                }
            }
            Some(Method::Invite) => {
                if self.data.state() == TransactionState::Completed {
                    self.resend_last_response();
                }
            }
            _ => trace!(id = %self.data.id, "ignoring stray request"),
        }
    }

    /// A response handed down by the TU, to be sent on this transaction.
    fn handle_tu_response(&mut self, response: SipMessage) {
        let Some(status) = response.status_code() else {
            return;
        };
        if self.data.state() != TransactionState::Proceeding {
            trace!(id = %self.data.id, status, "dropping TU response outside Proceeding");
            return;
        }

        match status {
            100..=199 => {
                // The TU spoke first, so the automatic 100 stays unsent.
                self.timer_provisional.stop();
                self.data.pass_to_transport(&response);
            }
            200..=299 => {
                self.data.pass_to_transport(&response);
                if !self.data.is_terminated() {
                    self.data.terminate(TerminationReason::Normal);
                }
            }
            _ => {
                self.timer_provisional.stop();
                self.last_response = Some(response.clone());
                self.timer_g.start(self.data.settings.t1);
                self.timer_h.start(self.data.settings.transaction_timeout);
                self.data.set_state(TransactionState::Completed);
                self.data.pass_to_transport(&response);
            }
        }
    }

    fn resend_last_response(&mut self) {
        if let Some(response) = self.last_response.clone() {
            self.data.pass_to_transport(&response);
        }
    }

    fn handle_timer_provisional(&mut self) {
        if self.data.state() == TransactionState::Proceeding {
            let trying = self.trying.clone();
            self.data.pass_to_transport(&trying);
        }
    }

    fn handle_timer_g(&mut self) {
        if self.data.state() == TransactionState::Completed {
            self.timer_g.start(cmp::min(
                self.timer_g.last_duration() * 2,
                self.data.settings.t2,
            ));
            self.resend_last_response();
        }
    }

    fn handle_timer_h(&mut self) {
        if self.data.state() == TransactionState::Completed {
            self.data.terminate(TerminationReason::Timeout);
        }
    }

    fn handle_timer_i(&mut self) {
        if self.data.state() == TransactionState::Confirmed {
            self.data.terminate(TerminationReason::Normal);
        }
    }
}
