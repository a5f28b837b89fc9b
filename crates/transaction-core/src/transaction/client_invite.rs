//! INVITE client transaction (RFC 3261 section 17.1.1).

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

/// The Calling → Proceeding → Completed → Terminated machine driving one
/// outbound INVITE. Owns timers A (retransmit, doubling), B (overall
/// timeout) and D (linger after a non-2xx final), and the pre-built ACK it
/// answers non-2xx finals with.
pub struct ClientInviteTransaction {
    data: TransactionData,
    request: SipMessage,
    ack: SipMessage,
    timer_a: TransactionTimer,
    timer_b: TransactionTimer,
    timer_d: TransactionTimer,
    events_rx: mpsc::Receiver<SipMessage>,
}

impl ClientInviteTransaction {
    pub fn new(
        id: TransactionKey,
        request: SipMessage,
        transport: Arc<dyn Transport>,
        callbacks: TransactionCallbacks,
        settings: TimerSettings,
    ) -> Result<(Self, TransactionHandle)> {
        if request.method() != Some(&Method::Invite) {
            return Err(Error::InvalidMethod {
                kind: TransactionKind::InviteClient,
                method: request.cseq_method().clone(),
            });
        }
        let ack = builders::make_ack_template(&request)?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (data, shared_state) = TransactionData::new(
            id.clone(),
            TransactionState::Calling,
            transport,
            callbacks,
            settings,
        );
        let handle = TransactionHandle::new(
            id,
            TransactionKind::InviteClient,
            shared_state,
            events_tx,
        );

        Ok((
            Self {
                data,
                request,
                ack,
                timer_a: TransactionTimer::new("timer A"),
                timer_b: TransactionTimer::new("timer B"),
                timer_d: TransactionTimer::new("timer D"),
                events_rx,
            },
            handle,
        ))
    }

    /// Drives the transaction to termination. Sends the INVITE, then selects
    /// over the inbound channel and the armed timers until the machine dies.
    pub async fn run(mut self) {
        debug!(id = %self.data.id, "starting INVITE client transaction");

        let request = self.request.clone();
        self.data.pass_to_transport(&request);
        if !self.data.is_terminated() {
            self.timer_a.start(self.data.settings.t1);
            self.timer_b.start(self.data.settings.transaction_timeout);
        }

        while !self.data.is_terminated() {
            tokio::select! {
                maybe = self.events_rx.recv() => match maybe {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
                _ = self.timer_a.fired() => self.handle_timer_a(),
                _ = self.timer_b.fired() => self.handle_timer_b(),
                _ = self.timer_d.fired() => self.handle_timer_d(),
            }
        }

        self.events_rx.close();
        self.data.notify_termination();
    }

    fn handle_message(&mut self, response: SipMessage) {
        let Some(status) = response.status_code() else {
            trace!(id = %self.data.id, "ignoring request on client transaction");
            return;
        };

        match status {
            100..=199 => match self.data.state() {
                TransactionState::Calling => {
                    self.timer_a.stop();
                    self.data.set_state(TransactionState::Proceeding);
                    self.data.deliver_to_tu(response);
                }
                TransactionState::Proceeding => self.data.deliver_to_tu(response),
                _ => {}
            },
            200..=299 => match self.data.state() {
                TransactionState::Calling | TransactionState::Proceeding => {
                    // 2xx ends the transaction; the ACK for it is a new
                    // transaction and the TU's responsibility.
                    self.data.deliver_to_tu(response);
                    self.data.terminate(TerminationReason::Normal);
                }
                _ => {}
            },
            _ => match self.data.state() {
                TransactionState::Calling | TransactionState::Proceeding => {
                    self.ack.to = response.to.clone();
                    self.timer_b.stop();
                    self.timer_d.start(self.data.settings.wait_time_d);
                    self.data.set_state(TransactionState::Completed);
                    let ack = self.ack.clone();
                    self.data.pass_to_transport(&ack);
                    if !self.data.is_terminated() {
                        self.data.deliver_to_tu(response);
                    }
                }
                TransactionState::Completed => {
                    // Retransmitted final: re-ACK, nothing goes up.
                    self.ack.to = response.to.clone();
                    let ack = self.ack.clone();
                    self.data.pass_to_transport(&ack);
                }
                _ => {}
            },
        }
    }

    fn handle_timer_a(&mut self) {
        if self.data.state() == TransactionState::Calling {
            self.timer_a.start(self.timer_a.last_duration() * 2);
            let request = self.request.clone();
            self.data.pass_to_transport(&request);
        }
    }

    fn handle_timer_b(&mut self) {
        if self.data.state() == TransactionState::Calling {
            self.data.terminate(TerminationReason::Timeout);
        }
    }

    fn handle_timer_d(&mut self) {
        if self.data.state() == TransactionState::Completed {
            self.data.terminate(TerminationReason::Normal);
        }
    }
}
