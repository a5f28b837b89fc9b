//! Non-INVITE client transaction (RFC 3261 section 17.1.2).

use std::cmp;
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

/// The Trying → Proceeding → Completed → Terminated machine for everything
/// that is not an INVITE. Timer E retransmits with capped doubling, timer F
/// bounds the whole exchange, timer K absorbs late response retransmissions.
pub struct ClientNonInviteTransaction {
    data: TransactionData,
    request: SipMessage,
    timer_e: TransactionTimer,
    timer_f: TransactionTimer,
    timer_k: TransactionTimer,
    events_rx: mpsc::Receiver<SipMessage>,
}

impl ClientNonInviteTransaction {
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
                    kind: TransactionKind::NonInviteClient,
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
            TransactionKind::NonInviteClient,
            shared_state,
            events_tx,
        );

        Ok((
            Self {
                data,
                request,
                timer_e: TransactionTimer::new("timer E"),
                timer_f: TransactionTimer::new("timer F"),
                timer_k: TransactionTimer::new("timer K"),
                events_rx,
            },
            handle,
        ))
    }

    pub async fn run(mut self) {
        debug!(id = %self.data.id, "starting non-INVITE client transaction");

        let request = self.request.clone();
        self.data.pass_to_transport(&request);
        if !self.data.is_terminated() {
            self.timer_e.start(self.data.settings.t1);
            self.timer_f.start(self.data.settings.transaction_timeout);
        }

        while !self.data.is_terminated() {
            tokio::select! {
                maybe = self.events_rx.recv() => match maybe {
                    Some(message) => self.handle_message(message),
                    None => break,
                },
                _ = self.timer_e.fired() => self.handle_timer_e(),
                _ = self.timer_f.fired() => self.handle_timer_f(),
                _ = self.timer_k.fired() => self.handle_timer_k(),
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

        match self.data.state() {
            TransactionState::Trying | TransactionState::Proceeding => {
                if status < 200 {
                    self.data.set_state(TransactionState::Proceeding);
                    self.data.deliver_to_tu(response);
                } else {
                    self.timer_e.stop();
                    self.timer_f.stop();
                    self.timer_k.start(self.data.settings.t4);
                    self.data.set_state(TransactionState::Completed);
                    self.data.deliver_to_tu(response);
                }
            }
            // Late retransmissions are soaked up by timer K.
            _ => {}
        }
    }

    fn handle_timer_e(&mut self) {
        let interval = match self.data.state() {
            TransactionState::Trying => {
                cmp::min(self.timer_e.last_duration() * 2, self.data.settings.t2)
            }
            TransactionState::Proceeding => self.data.settings.t2,
            _ => return,
        };
        self.timer_e.start(interval);
        let request = self.request.clone();
        self.data.pass_to_transport(&request);
    }

    fn handle_timer_f(&mut self) {
        if matches!(
            self.data.state(),
            TransactionState::Trying | TransactionState::Proceeding
        ) {
            self.data.terminate(TerminationReason::Timeout);
        }
    }

    fn handle_timer_k(&mut self) {
        if self.data.state() == TransactionState::Completed {
            self.data.terminate(TerminationReason::Normal);
        }
    }
}
