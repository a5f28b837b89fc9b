//! Shared fixtures for the transaction integration tests: a recording mock
//! transport, callback recorders, and canned messages.

#![allow(dead_code)]

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use siprelay_sip_core::{parse_message, Method, SipMessage, StartLine};
use siprelay_sip_transport::Transport;
use siprelay_transaction_core::{
    TerminationReason, TransactionCallbacks, TransactionKey,
};

/// One message the mock transport was asked to send, with the (virtual)
/// moment it happened and where it was aimed.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub at: Instant,
    pub destination: SocketAddr,
    pub message: SipMessage,
}

/// Transport double that records instead of writing to a socket. `send` can
/// be made to fail to exercise the TransportError path. `with_remote` clones
/// share the same log, like the real shared-socket transport.
#[derive(Clone)]
pub struct MockTransport {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failing: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTransport {
            local_addr: "127.0.0.1:5060".parse().unwrap(),
            remote_addr: "127.0.0.1:6000".parse().unwrap(),
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        })
    }

    /// All sends so far, oldest first.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Millisecond offsets of every send relative to `start`.
    pub fn send_offsets(&self, start: Instant) -> Vec<u64> {
        self.sent()
            .iter()
            .map(|s| s.at.duration_since(start).as_millis() as u64)
            .collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn send(&self, message: &SipMessage) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(SentMessage {
            at: Instant::now(),
            destination: self.remote_addr,
            message: message.clone(),
        });
        true
    }

    fn with_remote(&self, remote: SocketAddr) -> Arc<dyn Transport> {
        Arc::new(MockTransport {
            local_addr: self.local_addr,
            remote_addr: remote,
            sent: self.sent.clone(),
            failing: self.failing.clone(),
        })
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MockTransport({} -> {})", self.local_addr, self.remote_addr)
    }
}

/// Records everything a transaction reports upwards: TU deliveries and the
/// termination, each with its virtual timestamp.
#[derive(Clone, Default)]
pub struct TuRecorder {
    pub delivered: Arc<Mutex<Vec<(Instant, SipMessage)>>>,
    pub terminations: Arc<Mutex<Vec<(Instant, TransactionKey, TerminationReason)>>>,
}

impl TuRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> TransactionCallbacks {
        let delivered = self.delivered.clone();
        let terminations = self.terminations.clone();
        TransactionCallbacks {
            transport: Arc::new(|transport, message| transport.send(message)),
            tu: Arc::new(move |_transport, message| {
                delivered.lock().unwrap().push((Instant::now(), message));
            }),
            termination: Arc::new(move |id, reason| {
                terminations
                    .lock()
                    .unwrap()
                    .push((Instant::now(), id.clone(), reason));
            }),
        }
    }

    pub fn delivered_statuses(&self) -> Vec<u16> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, m)| m.status_code())
            .collect()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    pub fn termination_count(&self) -> usize {
        self.terminations.lock().unwrap().len()
    }

    pub fn last_termination(&self) -> Option<(Instant, TransactionKey, TerminationReason)> {
        self.terminations.lock().unwrap().last().cloned()
    }
}

/// Lets queued channel messages and freshly woken tasks run without moving
/// the (paused) clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub fn invite_request() -> SipMessage {
    parse_message(
        b"INVITE sip:bob@biloxi.com SIP/2.0\r\n\
          Via: SIP/2.0/UDP pc33.atlanta.com:5060;branch=z9hG4bKtest776asdhds\r\n\
          Max-Forwards: 70\r\n\
          From: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n\
          To: Bob <sip:bob@biloxi.com>\r\n\
          Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n\
          CSeq: 314159 INVITE\r\n\
          Contact: <sip:alice@pc33.atlanta.com>\r\n\
          Content-Length: 0\r\n\r\n",
    )
    .unwrap()
}

pub fn options_request() -> SipMessage {
    parse_message(
        b"OPTIONS sip:bob@biloxi.com SIP/2.0\r\n\
          Via: SIP/2.0/UDP pc33.atlanta.com:5060;branch=z9hG4bKtestoptions1\r\n\
          Max-Forwards: 70\r\n\
          From: Alice <sip:alice@atlanta.com>;tag=88\r\n\
          To: Bob <sip:bob@biloxi.com>\r\n\
          Call-ID: options@pc33.atlanta.com\r\n\
          CSeq: 7 OPTIONS\r\n\
          Content-Length: 0\r\n\r\n",
    )
    .unwrap()
}

/// Builds the response a remote UAS would send for `request`. Finals and
/// ringing carry a To tag, the way real endpoints answer.
pub fn response_to(request: &SipMessage, status: u16, reason: &str) -> SipMessage {
    let mut response = request.clone();
    response.start_line = StartLine::Response {
        status,
        reason: reason.to_string(),
    };
    response.contacts.clear();
    response.headers.clear();
    response.body = None;
    if status > 100 && response.to.tag.is_none() {
        response.to.tag = Some("uas-tag-1".to_string());
    }
    response
}

/// The ACK a UAC sends for a non-2xx final: same branch and sent-by as the
/// INVITE, so it keys onto the same server transaction.
pub fn ack_for(invite: &SipMessage, response: &SipMessage) -> SipMessage {
    let mut ack = invite.clone();
    ack.start_line = StartLine::Request {
        method: Method::Ack,
        uri: invite.request_uri().unwrap().clone(),
    };
    ack.cseq.method = Method::Ack;
    ack.to = response.to.clone();
    ack.contacts.clear();
    ack.headers.clear();
    ack.body = None;
    ack
}
