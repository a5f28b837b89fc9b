//! End-to-end stateful forwarding through the dispatcher, with a recording
//! transport standing in for the UDP socket.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;

use siprelay_proxy_core::Dispatcher;
use siprelay_sip_core::{parse_message, Method, SipMessage, StartLine};
use siprelay_sip_transport::Transport;
use siprelay_transaction_core::TransactionRegistry;

const PROXY_ADDR: &str = "127.0.0.1:5060";
const UPSTREAM_ADDR: &str = "127.0.0.1:6000";
const DOWNSTREAM_ADDR: &str = "127.0.0.1:5080";

/// Transport double shared across `with_remote` clones, like the real
/// single-socket UDP transport.
#[derive(Clone)]
struct RecordingTransport {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    sent: Arc<Mutex<Vec<(SocketAddr, SipMessage)>>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(RecordingTransport {
            local_addr: PROXY_ADDR.parse().unwrap(),
            remote_addr: UPSTREAM_ADDR.parse().unwrap(),
            sent: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn sent(&self) -> Vec<(SocketAddr, SipMessage)> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_to(&self, destination: &str) -> Vec<SipMessage> {
        let destination: SocketAddr = destination.parse().unwrap();
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == destination)
            .map(|(_, m)| m)
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn send(&self, message: &SipMessage) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((self.remote_addr, message.clone()));
        true
    }

    fn with_remote(&self, remote: SocketAddr) -> Arc<dyn Transport> {
        Arc::new(RecordingTransport {
            local_addr: self.local_addr,
            remote_addr: remote,
            sent: self.sent.clone(),
        })
    }
}

impl fmt::Debug for RecordingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordingTransport({})", self.local_addr)
    }
}

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

fn invite_to_downstream() -> SipMessage {
    parse_message(
        format!(
            "INVITE sip:bob@{DOWNSTREAM_ADDR} SIP/2.0\r\n\
             Via: SIP/2.0/UDP ua.atlanta.com:5060;branch=z9hG4bKupstream1\r\n\
             Max-Forwards: 70\r\n\
             From: Alice <sip:alice@atlanta.com>;tag=100\r\n\
             To: Bob <sip:bob@{DOWNSTREAM_ADDR}>\r\n\
             Call-ID: proxy-test-call-1\r\n\
             CSeq: 1 INVITE\r\n\
             Contact: <sip:alice@ua.atlanta.com>\r\n\
             Content-Length: 0\r\n\r\n"
        )
        .as_bytes(),
    )
    .unwrap()
}

/// The response a downstream UAS sends to a forwarded request: same Via
/// stack, a To tag once it rings.
fn downstream_response(forwarded: &SipMessage, status: u16, reason: &str) -> SipMessage {
    let mut response = forwarded.clone();
    response.start_line = StartLine::Response {
        status,
        reason: reason.to_string(),
    };
    response.contacts.clear();
    response.headers.clear();
    response.body = None;
    if status > 100 && response.to.tag.is_none() {
        response.to.tag = Some("downstream-tag".to_string());
    }
    response
}

fn setup() -> (Arc<Dispatcher>, Arc<RecordingTransport>) {
    let registry = Arc::new(TransactionRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(registry));
    let transport = RecordingTransport::new();
    (dispatcher, transport)
}

#[tokio::test(start_paused = true)]
async fn forwards_an_invite_and_bridges_the_responses() {
    let (dispatcher, transport) = setup();
    let invite = invite_to_downstream();

    {
        let dispatcher = dispatcher.clone();
        let transport = transport.clone() as Arc<dyn Transport>;
        let invite = invite.clone();
        tokio::spawn(async move { dispatcher.handle(invite, transport).await });
    }
    settle().await;

    // One server and one client transaction are live.
    assert_eq!(dispatcher.registry().len(), 2);

    // The forwarded INVITE went downstream with our Via on top.
    let downstream = transport.sent_to(DOWNSTREAM_ADDR);
    assert_eq!(downstream.len(), 1);
    let forwarded = &downstream[0];
    assert_eq!(forwarded.method(), Some(&Method::Invite));
    assert_eq!(forwarded.top_via.host, "127.0.0.1");
    assert_eq!(forwarded.top_via.port, Some(5060));
    let proxy_branch = forwarded.top_via_branch().unwrap().to_string();
    assert!(proxy_branch.starts_with("z9hG4bK"));
    assert_ne!(proxy_branch, "z9hG4bKupstream1");
    assert_eq!(forwarded.vias.len(), 1);
    assert!(forwarded.vias[0].contains("z9hG4bKupstream1"));

    // 180 from downstream: our Via is popped, the rest goes upstream.
    let ringing = downstream_response(forwarded, 180, "Ringing");
    dispatcher
        .handle(ringing, transport.with_remote(DOWNSTREAM_ADDR.parse().unwrap()))
        .await;
    settle().await;

    let upstream = transport.sent_to(UPSTREAM_ADDR);
    assert_eq!(upstream.len(), 1);
    assert_eq!(upstream[0].status_code(), Some(180));
    assert_eq!(upstream[0].top_via_branch(), Some("z9hG4bKupstream1"));
    assert!(upstream[0].vias.is_empty());

    // 200 OK finishes both transactions and the bridge.
    let ok = downstream_response(forwarded, 200, "OK");
    dispatcher
        .handle(ok, transport.with_remote(DOWNSTREAM_ADDR.parse().unwrap()))
        .await;
    settle().await;

    let upstream = transport.sent_to(UPSTREAM_ADDR);
    assert_eq!(upstream.len(), 2);
    assert_eq!(upstream[1].status_code(), Some(200));
    assert_eq!(upstream[1].top_via_branch(), Some("z9hG4bKupstream1"));

    assert_eq!(dispatcher.registry().len(), 0);

    // No automatic 100 was ever needed: the answers were instant.
    assert!(transport
        .sent_to(UPSTREAM_ADDR)
        .iter()
        .all(|m| m.status_code() != Some(100)));
}

#[tokio::test(start_paused = true)]
async fn emits_auto_100_upstream_when_downstream_is_slow() {
    let (dispatcher, transport) = setup();
    let invite = invite_to_downstream();

    {
        let dispatcher = dispatcher.clone();
        let transport = transport.clone() as Arc<dyn Transport>;
        tokio::spawn(async move { dispatcher.handle(invite, transport).await });
    }
    settle().await;

    // Nobody answers for the provisional delay; the INVITE server
    // transaction covers for the proxy with a 100 Trying.
    sleep(Duration::from_millis(200)).await;
    settle().await;

    let upstream = transport.sent_to(UPSTREAM_ADDR);
    assert_eq!(upstream.len(), 1);
    assert_eq!(upstream[0].status_code(), Some(100));
    assert_eq!(upstream[0].top_via_branch(), Some("z9hG4bKupstream1"));
}

#[tokio::test(start_paused = true)]
async fn forwards_a_non_invite_request_through_nist_and_nict() {
    let (dispatcher, transport) = setup();
    let options = parse_message(
        format!(
            "OPTIONS sip:bob@{DOWNSTREAM_ADDR} SIP/2.0\r\n\
             Via: SIP/2.0/UDP ua.atlanta.com:5060;branch=z9hG4bKoptions9\r\n\
             From: Alice <sip:alice@atlanta.com>;tag=55\r\n\
             To: Bob <sip:bob@{DOWNSTREAM_ADDR}>\r\n\
             Call-ID: proxy-test-options-1\r\n\
             CSeq: 2 OPTIONS\r\n\
             Content-Length: 0\r\n\r\n"
        )
        .as_bytes(),
    )
    .unwrap();

    {
        let dispatcher = dispatcher.clone();
        let transport = transport.clone() as Arc<dyn Transport>;
        tokio::spawn(async move { dispatcher.handle(options, transport).await });
    }
    settle().await;

    let downstream = transport.sent_to(DOWNSTREAM_ADDR);
    assert_eq!(downstream.len(), 1);
    assert_eq!(downstream[0].method(), Some(&Method::Options));

    let ok = downstream_response(&downstream[0], 200, "OK");
    dispatcher
        .handle(ok, transport.with_remote(DOWNSTREAM_ADDR.parse().unwrap()))
        .await;
    settle().await;

    let upstream = transport.sent_to(UPSTREAM_ADDR);
    assert_eq!(upstream.len(), 1);
    assert_eq!(upstream[0].status_code(), Some(200));

    // The transactions linger to absorb retransmissions (timers K and J),
    // then the table drains.
    sleep(Duration::from_millis(33_000)).await;
    assert_eq!(dispatcher.registry().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn stray_ack_is_forwarded_statelessly() {
    let (dispatcher, transport) = setup();
    let ack = parse_message(
        format!(
            "ACK sip:bob@{DOWNSTREAM_ADDR} SIP/2.0\r\n\
             Via: SIP/2.0/UDP ua.atlanta.com:5060;branch=z9hG4bKnomatch\r\n\
             From: Alice <sip:alice@atlanta.com>;tag=100\r\n\
             To: Bob <sip:bob@{DOWNSTREAM_ADDR}>;tag=late\r\n\
             Call-ID: proxy-test-call-1\r\n\
             CSeq: 1 ACK\r\n\
             Content-Length: 0\r\n\r\n"
        )
        .as_bytes(),
    )
    .unwrap();

    dispatcher
        .handle(ack, transport.clone() as Arc<dyn Transport>)
        .await;
    settle().await;

    // Forwarded once, no transaction created.
    let downstream = transport.sent_to(DOWNSTREAM_ADDR);
    assert_eq!(downstream.len(), 1);
    assert_eq!(downstream[0].method(), Some(&Method::Ack));
    assert_eq!(dispatcher.registry().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn unmatched_responses_are_dropped() {
    let (dispatcher, transport) = setup();
    let response = parse_message(
        b"SIP/2.0 200 OK\r\n\
          Via: SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bKunknown\r\n\
          From: <sip:alice@atlanta.com>;tag=1\r\n\
          To: <sip:bob@biloxi.com>;tag=2\r\n\
          Call-ID: stray-response\r\n\
          CSeq: 1 INVITE\r\n\
          Content-Length: 0\r\n\r\n",
    )
    .unwrap();

    dispatcher
        .handle(response, transport.clone() as Arc<dyn Transport>)
        .await;
    settle().await;

    assert!(transport.sent().is_empty());
    assert_eq!(dispatcher.registry().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn requests_without_a_branch_are_dropped() {
    let (dispatcher, transport) = setup();
    let bad = parse_message(
        format!(
            "INVITE sip:bob@{DOWNSTREAM_ADDR} SIP/2.0\r\n\
             Via: SIP/2.0/UDP ua.atlanta.com:5060\r\n\
             From: Alice <sip:alice@atlanta.com>;tag=100\r\n\
             To: Bob <sip:bob@{DOWNSTREAM_ADDR}>\r\n\
             Call-ID: no-branch\r\n\
             CSeq: 1 INVITE\r\n\
             Content-Length: 0\r\n\r\n"
        )
        .as_bytes(),
    )
    .unwrap();

    dispatcher
        .handle(bad, transport.clone() as Arc<dyn Transport>)
        .await;
    settle().await;

    assert!(transport.sent().is_empty());
    assert_eq!(dispatcher.registry().len(), 0);
}
