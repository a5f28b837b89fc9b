//! Drives a complete INVITE exchange over loopback UDP: an INVITE client
//! transaction on one socket, an INVITE server transaction on the other,
//! with a tiny auto-answering transaction user ringing and then picking up.
//!
//! Run with `cargo run --example invite_exchange` (add RUST_LOG=debug for
//! the state machine chatter).

use std::sync::Arc;

use tokio::sync::mpsc;

use siprelay_sip_core::{parse_message, SipMessage, StartLine};
use siprelay_sip_transport::{Transport, UdpTransport};
use siprelay_transaction_core::prelude::*;
use siprelay_transaction_core::TransactionCallbacks;

fn demo_callbacks(
    registry: &Arc<TransactionRegistry>,
    events: mpsc::UnboundedSender<SipMessage>,
) -> TransactionCallbacks {
    let registry = registry.clone();
    TransactionCallbacks {
        transport: Arc::new(|transport, message| transport.send(message)),
        tu: Arc::new(move |_transport, message| {
            let _ = events.send(message);
        }),
        termination: Arc::new(move |id, reason| {
            println!("transaction {id} terminated: {reason:?}");
            registry.remove(id);
        }),
    }
}

/// Builds the answer a UAS would send: same Via stack and identifiers, a To
/// tag once it is more than a 100.
fn answer(request: &SipMessage, status: u16, reason: &str) -> SipMessage {
    let mut response = request.clone();
    response.start_line = StartLine::Response {
        status,
        reason: reason.to_string(),
    };
    response.contacts.clear();
    response.headers.clear();
    response.body = None;
    if status > 100 && response.to.tag.is_none() {
        response.to.tag = Some("demo-uas".to_string());
    }
    response
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let uac_socket = UdpTransport::bind("127.0.0.1:0".parse()?).await?;
    let uas_socket = UdpTransport::bind("127.0.0.1:0".parse()?).await?;
    let uac_addr = uac_socket.local_addr()?;
    let uas_addr = uas_socket.local_addr()?;
    println!("UAC on {uac_addr}, UAS on {uas_addr}");

    let uac_registry = Arc::new(TransactionRegistry::new());
    let uas_registry = Arc::new(TransactionRegistry::new());
    let (uac_events_tx, mut uac_events) = mpsc::unbounded_channel();
    let (uas_events_tx, mut uas_events) = mpsc::unbounded_channel();

    // UAS side: feed received requests into server transactions, responses
    // into whatever transaction they match.
    {
        let registry = uas_registry.clone();
        let socket = uas_socket.clone();
        let callbacks = demo_callbacks(&registry, uas_events_tx);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 8192];
            loop {
                let Ok((len, source)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(message) = parse_message(&buf[..len]) else {
                    continue;
                };
                let transport: Arc<dyn Transport> = Arc::new(UdpTransport::new(
                    socket.clone(),
                    socket.local_addr().unwrap(),
                    source,
                ));
                if message.is_request() {
                    let key = TransactionKey::for_server(&message).unwrap();
                    match registry.find(&key) {
                        Some(handle) => handle.event(message).await,
                        None => {
                            let _ = registry.server_transaction(
                                message,
                                transport,
                                callbacks.clone(),
                            );
                        }
                    }
                }
            }
        });
    }

    // UAC side: route received responses to the matching client transaction.
    {
        let registry = uac_registry.clone();
        let socket = uac_socket.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 8192];
            loop {
                let Ok((len, _source)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(message) = parse_message(&buf[..len]) else {
                    continue;
                };
                if let Ok(key) = TransactionKey::for_client(&message) {
                    if let Some(handle) = registry.find(&key) {
                        handle.event(message).await;
                    }
                }
            }
        });
    }

    // The UAS transaction user: ring, then answer.
    let uas_registry_tu = uas_registry.clone();
    tokio::spawn(async move {
        while let Some(request) = uas_events.recv().await {
            if request.method().is_none() {
                continue;
            }
            println!("UAS received {}", request.cseq);
            let key = TransactionKey::for_server(&request).unwrap();
            if let Some(handle) = uas_registry_tu.find(&key) {
                handle.event(answer(&request, 180, "Ringing")).await;
                handle.event(answer(&request, 200, "OK")).await;
            }
        }
    });

    // Send the INVITE through a client transaction aimed at the UAS.
    let invite = parse_message(
        format!(
            "INVITE sip:bob@{uas_addr} SIP/2.0\r\n\
             Via: SIP/2.0/UDP {uac_addr};branch={}\r\n\
             Max-Forwards: 70\r\n\
             From: Alice <sip:alice@{uac_addr}>;tag=demo-uac\r\n\
             To: Bob <sip:bob@{uas_addr}>\r\n\
             Call-ID: demo-call-1\r\n\
             CSeq: 1 INVITE\r\n\
             Contact: <sip:alice@{uac_addr}>\r\n\
             Content-Length: 0\r\n\r\n",
            generate_branch(),
        )
        .as_bytes(),
    )?;

    let transport: Arc<dyn Transport> =
        Arc::new(UdpTransport::new(uac_socket.clone(), uac_addr, uas_addr));
    let callbacks = demo_callbacks(&uac_registry, uac_events_tx);
    uac_registry.client_transaction(invite, transport, callbacks)?;

    // Watch the responses come back.
    while let Some(response) = uac_events.recv().await {
        let status = response.status_code().unwrap_or(0);
        println!(
            "UAC received {status} {}",
            response.reason_phrase().unwrap_or("")
        );
        if status >= 200 {
            break;
        }
    }

    println!("call answered, exchange complete");
    Ok(())
}
