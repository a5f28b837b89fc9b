use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use siprelay_sip_core::{SipMessage, Uri, Via};
use siprelay_sip_transport::Transport;
use siprelay_transaction_core::{
    utils::generate_branch, TerminationReason, TransactionCallbacks, TransactionRegistry,
    TransportCallback,
};

/// Channel events a proxy instance receives from its two transactions:
/// a delivered message, or `None` when the transaction died abnormally.
type ProxyEvent = Option<SipMessage>;

/// Runs one stateful forwarding exchange to completion.
///
/// Starts the server transaction for `request`, waits for the transaction
/// layer to hand the request back up, resolves the destination from the To
/// URI, prepends this element's Via and starts the companion client
/// transaction. Responses flow back with our Via popped; a final response
/// (or an abnormal termination on either side) ends the instance.
pub async fn stateful_route(
    registry: Arc<TransactionRegistry>,
    request: SipMessage,
    transport: Arc<dyn Transport>,
) {
    let (server_tx, mut server_rx) = mpsc::unbounded_channel::<ProxyEvent>();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<ProxyEvent>();

    let transport_cb: TransportCallback =
        Arc::new(|transport, message| transport.send(message));

    let server = match registry.server_transaction(
        request,
        transport.clone(),
        proxy_callbacks(&registry, transport_cb.clone(), server_tx),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "cannot start server transaction");
            return;
        }
    };

    // The first TU delivery is the request itself.
    let Some(Some(mut request)) = server_rx.recv().await else {
        return;
    };

    let Some(destination) = resolve_destination(&request.to.uri).await else {
        return;
    };
    let destination_transport = transport.with_remote(destination);

    // Our hop joins the Via stack with a fresh branch; the old topmost is
    // pushed down. Responses matching that branch come back to us.
    let local = transport.local_addr();
    request.push_via(Via::udp(
        local.ip().to_string(),
        local.port(),
        generate_branch(),
    ));

    if let Err(e) = registry.client_transaction(
        request,
        destination_transport,
        proxy_callbacks(&registry, transport_cb, client_tx),
    ) {
        warn!(error = %e, "cannot start client transaction");
        return;
    }

    loop {
        tokio::select! {
            event = client_rx.recv() => match event {
                Some(Some(mut response)) => {
                    // Always strip our own Via before forwarding upstream.
                    if response.pop_via().is_err() {
                        warn!("response lost its Via stack, dropping");
                        continue;
                    }
                    let status = response.status_code().unwrap_or(0);
                    debug!(status, "forwarding response upstream");
                    server.event(response).await;
                    if status >= 200 {
                        return;
                    }
                }
                Some(None) | None => return,
            },
            event = server_rx.recv() => match event {
                // Normal TU traffic (request retransmissions are absorbed by
                // the transaction itself); only an abnormal termination or a
                // closed channel ends the bridge from this side.
                Some(Some(_)) => {}
                Some(None) | None => return,
            },
        }
    }
}

/// The callback triple a proxy instance hands to each of its transactions:
/// received messages go onto `events`, abnormal termination pushes the
/// `None` sentinel so the bridge unblocks, and every termination removes
/// the registry entry.
fn proxy_callbacks(
    registry: &Arc<TransactionRegistry>,
    transport_cb: TransportCallback,
    events: mpsc::UnboundedSender<ProxyEvent>,
) -> TransactionCallbacks {
    let tu_events = events.clone();
    let registry = registry.clone();
    TransactionCallbacks {
        transport: transport_cb,
        tu: Arc::new(move |_transport, message| {
            let _ = tu_events.send(Some(message));
        }),
        termination: Arc::new(move |id, reason| {
            if reason != TerminationReason::Normal {
                warn!(id = %id, ?reason, "transaction terminated abnormally");
                let _ = events.send(None);
            }
            registry.remove(id);
        }),
    }
}

/// Destination of the minimal routing policy: the To URI's host and port.
async fn resolve_destination(uri: &Uri) -> Option<SocketAddr> {
    // A bracketed IPv6 host concatenates into the form lookup_host expects.
    let destination = format!("{}:{}", uri.host, uri.port_or_default());
    let result = tokio::net::lookup_host(&destination).await;
    match result {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            warn!(%destination, error = %e, "cannot resolve destination");
            None
        }
    }
}
