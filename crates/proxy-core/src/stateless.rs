use std::sync::Arc;

use tracing::{debug, warn};

use siprelay_sip_core::SipMessage;
use siprelay_sip_transport::Transport;

/// Forwards a request once, with no transaction state: serialize, write to
/// the address derived from the To URI, forget. Used for ACKs that match no
/// transaction (RFC 3261 section 17.2.1 allows stateful ACK absorption only
/// inside a completed INVITE server transaction).
pub async fn stateless_route(request: &SipMessage, transport: Arc<dyn Transport>) {
    if !request.is_request() {
        return;
    }

    let uri = &request.to.uri;
    let host_port = format!("{}:{}", uri.host, uri.port_or_default());
    let destination = match tokio::net::lookup_host(&host_port).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => {
                warn!(%host_port, "no address for stateless destination");
                return;
            }
        },
        Err(e) => {
            warn!(%host_port, error = %e, "cannot resolve stateless destination");
            return;
        }
    };

    let destination_transport = transport.with_remote(destination);
    if destination_transport.send(request) {
        debug!(%destination, "forwarded statelessly");
    } else {
        warn!(%destination, "stateless forward failed");
    }
}
