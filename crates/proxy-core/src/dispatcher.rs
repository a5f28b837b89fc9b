use std::sync::Arc;

use tracing::{debug, warn};

use siprelay_sip_core::{Method, SipMessage};
use siprelay_sip_transport::Transport;
use siprelay_transaction_core::{TransactionKey, TransactionRegistry};

use crate::proxy::stateful_route;
use crate::stateless::stateless_route;

/// Demultiplexes parsed inbound messages onto the transaction table.
///
/// Requests are matched by server key, responses by client key. A miss
/// means: new stateful proxy instance for a request, stateless forward for
/// an ACK, silence for a response.
pub struct Dispatcher {
    registry: Arc<TransactionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<TransactionRegistry>) -> Self {
        Dispatcher { registry }
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    /// Entry point for the listener: one call per parsed datagram.
    pub async fn handle(&self, message: SipMessage, transport: Arc<dyn Transport>) {
        let key = if message.is_request() {
            TransactionKey::for_server(&message)
        } else {
            TransactionKey::for_client(&message)
        };
        let key = match key {
            Ok(key) => key,
            Err(e) => {
                warn!(source = %transport.remote_addr(), error = %e, "cannot derive transaction key");
                return;
            }
        };

        // The lock lives inside `find`; the event send happens after it.
        if let Some(handle) = self.registry.find(&key) {
            debug!(id = %key, "matched existing transaction");
            handle.event(message).await;
            return;
        }

        if !message.is_request() {
            debug!(id = %key, "dropping response without a matching transaction");
            return;
        }

        if message.method() == Some(&Method::Ack) {
            debug!(id = %key, "stray ACK, forwarding statelessly");
            stateless_route(&message, transport).await;
            return;
        }

        stateful_route(self.registry.clone(), message, transport).await;
    }
}
