use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::warn;

use siprelay_sip_core::SipMessage;

use crate::error::{Error, Result};
use crate::Transport;

// Largest payload a UDP datagram can carry.
const MAX_UDP_PACKET_SIZE: usize = 65_507;

/// UDP transport sharing the listener's socket.
///
/// Cloning via `with_remote` is cheap: every instance holds the same
/// `Arc<UdpSocket>` and differs only in the peer it writes to.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl UdpTransport {
    /// Binds a fresh socket; the listener side of the process uses this once.
    pub async fn bind(addr: SocketAddr) -> Result<Arc<UdpSocket>> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::BindFailed(addr, e))?;
        Ok(Arc::new(socket))
    }

    /// Wraps an already-bound socket with a fixed remote peer.
    pub fn new(socket: Arc<UdpSocket>, local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        UdpTransport {
            socket,
            local_addr,
            remote_addr,
        }
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn send(&self, message: &SipMessage) -> bool {
        let bytes = message.to_bytes();
        if bytes.len() > MAX_UDP_PACKET_SIZE {
            warn!(
                destination = %self.remote_addr,
                size = bytes.len(),
                "dropping oversized SIP message"
            );
            return false;
        }
        match self.socket.try_send_to(&bytes, self.remote_addr) {
            Ok(_) => true,
            Err(e) => {
                warn!(destination = %self.remote_addr, error = %e, "UDP send failed");
                false
            }
        }
    }

    fn with_remote(&self, remote: SocketAddr) -> Arc<dyn Transport> {
        Arc::new(UdpTransport {
            socket: self.socket.clone(),
            local_addr: self.local_addr,
            remote_addr: remote,
        })
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UdpTransport({} -> {})", self.local_addr, self.remote_addr)
    }
}
