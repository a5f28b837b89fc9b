//! Transport facade over the listener's datagram socket.
//!
//! A `Transport` pairs the shared local socket with one remote peer; the
//! transaction layer holds one per transaction and never reads from it.
//! Sends are synchronous non-blocking datagram writes: the state machines
//! call them from their event handlers and must not suspend there.

mod error;
mod udp;

pub use error::{Error, Result};
pub use udp::UdpTransport;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use siprelay_sip_core::SipMessage;

/// One directed edge of the datagram socket: local address plus a fixed
/// remote peer. `send` reports failure with `false`; callers treat that as
/// an unrecoverable transport error for the transaction at hand.
pub trait Transport: fmt::Debug + Send + Sync {
    fn protocol(&self) -> &'static str {
        "udp"
    }

    fn local_addr(&self) -> SocketAddr;

    fn remote_addr(&self) -> SocketAddr;

    /// Serializes and writes `message` to the remote peer.
    fn send(&self, message: &SipMessage) -> bool;

    /// A transport over the same socket aimed at a different peer. The proxy
    /// uses this to reach the forwarding destination without a second bind.
    fn with_remote(&self, remote: SocketAddr) -> Arc<dyn Transport>;
}
