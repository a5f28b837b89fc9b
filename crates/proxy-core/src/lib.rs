//! Minimal stateful SIP proxy: the transaction user sitting on top of the
//! transaction layer.
//!
//! Each inbound non-ACK request gets a server transaction paired with one
//! client transaction towards the destination taken from the To URI; the
//! proxy instance bridges the two until a final response crosses, then gets
//! out of the way and lets the transactions absorb retransmissions on their
//! own. ACKs that match no transaction are forwarded statelessly.

mod dispatcher;
mod proxy;
mod stateless;

pub use dispatcher::Dispatcher;
pub use proxy::stateful_route;
pub use stateless::stateless_route;
