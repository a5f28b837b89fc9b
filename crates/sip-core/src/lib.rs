//! SIP message model and wire codec.
//!
//! This crate owns the parts of RFC 3261 that deal with what a message *is*:
//! the request/response start lines, the headers the transaction layer
//! observes (Via, From, To, Call-ID, CSeq, Contact), and the UDP wire codec.
//! Everything stateful (transactions, timers, proxying) lives above it.

mod address;
mod codec;
mod cseq;
mod error;
mod header;
mod message;
mod method;
mod uri;
mod via;

pub use address::Address;
pub use codec::parse_message;
pub use cseq::CSeq;
pub use error::{Error, Result};
pub use header::{HeaderName, Headers};
pub use message::{SipMessage, StartLine};
pub use method::Method;
pub use uri::Uri;
pub use via::Via;

pub mod prelude {
    pub use crate::{
        parse_message, Address, CSeq, HeaderName, Headers, Method, SipMessage, StartLine, Uri, Via,
    };
}
