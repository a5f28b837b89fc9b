//! SIP transaction layer (RFC 3261 section 17).
//!
//! The four transaction state machines (INVITE client and server,
//! non-INVITE client and server) each run as one cooperative task that
//! selects over a bounded inbound message channel and its own timers. The
//! rest of the stack talks to a transaction through three handles fixed at
//! construction time:
//!
//! * a transport callback (`send or fail`) for everything written to the wire,
//! * a TU callback delivering received messages up to the transaction user,
//! * a termination callback fired exactly once when the machine dies.
//!
//! [`TransactionRegistry`] is the demultiplexing table: it derives a
//! [`TransactionKey`] per message direction, spawns machines, and hands out
//! the [`TransactionHandle`]s used to feed them further messages.

pub mod builders;
mod error;
mod key;
mod registry;
pub mod timer;
pub mod transaction;
pub mod utils;

pub use error::{Error, Result};
pub use key::{TransactionKey, TransactionRole};
pub use registry::TransactionRegistry;
pub use timer::{TimerSettings, TransactionTimer};
pub use transaction::{
    TerminationReason, TransactionCallbacks, TransactionHandle, TransactionKind, TransactionState,
    TransportCallback, TuCallback, TerminationCallback,
};

pub mod prelude {
    pub use crate::builders;
    pub use crate::transaction::{
        client_invite::ClientInviteTransaction, client_non_invite::ClientNonInviteTransaction,
        server_invite::ServerInviteTransaction, server_non_invite::ServerNonInviteTransaction,
        TerminationReason, TransactionCallbacks, TransactionHandle, TransactionKind,
        TransactionState,
    };
    pub use crate::utils::generate_branch;
    pub use crate::{Error, Result, TimerSettings, TransactionKey, TransactionRegistry};
}
