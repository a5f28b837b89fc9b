use thiserror::Error;

use siprelay_sip_core::Method;

use crate::transaction::TransactionKind;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when deriving keys or constructing transactions.
#[derive(Error, Debug)]
pub enum Error {
    /// A server key was requested for a response, or a transaction was fed
    /// a message of the wrong direction.
    #[error("message is not a request")]
    NotRequest,

    /// A client key was requested for a request-only context.
    #[error("message is not a response")]
    NotResponse,

    /// The top Via carries no branch parameter, so no transaction key exists.
    #[error("missing branch parameter in top Via")]
    MissingBranch,

    /// The request method cannot start a transaction of this kind.
    #[error("{method} cannot start a {kind:?} transaction")]
    InvalidMethod {
        kind: TransactionKind,
        method: Method,
    },
}
