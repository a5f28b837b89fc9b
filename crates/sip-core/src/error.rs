use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the message codec.
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed start line: {0}")]
    MalformedStartLine(String),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("malformed {name} header: {value}")]
    InvalidHeaderValue { name: &'static str, value: String },

    #[error("message body shorter than Content-Length {expected} (got {actual})")]
    TruncatedBody { expected: usize, actual: usize },

    #[error("unknown SIP version: {0}")]
    UnsupportedVersion(String),
}
