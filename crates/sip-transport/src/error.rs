use std::net::SocketAddr;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to bind UDP socket to {0}: {1}")]
    BindFailed(SocketAddr, #[source] std::io::Error),
}
