use std::fmt;

use siprelay_sip_core::{Method, SipMessage};

use crate::error::{Error, Result};

/// Which side of the exchange a key identifies.
///
/// Server keys carry the top Via sent-by host as a third dimension: an
/// upstream client transaction and a downstream server transaction may
/// legally share a branch value and differ only here (RFC 3261 sections
/// 17.1.3 and 17.2.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionRole {
    Client,
    Server { sent_by: String },
}

/// Uniquely identifies a transaction inside the registry.
///
/// For servers: (branch, method with ACK collapsed to INVITE, sent-by host).
/// For clients: (branch, method), with the method taken from the CSeq when
/// the message is a response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub branch: String,
    pub method: Method,
    pub role: TransactionRole,
}

impl TransactionKey {
    /// Key under which an incoming request finds (or creates) its server
    /// transaction. An ACK keys to the INVITE transaction it acknowledges.
    pub fn for_server(message: &SipMessage) -> Result<Self> {
        let method = match message.method() {
            Some(Method::Ack) => Method::Invite,
            Some(method) => method.clone(),
            None => return Err(Error::NotRequest),
        };
        let branch = message
            .top_via_branch()
            .ok_or(Error::MissingBranch)?
            .to_string();
        Ok(TransactionKey {
            branch,
            method,
            role: TransactionRole::Server {
                sent_by: message.top_via_sent_by_host().to_string(),
            },
        })
    }

    /// Key under which an incoming response finds its client transaction,
    /// and under which an outbound request registers one.
    pub fn for_client(message: &SipMessage) -> Result<Self> {
        let method = match message.method() {
            Some(method) => method.clone(),
            None => message.cseq_method().clone(),
        };
        let branch = message
            .top_via_branch()
            .ok_or(Error::MissingBranch)?
            .to_string();
        Ok(TransactionKey {
            branch,
            method,
            role: TransactionRole::Client,
        })
    }

    pub fn is_server(&self) -> bool {
        matches!(self.role, TransactionRole::Server { .. })
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            TransactionRole::Client => write!(f, "{};{};client", self.branch, self.method),
            TransactionRole::Server { sent_by } => {
                write!(f, "{};{};{}", self.branch, self.method, sent_by)
            }
        }
    }
}
