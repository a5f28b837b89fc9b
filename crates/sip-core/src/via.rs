use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::Error;
use crate::uri::{parse_params, split_host_port, write_params};

/// A single Via header value: `SIP/2.0/TRANSPORT host[:port];params`.
///
/// Only the topmost Via of a message is kept in this typed form; the rest of
/// the stack travels as raw header values (they are only ever copied or
/// promoted, never inspected).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Via {
    pub transport: String,
    pub host: String,
    pub port: Option<u16>,
    pub branch: Option<String>,
    pub params: IndexMap<String, Option<String>>,
}

impl Via {
    pub fn udp(host: impl Into<String>, port: u16, branch: impl Into<String>) -> Self {
        Via {
            transport: "UDP".to_string(),
            host: host.into(),
            port: Some(port),
            branch: Some(branch.into()),
            params: IndexMap::new(),
        }
    }

    /// The sent-by host, the third component of a server transaction key.
    pub fn sent_by_host(&self) -> &str {
        &self.host
    }
}

impl FromStr for Via {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || Error::InvalidHeaderValue {
            name: "Via",
            value: s.to_string(),
        };

        let (protocol, rest) = match s.split_once(char::is_whitespace) {
            Some(pair) => pair,
            None => return Err(bad()),
        };
        let mut pieces = protocol.split('/');
        match (pieces.next(), pieces.next()) {
            (Some("SIP"), Some("2.0")) => {}
            _ => return Err(Error::UnsupportedVersion(protocol.to_string())),
        }
        let transport = pieces.next().ok_or_else(bad)?.to_string();

        let rest = rest.trim();
        let (addr, param_text) = match rest.split_once(';') {
            Some((addr, params)) => (addr.trim(), params),
            None => (rest, ""),
        };
        let (host, port) = split_host_port(addr)?;

        let mut params = parse_params(param_text);
        let branch = params.shift_remove("branch").flatten();

        Ok(Via {
            transport,
            host,
            port,
            branch,
            params,
        })
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(branch) = &self.branch {
            write!(f, ";branch={}", branch)?;
        }
        write_params(f, &self.params)
    }
}
