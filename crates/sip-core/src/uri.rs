use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::Error;

/// Default SIP port when the URI does not carry one.
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// A SIP URI reduced to the components this stack reads: scheme, user,
/// host, port and URI parameters. Embedded headers (`?...`) are not
/// supported.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Uri {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: IndexMap<String, Option<String>>,
}

impl Uri {
    pub fn sip(host: impl Into<String>) -> Self {
        Uri {
            scheme: "sip".to_string(),
            user: None,
            host: host.into(),
            port: None,
            params: IndexMap::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// The port to contact, falling back to the well-known SIP port.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SIP_PORT)
    }
}

/// Splits `host[:port]`, tolerating a bracketed IPv6 host.
pub(crate) fn split_host_port(input: &str) -> Result<(String, Option<u16>), Error> {
    let bad = |value: &str| Error::InvalidHeaderValue {
        name: "host",
        value: value.to_string(),
    };

    if let Some(rest) = input.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(|| bad(input))?;
        let host = format!("[{}]", &rest[..end]);
        let tail = &rest[end + 1..];
        if tail.is_empty() {
            return Ok((host, None));
        }
        let port = tail
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| bad(input))?;
        return Ok((host, Some(port)));
    }

    match input.split_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| bad(input))?;
            Ok((host.to_string(), Some(port)))
        }
        None => Ok((input.to_string(), None)),
    }
}

pub(crate) fn parse_params(input: &str) -> IndexMap<String, Option<String>> {
    let mut params = IndexMap::new();
    for piece in input.split(';') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match piece.split_once('=') {
            Some((name, value)) => params.insert(name.to_string(), Some(value.to_string())),
            None => params.insert(piece.to_string(), None),
        };
    }
    params
}

pub(crate) fn write_params(
    f: &mut fmt::Formatter<'_>,
    params: &IndexMap<String, Option<String>>,
) -> fmt::Result {
    for (name, value) in params {
        match value {
            Some(value) => write!(f, ";{}={}", name, value)?,
            None => write!(f, ";{}", name)?,
        }
    }
    Ok(())
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, rest) = s.split_once(':').ok_or_else(|| Error::InvalidHeaderValue {
            name: "uri",
            value: s.to_string(),
        })?;
        if scheme != "sip" && scheme != "sips" {
            return Err(Error::InvalidHeaderValue {
                name: "uri",
                value: s.to_string(),
            });
        }

        let (user, rest) = match rest.split_once('@') {
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, rest),
        };

        let (addr, params) = match rest.split_once(';') {
            Some((addr, params)) => (addr, parse_params(params)),
            None => (rest, IndexMap::new()),
        };
        let (host, port) = split_host_port(addr)?;
        if host.is_empty() {
            return Err(Error::InvalidHeaderValue {
                name: "uri",
                value: s.to_string(),
            });
        }

        Ok(Uri {
            scheme: scheme.to_string(),
            user,
            host,
            port,
            params,
        })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write_params(f, &self.params)
    }
}
