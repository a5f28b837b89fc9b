use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::method::Method;

/// The CSeq header: sequence number plus the method it numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        CSeq { seq, method }
    }
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let bad = || Error::InvalidHeaderValue {
            name: "CSeq",
            value: s.to_string(),
        };
        let seq = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let method = parts.next().ok_or_else(bad)?;
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(CSeq {
            seq,
            method: method.parse().expect("method parsing is infallible"),
        })
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}
