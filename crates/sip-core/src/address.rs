use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::Error;
use crate::uri::{parse_params, write_params, Uri};

/// A name-addr as it appears in From, To and Contact headers: an optional
/// display name, a URI and the header parameters, with the `tag` parameter
/// broken out because the transaction and dialog layers read it constantly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub tag: Option<String>,
    pub params: IndexMap<String, Option<String>>,
}

impl Address {
    pub fn new(uri: Uri) -> Self {
        Address {
            display_name: None,
            uri,
            tag: None,
            params: IndexMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bad = || Error::InvalidHeaderValue {
            name: "address",
            value: s.to_string(),
        };

        let (display_name, uri_text, param_text) = if let Some(open) = s.find('<') {
            let close = s[open..].find('>').map(|i| open + i).ok_or_else(bad)?;
            let name = s[..open].trim();
            let name = (!name.is_empty()).then(|| name.to_string());
            (name, &s[open + 1..close], &s[close + 1..])
        } else {
            // Bare form: everything after the first semicolon is header
            // parameters, not URI parameters (RFC 3261 section 20.10).
            match s.split_once(';') {
                Some((uri, params)) => (None, uri, params),
                None => (None, s, ""),
            }
        };

        let uri = Uri::from_str(uri_text)?;
        let mut params = parse_params(param_text);
        let tag = params
            .shift_remove("tag")
            .flatten();

        Ok(Address {
            display_name,
            uri,
            tag,
            params,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "{} ", name)?;
        }
        write!(f, "<{}>", self.uri)?;
        if let Some(tag) = &self.tag {
            write!(f, ";tag={}", tag)?;
        }
        write_params(f, &self.params)
    }
}
