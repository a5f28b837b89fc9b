use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::address::Address;
use crate::cseq::CSeq;
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::method::Method;
use crate::uri::Uri;
use crate::via::Via;

/// The first line of a SIP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: Method, uri: Uri },
    Response { status: u16, reason: String },
}

/// A parsed SIP message.
///
/// The headers every transaction observes (Via, From, To, Call-ID, CSeq,
/// Contact) have typed slots; everything else rides in `headers` as ordered
/// raw values. Only the topmost Via is typed; the remainder of the Via
/// stack is kept verbatim in `vias`, topmost-first, since the proxy only
/// ever prepends to or pops from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipMessage {
    pub start_line: StartLine,
    pub from: Address,
    pub to: Address,
    pub call_id: String,
    pub cseq: CSeq,
    pub top_via: Via,
    pub vias: Vec<String>,
    pub contacts: Vec<String>,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl SipMessage {
    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn is_response(&self) -> bool {
        !self.is_request()
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn request_uri(&self) -> Option<&Uri> {
        match &self.start_line {
            StartLine::Request { uri, .. } => Some(uri),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Request { .. } => None,
            StartLine::Response { status, .. } => Some(*status),
        }
    }

    pub fn reason_phrase(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { .. } => None,
            StartLine::Response { reason, .. } => Some(reason),
        }
    }

    pub fn cseq_sequence(&self) -> u32 {
        self.cseq.seq
    }

    pub fn cseq_method(&self) -> &Method {
        &self.cseq.method
    }

    pub fn top_via_branch(&self) -> Option<&str> {
        self.top_via.branch.as_deref()
    }

    pub fn top_via_sent_by_host(&self) -> &str {
        self.top_via.sent_by_host()
    }

    /// Prepends `via` as the new topmost Via, demoting the current one into
    /// the raw stack. This is the proxy-side mutation when forwarding a
    /// request downstream.
    pub fn push_via(&mut self, via: Via) {
        let demoted = self.top_via.to_string();
        self.vias.insert(0, demoted);
        self.top_via = via;
    }

    /// Drops the topmost Via and promotes the next stack entry into the
    /// typed slot. Fails when the message would be left without any Via.
    pub fn pop_via(&mut self) -> Result<()> {
        if self.vias.is_empty() {
            return Err(Error::MissingHeader("Via"));
        }
        let next = self.vias.remove(0);
        self.top_via = Via::from_str(&next)?;
        Ok(())
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start_line {
            StartLine::Request { method, uri } => writeln!(f, "{} {} SIP/2.0\r", method, uri)?,
            StartLine::Response { status, reason } => {
                writeln!(f, "SIP/2.0 {} {}\r", status, reason)?
            }
        }
        writeln!(f, "Via: {}\r", self.top_via)?;
        for via in &self.vias {
            writeln!(f, "Via: {}\r", via)?;
        }
        writeln!(f, "From: {}\r", self.from)?;
        writeln!(f, "To: {}\r", self.to)?;
        writeln!(f, "Call-ID: {}\r", self.call_id)?;
        writeln!(f, "CSeq: {}\r", self.cseq)?;
        for contact in &self.contacts {
            writeln!(f, "Contact: {}\r", contact)?;
        }
        for (name, values) in &self.headers {
            for value in values {
                writeln!(f, "{}: {}\r", name, value)?;
            }
        }
        let body = self.body.as_deref().unwrap_or_default();
        writeln!(f, "Content-Length: {}\r", body.len())?;
        writeln!(f, "\r")?;
        f.write_str(&String::from_utf8_lossy(body))
    }
}
