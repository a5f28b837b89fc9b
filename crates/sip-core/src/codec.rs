//! Wire codec: bytes in, `SipMessage` out, and back again.
//!
//! Serialization lives on `SipMessage`'s `Display` impl; this module owns
//! parsing. One datagram carries exactly one message, so the parser works on
//! a complete buffer and never streams.

use std::str::FromStr;

use bytes::Bytes;

use crate::address::Address;
use crate::cseq::CSeq;
use crate::error::{Error, Result};
use crate::header::{HeaderName, Headers};
use crate::message::{SipMessage, StartLine};
use crate::uri::Uri;
use crate::via::Via;

impl SipMessage {
    /// Serializes for the wire. `Content-Length` is derived from the body.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

/// Parses one SIP message from a datagram.
pub fn parse_message(data: &[u8]) -> Result<SipMessage> {
    let (head, body_bytes) = split_head(data)?;
    let mut lines = head.split("\r\n");

    let start_line = parse_start_line(lines.next().unwrap_or_default())?;

    let mut from = None;
    let mut to = None;
    let mut call_id = None;
    let mut cseq = None;
    let mut top_via: Option<Via> = None;
    let mut vias = Vec::new();
    let mut contacts = Vec::new();
    let mut headers = Headers::new();
    let mut content_length = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedHeader(line.to_string()))?;
        let value = value.trim();
        match HeaderName::from_wire(name.trim()) {
            HeaderName::Via => {
                if top_via.is_none() {
                    top_via = Some(Via::from_str(value)?);
                } else {
                    vias.push(value.to_string());
                }
            }
            HeaderName::From => from = Some(Address::from_str(value)?),
            HeaderName::To => to = Some(Address::from_str(value)?),
            HeaderName::CallId => call_id = Some(value.to_string()),
            HeaderName::CSeq => cseq = Some(CSeq::from_str(value)?),
            HeaderName::Contact => contacts.push(value.to_string()),
            HeaderName::ContentLength => {
                let len = value.parse().map_err(|_| Error::InvalidHeaderValue {
                    name: "Content-Length",
                    value: value.to_string(),
                })?;
                content_length = Some(len);
            }
            name => headers.entry(name).or_default().push(value.to_string()),
        }
    }

    let body = match content_length {
        Some(0) => None,
        Some(expected) => {
            if body_bytes.len() < expected {
                return Err(Error::TruncatedBody {
                    expected,
                    actual: body_bytes.len(),
                });
            }
            Some(Bytes::copy_from_slice(&body_bytes[..expected]))
        }
        None if body_bytes.is_empty() => None,
        None => Some(Bytes::copy_from_slice(body_bytes)),
    };

    Ok(SipMessage {
        start_line,
        from: from.ok_or(Error::MissingHeader("From"))?,
        to: to.ok_or(Error::MissingHeader("To"))?,
        call_id: call_id.ok_or(Error::MissingHeader("Call-ID"))?,
        cseq: cseq.ok_or(Error::MissingHeader("CSeq"))?,
        top_via: top_via.ok_or(Error::MissingHeader("Via"))?,
        vias,
        contacts,
        headers,
        body,
    })
}

fn split_head(data: &[u8]) -> Result<(&str, &[u8])> {
    let boundary = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| Error::MalformedStartLine("no header terminator".to_string()))?;
    let head = std::str::from_utf8(&data[..boundary])
        .map_err(|_| Error::MalformedStartLine("headers are not valid UTF-8".to_string()))?;
    Ok((head, &data[boundary + 4..]))
}

fn parse_start_line(line: &str) -> Result<StartLine> {
    if let Some(rest) = line.strip_prefix("SIP/2.0 ") {
        let (status, reason) = rest
            .split_once(' ')
            .map(|(s, r)| (s, r.to_string()))
            .unwrap_or((rest, String::new()));
        let status: u16 = status
            .parse()
            .map_err(|_| Error::MalformedStartLine(line.to_string()))?;
        // 700 and up is a protocol error; such responses are dropped here
        // rather than handed to a transaction.
        if !(100..=699).contains(&status) {
            return Err(Error::InvalidStatusCode(status));
        }
        return Ok(StartLine::Response { status, reason });
    }

    let mut parts = line.split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(uri), Some("SIP/2.0"), None) => Ok(StartLine::Request {
            method: method.parse().expect("method parsing is infallible"),
            uri: Uri::from_str(uri)?,
        }),
        _ => Err(Error::MalformedStartLine(line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    const INVITE: &[u8] = b"INVITE sip:bob@biloxi.com SIP/2.0\r\n\
        Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n\
        Max-Forwards: 70\r\n\
        To: Bob <sip:bob@biloxi.com>\r\n\
        From: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n\
        Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n\
        CSeq: 314159 INVITE\r\n\
        Contact: <sip:alice@pc33.atlanta.com>\r\n\
        Content-Type: application/sdp\r\n\
        Content-Length: 4\r\n\
        \r\n\
        v=0\n";

    #[test]
    fn parses_the_rfc_example_invite() {
        let msg = parse_message(INVITE).unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.method(), Some(&Method::Invite));
        assert_eq!(msg.request_uri().unwrap().host, "biloxi.com");
        assert_eq!(msg.top_via_branch(), Some("z9hG4bK776asdhds"));
        assert_eq!(msg.top_via_sent_by_host(), "pc33.atlanta.com");
        assert_eq!(msg.from.tag.as_deref(), Some("1928301774"));
        assert_eq!(msg.call_id, "a84b4c76e66710@pc33.atlanta.com");
        assert_eq!(msg.cseq_sequence(), 314159);
        assert_eq!(msg.cseq_method(), &Method::Invite);
        assert_eq!(msg.contacts.len(), 1);
        assert_eq!(msg.body.as_deref(), Some(&b"v=0\n"[..]));
        assert_eq!(
            msg.headers.get(&HeaderName::MaxForwards),
            Some(&vec!["70".to_string()])
        );
    }

    #[test]
    fn parses_a_response() {
        let msg = parse_message(
            b"SIP/2.0 180 Ringing\r\n\
              Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n\
              From: <sip:alice@atlanta.com>;tag=1928301774\r\n\
              To: <sip:bob@biloxi.com>;tag=8321234356\r\n\
              Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n\
              CSeq: 314159 INVITE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        assert!(msg.is_response());
        assert_eq!(msg.status_code(), Some(180));
        assert_eq!(msg.reason_phrase(), Some("Ringing"));
        assert_eq!(msg.to.tag.as_deref(), Some("8321234356"));
        assert_eq!(msg.body, None);
    }

    #[test]
    fn serialization_round_trips() {
        let msg = parse_message(INVITE).unwrap();
        let reparsed = parse_message(&msg.to_bytes()).unwrap();
        assert_eq!(msg, reparsed);
    }

    #[test]
    fn keeps_extra_vias_in_order() {
        let msg = parse_message(
            b"SIP/2.0 200 OK\r\n\
              Via: SIP/2.0/UDP first:5060;branch=z9hG4bKaaa\r\n\
              Via: SIP/2.0/UDP second:5060;branch=z9hG4bKbbb\r\n\
              Via: SIP/2.0/UDP third:5060;branch=z9hG4bKccc\r\n\
              From: <sip:a@a>;tag=1\r\n\
              To: <sip:b@b>;tag=2\r\n\
              Call-ID: x\r\n\
              CSeq: 1 BYE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        assert_eq!(msg.top_via.host, "first");
        assert_eq!(msg.vias.len(), 2);
        assert!(msg.vias[0].contains("second"));
        assert!(msg.vias[1].contains("third"));
    }

    #[test]
    fn rejects_status_out_of_range() {
        let err = parse_message(
            b"SIP/2.0 700 Nonsense\r\n\
              Via: SIP/2.0/UDP a;branch=z9hG4bKx\r\n\
              From: <sip:a@a>\r\n\
              To: <sip:b@b>\r\n\
              Call-ID: x\r\n\
              CSeq: 1 BYE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidStatusCode(700)));
    }

    #[test]
    fn rejects_missing_cseq() {
        let err = parse_message(
            b"OPTIONS sip:b@b SIP/2.0\r\n\
              Via: SIP/2.0/UDP a;branch=z9hG4bKx\r\n\
              From: <sip:a@a>\r\n\
              To: <sip:b@b>\r\n\
              Call-ID: x\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::MissingHeader("CSeq")));
    }

    #[test]
    fn rejects_truncated_body() {
        let err = parse_message(
            b"MESSAGE sip:b@b SIP/2.0\r\n\
              Via: SIP/2.0/UDP a;branch=z9hG4bKx\r\n\
              From: <sip:a@a>\r\n\
              To: <sip:b@b>\r\n\
              Call-ID: x\r\n\
              CSeq: 1 MESSAGE\r\n\
              Content-Length: 100\r\n\
              \r\n\
              hi",
        )
        .unwrap_err();
        assert!(matches!(err, Error::TruncatedBody { expected: 100, .. }));
    }

    #[test]
    fn accepts_compact_header_names() {
        let msg = parse_message(
            b"OPTIONS sip:b@b SIP/2.0\r\n\
              v: SIP/2.0/UDP a;branch=z9hG4bKx\r\n\
              f: <sip:a@a>;tag=9\r\n\
              t: <sip:b@b>\r\n\
              i: compact@test\r\n\
              CSeq: 1 OPTIONS\r\n\
              l: 0\r\n\r\n",
        )
        .unwrap();
        assert_eq!(msg.call_id, "compact@test");
        assert_eq!(msg.from.tag.as_deref(), Some("9"));
    }
}
