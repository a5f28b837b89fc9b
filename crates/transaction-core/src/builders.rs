//! Message construction the state machines need: the automatic 100 Trying
//! an INVITE server emits, and the ACK a failed INVITE client sends.

use siprelay_sip_core::{CSeq, HeaderName, Headers, Method, SipMessage, StartLine};

use crate::error::{Error, Result};

/// Builds a 100 Trying for `request`.
///
/// The full Via stack, From, To (as received; tags are the TU's business),
/// Call-ID and CSeq are copied; Session-ID is preserved when present. The
/// response has no body, so it serializes with Content-Length: 0.
pub fn make_trying(request: &SipMessage) -> Result<SipMessage> {
    if !request.is_request() {
        return Err(Error::NotRequest);
    }

    let mut headers = Headers::new();
    if let Some(session_id) = request.headers.get(&HeaderName::SessionId) {
        headers.insert(HeaderName::SessionId, session_id.clone());
    }

    Ok(SipMessage {
        start_line: StartLine::Response {
            status: 100,
            reason: "Trying".to_string(),
        },
        from: request.from.clone(),
        to: request.to.clone(),
        call_id: request.call_id.clone(),
        cseq: request.cseq.clone(),
        top_via: request.top_via.clone(),
        vias: request.vias.clone(),
        contacts: Vec::new(),
        headers,
        body: None,
    })
}

/// Builds the ACK template for a non-2xx final response to `invite`
/// (RFC 3261 section 17.1.1.3).
///
/// Request-URI, Call-ID, From and the CSeq sequence number come from the
/// INVITE; the single Via equals the INVITE's topmost Via; Route headers are
/// carried over so stateless proxies downstream still route the ACK. The To
/// field is a placeholder; the caller overwrites it from each response
/// being acknowledged.
pub fn make_ack_template(invite: &SipMessage) -> Result<SipMessage> {
    let uri = invite.request_uri().ok_or(Error::NotRequest)?.clone();

    let mut headers = Headers::new();
    for name in [HeaderName::Route, HeaderName::SessionId] {
        if let Some(values) = invite.headers.get(&name) {
            headers.insert(name, values.clone());
        }
    }

    Ok(SipMessage {
        start_line: StartLine::Request {
            method: Method::Ack,
            uri,
        },
        from: invite.from.clone(),
        to: invite.to.clone(),
        call_id: invite.call_id.clone(),
        cseq: CSeq::new(invite.cseq_sequence(), Method::Ack),
        top_via: invite.top_via.clone(),
        vias: Vec::new(),
        contacts: Vec::new(),
        headers,
        body: None,
    })
}
