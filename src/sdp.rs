//! Minimal SDP generation and parsing for audio-only RTP negotiation.
//!
//! Only enough of SDP to exchange an RTP endpoint: a fixed session
//! description naming the local PCMU/telephone-event media, and a
//! line-scanning parser that extracts the peer's `m=audio` port and
//! `c=IN IP4` address. No ICE, no SRTP keying, no codec negotiation.

use std::net::{IpAddr, SocketAddr};

use crate::error::{Result, RtpError};

/// A generated SDP session description for one audio stream.
#[derive(Debug, Clone)]
pub struct Sdp {
    local_ip: IpAddr,
    local_port: u16,
    ptime: u32,
}

impl Sdp {
    pub fn new(local_addr: SocketAddr, ptime: u32) -> Self {
        Self {
            local_ip: local_addr.ip(),
            local_port: local_addr.port(),
            ptime,
        }
    }

    /// Render the session description. The format is fixed: PCMU (0),
    /// telephone-event (101), and comfort noise (13), advertised in that
    /// order, one `sendrecv` audio line.
    pub fn to_string_lines(&self) -> String {
        let local_addr_desc = format!("IN IP4 {}", self.local_ip);
        [
            "v=0".to_string(),
            format!("o=user1 53655765 2353687637 {local_addr_desc}"),
            "s=-".to_string(),
            "t=0 0".to_string(),
            "i=aiortp media stream".to_string(),
            format!("m=audio {} RTP/AVP 0 101 13", self.local_port),
            format!("c={local_addr_desc}"),
            "a=rtpmap:0 PCMU/8000/1".to_string(),
            "a=rtpmap:101 telephone-event/8000".to_string(),
            "a=fmtp:101 0-15".to_string(),
            format!("a=ptime:{}", self.ptime),
            "a=sendrecv".to_string(),
            String::new(),
        ]
        .join("\r\n")
    }
}

impl std::fmt::Display for Sdp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_lines())
    }
}

/// Extract the peer's RTP endpoint from an SDP offer/answer blob.
///
/// Scans for the first `m=audio <port> RTP/AVP ...` line and the first
/// `c=IN IP4 <addr>` line; either missing is a negotiation failure.
pub fn negotiate(sdp: &str) -> Result<SocketAddr> {
    let mut port: Option<u16> = None;
    let mut ip: Option<IpAddr> = None;

    for line in sdp.lines() {
        let line = line.trim();

        if port.is_none() {
            if let Some(rest) = line.strip_prefix("m=audio ") {
                if let Some(port_str) = rest.split_whitespace().next() {
                    port = port_str.parse().ok();
                }
            }
        }

        if ip.is_none() {
            if let Some(rest) = line.strip_prefix("c=IN IP4 ") {
                ip = rest.trim().parse().ok();
            }
        }
    }

    match (ip, port) {
        (Some(ip), Some(port)) => Ok(SocketAddr::new(ip, port)),
        _ => Err(RtpError::NegotiationFailed(
            "missing m=audio or c=IN IP4 line".to_string(),
        )),
    }
}
