//! Crate-wide error type.
//!
//! Every failure mode named in the engine's design collapses into one of
//! these variants: a malformed wire datagram, a failed SDP negotiation, a
//! transport used before it is bound, a fatal scheduler timer overrun, an
//! externally cancelled stream, or a DTMF source built from an unsupported
//! digit.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RtpError {
    #[error("malformed RTP packet: {0}")]
    MalformedPacket(String),

    #[error("SDP negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("transport not ready")]
    NotReady,

    #[error("timer overrun: {0} tick(s) skipped, RTP spacing compromised")]
    TimerOverrun(u64),

    #[error("stream cancelled")]
    Cancelled,

    #[error("unsupported DTMF digit: {0:?}")]
    InvalidDigit(char),
}

pub type Result<T> = std::result::Result<T, RtpError>;
