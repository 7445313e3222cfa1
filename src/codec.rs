//! RTP header and RFC 2833 telephone-event payload codec (RFC 3550 / RFC 2833).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `pack` and `unpack` are total, pure functions: `unpack` only rejects
//! input shorter than the fixed 12-byte header, and does not validate
//! `version` — `pack(unpack(b)) == b` must hold for any `b` of at least
//! that length, including datagrams carrying a version other than 2.
//! CSRC words, if `csrc_items > 0`, are left in `payload` rather than
//! stripped out, so the round trip is exact either way.

use crate::error::{Result, RtpError};

/// RTP fixed header size in bytes (no CSRC, no extension).
pub const RTP_HEADER_LEN: usize = 12;

/// RFC 2833 telephone-event payload size in bytes.
pub const RTP_EVENT_LEN: usize = 4;

/// PCMU payload type (RFC 3551).
pub const PT_PCMU: u8 = 0;

/// RFC 2833 telephone-event payload type, by local convention (not IANA-assigned).
pub const PT_TELEPHONE_EVENT: u8 = 101;

/// Samples per 20ms packet at 8000 Hz.
pub const SAMPLES_PER_PACKET: usize = 160;

/// Packet interval in milliseconds.
pub const PACKET_INTERVAL_MS: u64 = 20;

/// A parsed RTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_items: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Vec<u8>,
}

impl RtpHeader {
    /// Decode an RTP packet from wire bytes.
    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() < RTP_HEADER_LEN {
            return Err(RtpError::MalformedPacket(format!(
                "RTP packet too short: {} byte(s), need at least {}",
                data.len(),
                RTP_HEADER_LEN
            )));
        }

        let version = (data[0] >> 6) & 0x03;
        let padding = (data[0] >> 5) & 0x01 != 0;
        let extension = (data[0] >> 4) & 0x01 != 0;
        let csrc_items = data[0] & 0x0F;
        let marker = (data[1] >> 7) & 0x01 != 0;
        let payload_type = data[1] & 0x7F;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let payload = data[RTP_HEADER_LEN..].to_vec();

        Ok(Self {
            version,
            padding,
            extension,
            csrc_items,
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            payload,
        })
    }

    /// Encode an RTP packet to wire bytes.
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RTP_HEADER_LEN + self.payload.len());
        buf.push(
            ((self.version & 0x03) << 6)
                | ((self.padding as u8) << 5)
                | ((self.extension as u8) << 4)
                | (self.csrc_items & 0x0F),
        );
        buf.push(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Parsed RFC 2833 telephone-event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpEvent {
    pub event_id: u8,
    pub end_of_event: bool,
    pub reserved: bool,
    pub volume: u8,
    pub duration: u16,
}

impl RtpEvent {
    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() < RTP_EVENT_LEN {
            return Err(RtpError::MalformedPacket(format!(
                "RFC 2833 event payload too short: {} byte(s), need {}",
                data.len(),
                RTP_EVENT_LEN
            )));
        }

        let event_id = data[0];
        let end_of_event = (data[1] >> 7) & 0x01 != 0;
        let reserved = (data[1] >> 6) & 0x01 != 0;
        let volume = data[1] & 0x3F;
        let duration = u16::from_be_bytes([data[2], data[3]]);

        Ok(Self {
            event_id,
            end_of_event,
            reserved,
            volume,
            duration,
        })
    }

    pub fn pack(&self) -> [u8; RTP_EVENT_LEN] {
        let mut buf = [0u8; RTP_EVENT_LEN];
        buf[0] = self.event_id;
        buf[1] = ((self.end_of_event as u8) << 7) | ((self.reserved as u8) << 6) | (self.volume & 0x3F);
        buf[2..4].copy_from_slice(&self.duration.to_be_bytes());
        buf
    }
}

/// A received datagram paired with its wall-clock arrival time.
///
/// The receive path (`transport`) allocates these; the analyzer consumes them.
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    /// Wall-clock arrival time, seconds since `UNIX_EPOCH`.
    pub arrival: f64,
    pub header: RtpHeader,
}

// --- G.711 mu-law codec (PCMU) ---
//
// ITU-T G.711. F(x) = sgn(x) * ln(1 + mu*|x|) / ln(1 + mu), mu = 255,
// implemented with the standard segment/quantization lookup.

/// Encode a 16-bit linear PCM sample to 8-bit mu-law (ITU-T G.711).
pub fn linear_to_ulaw(sample: i16) -> u8 {
    const BIAS: i16 = 0x84; // 132
    const CLIP: i16 = 32635;

    let sign: i16;
    let mut mag: i16;

    if sample < 0 {
        mag = if sample == i16::MIN { CLIP } else { -sample };
        sign = 0x80;
    } else {
        mag = sample;
        sign = 0;
    }

    if mag > CLIP {
        mag = CLIP;
    }
    mag += BIAS;

    let mut exponent: u8 = 7;
    let mut exp_mask: i16 = 0x4000;
    while exponent > 0 && (mag & exp_mask) == 0 {
        exponent -= 1;
        exp_mask >>= 1;
    }

    let mantissa = ((mag >> (exponent as i16 + 3)) & 0x0F) as u8;
    let ulaw_byte = (sign as u8) | (exponent << 4) | mantissa;
    !ulaw_byte
}

/// Decode an 8-bit mu-law sample to 16-bit linear PCM (ITU-T G.711).
pub fn ulaw_to_linear(sample: u8) -> i16 {
    let ulaw = !sample;
    let sign = (ulaw & 0x80) != 0;
    let exponent = ((ulaw >> 4) & 0x07) as u32;
    let mantissa = (ulaw & 0x0F) as i32;

    let biased = ((mantissa | 0x10) << (exponent + 3)) + (1i32 << (exponent + 2));
    let mag = (biased - 132).max(0);

    if sign {
        -(mag as i16)
    } else {
        mag as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let payload = vec![0xFFu8; 160];
        let header = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_items: 0,
            marker: false,
            payload_type: PT_PCMU,
            sequence: 1,
            timestamp: 160,
            ssrc: 0x1234_5678,
            payload: payload.clone(),
        };
        let encoded = header.pack();
        assert_eq!(encoded.len(), RTP_HEADER_LEN + 160);

        let decoded = RtpHeader::unpack(&encoded).unwrap();
        assert_eq!(decoded.version, 2);
        assert_eq!(decoded.payload_type, PT_PCMU);
        assert_eq!(decoded.sequence, 1);
        assert_eq!(decoded.timestamp, 160);
        assert_eq!(decoded.ssrc, 0x1234_5678);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn unpack_too_short_is_malformed() {
        assert!(matches!(
            RtpHeader::unpack(&[0x80, 0x00]),
            Err(RtpError::MalformedPacket(_))
        ));
    }

    #[test]
    fn roundtrip_preserves_non_rfc_version() {
        // version field is 0b00, an RFC violation, but unpack/pack must still
        // round-trip it exactly rather than reject or silently correct it.
        let mut data = vec![0u8; RTP_HEADER_LEN + 4];
        data[0] = 0x0F; // version=0, padding=0, ext=0, csrc=15
        data[1] = 0x7F; // marker=0, pt=127
        data[12..].copy_from_slice(&[1, 2, 3, 4]);
        let decoded = RtpHeader::unpack(&data).unwrap();
        assert_eq!(decoded.version, 0);
        assert_eq!(decoded.csrc_items, 15);
        assert_eq!(decoded.pack(), data);
    }

    #[test]
    fn roundtrip_property_over_varied_inputs() {
        // Exhaustive round-trip is infeasible; sweep a spread of header
        // byte combinations and payload lengths instead of one fixed case.
        for version in 0u8..4 {
            for csrc in [0u8, 5, 15] {
                for marker in [false, true] {
                    for payload_len in [0usize, 1, 12, 160] {
                        let mut data = vec![0u8; RTP_HEADER_LEN + payload_len];
                        data[0] = (version << 6) | csrc;
                        data[1] = ((marker as u8) << 7) | 101;
                        for (i, b) in data[RTP_HEADER_LEN..].iter_mut().enumerate() {
                            *b = i as u8;
                        }
                        let decoded = RtpHeader::unpack(&data).unwrap();
                        assert_eq!(decoded.pack(), data);
                    }
                }
            }
        }
    }

    #[test]
    fn event_encode_decode_roundtrip() {
        let event = RtpEvent {
            event_id: 5,
            end_of_event: true,
            reserved: false,
            volume: 10,
            duration: 1600,
        };
        let packed = event.pack();
        assert_eq!(packed.len(), RTP_EVENT_LEN);
        let decoded = RtpEvent::unpack(&packed).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn event_unpack_too_short_is_malformed() {
        assert!(matches!(
            RtpEvent::unpack(&[0x01, 0x02]),
            Err(RtpError::MalformedPacket(_))
        ));
    }

    #[test]
    fn composed_roundtrip_header_and_event() {
        let event = RtpEvent {
            event_id: 1,
            end_of_event: false,
            reserved: false,
            volume: 10,
            duration: 0,
        };
        let header = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_items: 0,
            marker: true,
            payload_type: PT_TELEPHONE_EVENT,
            sequence: 49710,
            timestamp: 20,
            ssrc: 167_411_978,
            payload: event.pack().to_vec(),
        };
        let wire = header.pack();
        assert_eq!(wire.len(), RTP_HEADER_LEN + RTP_EVENT_LEN);

        let decoded = RtpHeader::unpack(&wire).unwrap();
        let decoded_event = RtpEvent::unpack(&decoded.payload).unwrap();
        let rebuilt = RtpHeader {
            payload: decoded_event.pack().to_vec(),
            ..decoded
        };
        assert_eq!(rebuilt.pack(), wire);
    }

    #[test]
    fn ulaw_roundtrip_zero() {
        let decoded = ulaw_to_linear(linear_to_ulaw(0));
        assert!(decoded.abs() < 4, "decoded zero: {decoded}");
    }

    #[test]
    fn ulaw_roundtrip_sign_and_magnitude() {
        for &sample in &[100i16, 1000, 10000, 30000, -100, -1000, -10000, -30000] {
            let decoded = ulaw_to_linear(linear_to_ulaw(sample));
            assert_eq!(decoded.signum(), sample.signum(), "sample={sample}");
            let s = sample.unsigned_abs() as i32;
            let d = decoded.unsigned_abs() as i32;
            assert!(d >= s / 8 && d <= s * 2, "sample={sample}, decoded={decoded}");
        }
    }
}
