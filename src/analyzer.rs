//! Post-hoc statistics over a received RTP stream: sequence-wrap-aware
//! loss/duplicate detection, RFC 3550 jitter, and signal RMS.
//!
//! None of this runs inline with the receive path — it is computed once,
//! after capture, over the full buffered packet list.

use std::time::Duration;

use crate::codec::ReceivedPacket;
use crate::error::{Result, RtpError};

const RTP_MAX_SEQ: u32 = 65535;
const LOOKAHEAD_WINDOW: usize = 10;

fn payload_type_name(pt: u8) -> String {
    match pt {
        0 => "PCMU".to_string(),
        3 => "GSM".to_string(),
        4 => "G723".to_string(),
        8 => "PCMA".to_string(),
        9 => "G722".to_string(),
        10 | 11 => "L16".to_string(),
        13 => "CN".to_string(),
        18 => "G729".to_string(),
        other => other.to_string(),
    }
}

/// Result of loss/duplicate detection: the de-duplicated packet list plus
/// the fractions (in `[0, 1]`) of the original stream lost or duplicated.
struct LossReport {
    packets: Vec<ReceivedPacket>,
    loss_fraction: f64,
    duplicate_fraction: f64,
}

/// Sequence-wrap-aware loss and duplicate detection.
///
/// Walks the stream in arrival order tracking the next expected sequence
/// number modulo 2^16. A gap ahead of `expected` is provisionally loss,
/// but each missing sequence number is first checked against the next
/// `LOOKAHEAD_WINDOW` arrivals — catching packets that merely arrived
/// out of order rather than truly being lost. A sequence number equal to
/// `expected - 1` is a duplicate; anything else at or behind `expected`
/// is interpreted as a loss-then-wraparound.
fn calc_loss_and_dedup(packets: &[ReceivedPacket]) -> LossReport {
    let stream: Vec<u32> = packets.iter().map(|p| p.header.sequence as u32).collect();
    let first = stream[0];
    let mut expected = first;
    let mut lost_packets: usize = 0;
    let mut duplicates: usize = 0;
    let mut keep_mask = vec![false; stream.len()];

    let lookahead = |gap: &[u32], position: usize| -> usize {
        let window_end = (position + LOOKAHEAD_WINDOW).min(stream.len());
        let window = &stream[position..window_end];
        gap.iter().filter(|seq| !window.contains(seq)).count()
    };

    for (position, &current_seq) in stream.iter().enumerate() {
        if current_seq == expected {
            keep_mask[position] = true;
            expected += 1;
        } else if expected > 0 && current_seq == expected - 1 {
            duplicates += 1;
        } else if current_seq > expected {
            let gap: Vec<u32> = (expected..current_seq).collect();
            lost_packets += lookahead(&gap, position);
            expected = current_seq + 1;
            keep_mask[position] = true;
        } else if current_seq <= first {
            let mut gap: Vec<u32> = (expected..=RTP_MAX_SEQ).collect();
            gap.extend(0..current_seq);
            lost_packets += lookahead(&gap, position);
            expected = current_seq + 1;
            keep_mask[position] = true;
        }

        if expected > RTP_MAX_SEQ {
            expected = 0;
        }
    }

    let kept: Vec<ReceivedPacket> = packets
        .iter()
        .zip(keep_mask.iter())
        .filter(|(_, &keep)| keep)
        .map(|(pkt, _)| pkt.clone())
        .collect();

    LossReport {
        packets: kept,
        loss_fraction: lost_packets as f64 / stream.len() as f64,
        duplicate_fraction: duplicates as f64 / stream.len() as f64,
    }
}

/// RFC 3550 Appendix A.8 incremental jitter, applied over the
/// de-duplicated packet list's inter-arrival and inter-RTP-timestamp
/// deltas (both converted to milliseconds).
fn jitter_array(arrival_deltas_ms: &[f64], rtp_deltas_ms: &[f64]) -> Vec<f64> {
    let mut jitter = Vec::with_capacity(arrival_deltas_ms.len());
    let mut last = 0.0f64;
    for (&delta, &rtp_delta) in arrival_deltas_ms.iter().zip(rtp_deltas_ms.iter()) {
        let diff = (delta - rtp_delta).abs();
        last += (diff - last) / 16.0;
        jitter.push(last);
    }
    jitter
}

/// A statistical summary of one received RTP stream.
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub loss: f64,
    pub duplicates: f64,
    pub duration: Duration,
    pub codecs: Vec<String>,
    pub sample_rate: u32,
    pub jitter: Vec<f64>,
    pub rms: f64,
}

impl StreamStats {
    /// Compute statistics over a capture of received packets, in arrival
    /// order. `packets` must be non-empty.
    pub fn from_packets(packets: &[ReceivedPacket]) -> Result<Self> {
        if packets.is_empty() {
            return Err(RtpError::MalformedPacket(
                "cannot compute statistics over an empty capture".to_string(),
            ));
        }

        let report = calc_loss_and_dedup(packets);
        let kept = &report.packets;

        if kept.len() < 2 {
            let codecs = kept
                .iter()
                .map(|p| payload_type_name(p.header.payload_type))
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            let rms = compute_rms(kept);
            return Ok(Self {
                loss: report.loss_fraction,
                duplicates: report.duplicate_fraction,
                duration: Duration::default(),
                codecs,
                sample_rate: 8000,
                jitter: Vec::new(),
                rms,
            });
        }

        let timestamps: Vec<f64> = kept.iter().map(|p| p.header.timestamp as f64).collect();
        let arrivals: Vec<f64> = kept.iter().map(|p| p.arrival).collect();

        let sample_rate: f64 = 8000.0;
        let period_ms = 1000.0 / sample_rate;

        let arrival_deltas_ms: Vec<f64> = arrivals.windows(2).map(|w| (w[1] - w[0]) * 1000.0).collect();
        let rtp_deltas_ms: Vec<f64> = timestamps.windows(2).map(|w| (w[1] - w[0]) * period_ms).collect();

        let jitter = jitter_array(&arrival_deltas_ms, &rtp_deltas_ms);

        let duration = Duration::from_secs_f64((arrivals[arrivals.len() - 1] - arrivals[0]).max(0.0));

        let codecs: Vec<String> = kept
            .iter()
            .map(|p| payload_type_name(p.header.payload_type))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let rms = compute_rms(kept);

        Ok(Self {
            loss: report.loss_fraction,
            duplicates: report.duplicate_fraction,
            duration,
            codecs,
            sample_rate: sample_rate as u32,
            jitter,
            rms,
        })
    }
}

/// 20*log10(RMS) of the concatenated payload bytes, read as signed 8-bit
/// samples (mirroring the reference implementation, which computes RMS
/// directly over the wire bytes rather than mu-law-decoded samples).
fn compute_rms(packets: &[ReceivedPacket]) -> f64 {
    let samples: Vec<f64> = packets
        .iter()
        .flat_map(|p| p.header.payload.iter())
        .map(|&b| b as i8 as f64)
        .collect();

    if samples.is_empty() {
        return f64::NEG_INFINITY;
    }

    let sum_sq: f64 = samples.iter().map(|s| s * s).sum();
    let norm = sum_sq.sqrt();
    let rms = norm / (samples.len() as f64).sqrt();
    if rms <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RtpHeader;

    fn packet(seq: u16, timestamp: u32, arrival: f64) -> ReceivedPacket {
        ReceivedPacket {
            arrival,
            header: RtpHeader {
                version: 2,
                padding: false,
                extension: false,
                csrc_items: 0,
                marker: false,
                payload_type: 0,
                sequence: seq,
                timestamp,
                ssrc: 1,
                payload: vec![0u8; 160],
            },
        }
    }

    #[test]
    fn no_loss_no_duplicates_in_a_clean_stream() {
        let packets: Vec<_> = (0..20u16)
            .map(|i| packet(i, i as u32 * 160, i as f64 * 0.02))
            .collect();
        let stats = StreamStats::from_packets(&packets).unwrap();
        assert_eq!(stats.loss, 0.0);
        assert_eq!(stats.duplicates, 0.0);
        assert_eq!(stats.jitter.len(), 19);
    }

    #[test]
    fn detects_a_duplicate_packet() {
        let mut packets: Vec<_> = (0..5u16).map(|i| packet(i, i as u32 * 160, i as f64 * 0.02)).collect();
        packets.insert(3, packet(2, 320, 0.06));
        let stats = StreamStats::from_packets(&packets).unwrap();
        assert!(stats.duplicates > 0.0);
    }

    #[test]
    fn counts_a_genuine_gap_as_loss() {
        // seq 0,1,2 then jump straight to 10: 3..10 never arrive within
        // the lookahead window, so they count as lost.
        let mut packets = vec![packet(0, 0, 0.0), packet(1, 160, 0.02), packet(2, 320, 0.04)];
        packets.push(packet(10, 1600, 0.2));
        for i in 11..15u16 {
            packets.push(packet(i, i as u32 * 160, i as f64 * 0.02));
        }
        let stats = StreamStats::from_packets(&packets).unwrap();
        assert!(stats.loss > 0.0);
    }

    #[test]
    fn reordered_packet_within_lookahead_is_not_counted_as_loss() {
        // seq 0,1,3,2,4: 2 is merely late, arriving within the window.
        let packets = vec![
            packet(0, 0, 0.0),
            packet(1, 160, 0.02),
            packet(3, 480, 0.06),
            packet(2, 320, 0.08),
            packet(4, 640, 0.10),
        ];
        let stats = StreamStats::from_packets(&packets).unwrap();
        assert_eq!(stats.loss, 0.0);
    }

    #[test]
    fn sequence_wraparound_does_not_register_as_loss() {
        let packets = vec![
            packet(65534, 0, 0.0),
            packet(65535, 160, 0.02),
            packet(0, 320, 0.04),
            packet(1, 480, 0.06),
        ];
        let stats = StreamStats::from_packets(&packets).unwrap();
        assert_eq!(stats.loss, 0.0);
    }

    #[test]
    fn jitter_is_near_zero_for_perfectly_spaced_packets() {
        let packets: Vec<_> = (0..50u16)
            .map(|i| packet(i, i as u32 * 160, i as f64 * 0.02))
            .collect();
        let stats = StreamStats::from_packets(&packets).unwrap();
        assert!(stats.jitter.iter().all(|&j| j.abs() < 1e-6));
    }

    #[test]
    fn empty_capture_is_rejected() {
        assert!(StreamStats::from_packets(&[]).is_err());
    }

    #[test]
    fn payload_type_name_known_and_unknown() {
        assert_eq!(payload_type_name(0), "PCMU");
        assert_eq!(payload_type_name(101), "101");
    }
}
