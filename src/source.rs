//! Packet sources: audio file playback, a sine-wave test tone, and RFC 2833
//! DTMF digit sequences. Each is driven one packet at a time by the
//! scheduler; none of them perform I/O or own a clock themselves.

use uuid::Uuid;

use crate::codec::{RtpEvent, RtpHeader, PT_PCMU, PT_TELEPHONE_EVENT};
use crate::dtmf::event_ids_for;
use crate::error::Result;

/// Lifecycle state of a [`Source`]. Both terminal states are absorbing:
/// once a source reports `Exhausted` or `Stopped` it never produces
/// another packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Active,
    Exhausted,
    Stopped,
}

/// A thing that produces one RTP packet per call, on demand.
///
/// Implementations hold no clock and perform no I/O; the scheduler is
/// solely responsible for deciding *when* to call `next`.
pub trait Source: Send {
    /// Produce the next packet, or `None` if the source has nothing left
    /// to send this tick (not necessarily final — callers should consult
    /// [`Source::state`] to distinguish "temporarily has nothing" from
    /// "permanently done", though none of the sources in this module ever
    /// return `None` without also transitioning out of `Active`).
    fn next(&mut self) -> Option<RtpHeader>;

    /// Request early termination. Idempotent.
    fn stop(&mut self);

    fn state(&self) -> SourceState;
}

fn random_u32() -> u32 {
    let bytes = Uuid::new_v4().into_bytes();
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn random_u16() -> u16 {
    let bytes = Uuid::new_v4().into_bytes();
    u16::from_be_bytes([bytes[4], bytes[5]])
}

/// Plays back a pre-encoded mu-law buffer, `timeframe` bytes per packet.
///
/// One mu-law byte encodes one 8kHz sample, so `timeframe` doubles as the
/// per-packet sample count and the per-packet timestamp increment.
pub struct AudioFileSource {
    media: Vec<u8>,
    offset: usize,
    timeframe: usize,
    timestamp: u32,
    seq: u16,
    ssrc: u32,
    state: SourceState,
}

impl AudioFileSource {
    /// `media` must already be mu-law encoded (see [`crate::codec::linear_to_ulaw`]).
    pub fn new(media: Vec<u8>, timeframe: usize) -> Self {
        Self {
            media,
            offset: 0,
            timeframe,
            timestamp: 0,
            seq: random_u16(),
            ssrc: random_u32(),
            state: SourceState::Active,
        }
    }
}

impl Source for AudioFileSource {
    fn next(&mut self) -> Option<RtpHeader> {
        if self.state != SourceState::Active {
            return None;
        }
        if self.offset >= self.media.len() {
            self.state = SourceState::Exhausted;
            return None;
        }

        let end = (self.offset + self.timeframe).min(self.media.len());
        let chunk = self.media[self.offset..end].to_vec();
        self.offset = end;

        let packet = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_items: 0,
            marker: false,
            payload_type: PT_PCMU,
            sequence: self.seq,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            payload: chunk,
        };

        self.timestamp = self.timestamp.wrapping_add(self.timeframe as u32);
        self.seq = self.seq.wrapping_add(1);
        packet.into()
    }

    fn stop(&mut self) {
        self.state = SourceState::Stopped;
    }

    fn state(&self) -> SourceState {
        self.state
    }
}

/// Synthesizes a sine wave at `frequency` Hz, `duration` seconds long,
/// mu-law encoded on the fly, `timeframe` samples per packet.
pub struct ToneSource {
    frequency: f64,
    sample_rate: f64,
    amplitude: f64,
    timeframe: usize,
    total_samples: u64,
    emitted_samples: u64,
    timestamp: u32,
    seq: u16,
    ssrc: u32,
    state: SourceState,
}

impl ToneSource {
    pub fn new(frequency: f64, duration_secs: f64, timeframe: usize) -> Self {
        let sample_rate = 8000.0;
        Self {
            frequency,
            sample_rate,
            amplitude: 10_000.0,
            timeframe,
            total_samples: (sample_rate * duration_secs) as u64,
            emitted_samples: 0,
            timestamp: 0,
            seq: random_u16(),
            ssrc: random_u32(),
            state: SourceState::Active,
        }
    }
}

impl Source for ToneSource {
    fn next(&mut self) -> Option<RtpHeader> {
        if self.state != SourceState::Active {
            return None;
        }
        if self.emitted_samples >= self.total_samples {
            self.state = SourceState::Exhausted;
            return None;
        }

        let remaining = (self.total_samples - self.emitted_samples) as usize;
        let count = self.timeframe.min(remaining);
        let mut payload = Vec::with_capacity(count);
        for i in 0..count {
            let t = (self.emitted_samples + i as u64) as f64 / self.sample_rate;
            let sample = (self.amplitude * (2.0 * std::f64::consts::PI * self.frequency * t).sin()) as i16;
            payload.push(crate::codec::linear_to_ulaw(sample));
        }
        self.emitted_samples += count as u64;

        let packet = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_items: 0,
            marker: false,
            payload_type: PT_PCMU,
            sequence: self.seq,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            payload,
        };

        self.timestamp = self.timestamp.wrapping_add(count as u32);
        self.seq = self.seq.wrapping_add(1);
        packet.into()
    }

    fn stop(&mut self) {
        self.state = SourceState::Stopped;
    }

    fn state(&self) -> SourceState {
        self.state
    }
}

/// Emits an RFC 2833 telephone-event stream for a sequence of DTMF digits.
///
/// Each digit is held for `tone_length` milliseconds, repeated every
/// `timeframe` milliseconds (one packet per timeframe), with the marker
/// bit set on the first packet of each digit and `end_of_event` set on
/// the packets that fall in the final 60ms of a digit's hold time — the
/// redundant "end" packets RFC 2833 §3.10 recommends for loss resilience.
pub struct DtmfSource {
    digits: Vec<u8>,
    next_digit_idx: usize,
    current: u8,
    tone_length: u32,
    timeframe: u32,
    sample_rate: u32,
    cur_length: u32,
    switch_pending: bool,
    marked: bool,
    timestamp: u32,
    seq: u16,
    ssrc: u32,
    state: SourceState,
}

impl DtmfSource {
    /// `tone_length` and `timeframe` are both in milliseconds; `sample_rate`
    /// is the clock the RTP `timestamp` field advances on.
    pub fn new(digits: &str, tone_length_ms: u32, timeframe_ms: u32, sample_rate: u32) -> Result<Self> {
        let mut ids = event_ids_for(digits)?.into_iter();
        let current = ids.next().expect("event_ids_for rejects empty input");
        let remaining: Vec<u8> = ids.collect();

        Ok(Self {
            digits: remaining,
            next_digit_idx: 0,
            current,
            tone_length: tone_length_ms,
            timeframe: timeframe_ms,
            sample_rate,
            cur_length: 0,
            switch_pending: false,
            marked: true,
            timestamp: 0,
            seq: random_u16(),
            ssrc: random_u32(),
            state: SourceState::Active,
        })
    }
}

impl Source for DtmfSource {
    fn next(&mut self) -> Option<RtpHeader> {
        if self.state != SourceState::Active {
            return None;
        }

        if self.switch_pending {
            self.switch_pending = false;
            self.cur_length = 0;
            if self.next_digit_idx >= self.digits.len() {
                self.state = SourceState::Exhausted;
                return None;
            }
            self.current = self.digits[self.next_digit_idx];
            self.next_digit_idx += 1;
            self.marked = true;
            // Open Question (a): advance the sample clock by the digit's
            // held duration, not by a bare millisecond constant.
            self.timestamp = self
                .timestamp
                .wrapping_add(self.tone_length * self.sample_rate / 1000);
        } else if self.marked && self.cur_length > 0 {
            self.marked = false;
        }

        let end_of_event = self.cur_length + 60 >= self.tone_length;
        let event = RtpEvent {
            event_id: self.current,
            end_of_event,
            reserved: false,
            volume: 10,
            duration: (self.cur_length * 8) as u16,
        };

        let packet = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_items: 0,
            marker: self.marked,
            payload_type: PT_TELEPHONE_EVENT,
            sequence: self.seq,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            payload: event.pack().to_vec(),
        };

        self.cur_length += self.timeframe;
        self.seq = self.seq.wrapping_add(1);
        if self.cur_length >= self.tone_length {
            self.switch_pending = true;
        }

        Some(packet)
    }

    fn stop(&mut self) {
        self.state = SourceState::Stopped;
    }

    fn state(&self) -> SourceState {
        self.state
    }
}
