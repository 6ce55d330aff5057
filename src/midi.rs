//! Byte-at-a-time MIDI decoder for Note-On / Note-Off with running status.
//!
//! The running status buffer follows the usual rules:
//! - it is cleared at power up,
//! - it stores the status when a Voice Category status (0x80..=0xEF) is received,
//! - it is cleared when a System Common status (0xF0..=0xF7) is received,
//! - it is left alone by Real-Time messages (0xF8..=0xFF),
//! - data bytes are ignored while it is cleared.

use crate::error::{Error, Result};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;

/// A MIDI channel in the user-facing range 1..=16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiChannel(u8);

impl MidiChannel {
    /// Creates a channel, rejecting values outside 1..=16.
    pub fn new(channel: u8) -> Result<Self> {
        if (1..=16).contains(&channel) {
            Ok(Self(channel))
        } else {
            Err(Error::InvalidChannel(channel))
        }
    }

    /// The channel number, 1..=16.
    pub fn number(self) -> u8 {
        self.0
    }

    /// The low nibble carried by status bytes on this channel.
    pub fn nibble(self) -> u8 {
        self.0 - 1
    }
}

impl Default for MidiChannel {
    fn default() -> Self {
        Self(1)
    }
}

/// A decoded note message on the monitored channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    /// Key pressed. Velocity is always non-zero.
    NoteOn {
        /// Note number, 0..=127.
        note: u8,
        /// Velocity, 1..=127.
        velocity: u8,
    },
    /// Key released, including Note-On with velocity 0.
    NoteOff {
        /// Note number, 0..=127.
        note: u8,
        /// Release velocity, 0..=127.
        velocity: u8,
    },
}

impl NoteEvent {
    /// The note number of the event.
    pub fn note(&self) -> u8 {
        match *self {
            NoteEvent::NoteOn { note, .. } | NoteEvent::NoteOff { note, .. } => note,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Idle,
    InRunningStatus(u8),
    AwaitingVelocity { status: u8, note: u8 },
}

/// Turns a raw MIDI byte stream into [`NoteEvent`]s for a single channel.
///
/// Messages on other channels and other voice commands still drive the running status,
/// so their data bytes are consumed without being misread as notes.
#[derive(Debug, Clone)]
pub struct MidiDecoder {
    channel: MidiChannel,
    state: DecoderState,
}

impl MidiDecoder {
    /// Creates a decoder listening on `channel` with running status cleared.
    pub fn new(channel: MidiChannel) -> Self {
        Self {
            channel,
            state: DecoderState::Idle,
        }
    }

    /// The channel this decoder emits events for.
    pub fn channel(&self) -> MidiChannel {
        self.channel
    }

    /// The current running status byte, if any.
    pub fn running_status(&self) -> Option<u8> {
        match self.state {
            DecoderState::Idle => None,
            DecoderState::InRunningStatus(status)
            | DecoderState::AwaitingVelocity { status, .. } => Some(status),
        }
    }

    /// Clears running status and any half-received message.
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
    }

    /// Feeds one byte and returns the event it completes, if any.
    pub fn feed(&mut self, byte: u8) -> Option<NoteEvent> {
        match byte {
            0x80..=0xEF => {
                self.state = DecoderState::InRunningStatus(byte);
                None
            }
            0xF0..=0xF7 => {
                self.state = DecoderState::Idle;
                None
            }
            0xF8..=0xFF => None,
            data => match self.state {
                DecoderState::Idle => None,
                DecoderState::InRunningStatus(status) => {
                    self.state = DecoderState::AwaitingVelocity { status, note: data };
                    None
                }
                DecoderState::AwaitingVelocity { status, note } => {
                    self.state = DecoderState::InRunningStatus(status);
                    self.classify(status, note, data)
                }
            },
        }
    }

    /// Feeds a slice of bytes, collecting all completed events.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<NoteEvent> {
        bytes.iter().filter_map(|&byte| self.feed(byte)).collect()
    }

    fn classify(&self, status: u8, note: u8, velocity: u8) -> Option<NoteEvent> {
        if status & 0x0F != self.channel.nibble() {
            return None;
        }

        match status & 0xF0 {
            NOTE_OFF => Some(NoteEvent::NoteOff { note, velocity }),
            NOTE_ON if velocity == 0 => Some(NoteEvent::NoteOff { note, velocity: 0 }),
            NOTE_ON => Some(NoteEvent::NoteOn { note, velocity }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(channel: u8) -> MidiDecoder {
        MidiDecoder::new(MidiChannel::new(channel).unwrap())
    }

    #[test]
    fn channel_range() {
        assert!(MidiChannel::new(0).is_err());
        assert!(MidiChannel::new(17).is_err());
        assert_eq!(MidiChannel::new(16).unwrap().nibble(), 15);
    }

    #[test]
    fn note_on_then_running_status_note_off() {
        let mut midi = decoder(1);
        let events = midi.feed_all(&[0x90, 0x40, 0x7F, 0x3C, 0x00]);
        assert_eq!(
            events,
            vec![
                NoteEvent::NoteOn {
                    note: 64,
                    velocity: 127
                },
                NoteEvent::NoteOff {
                    note: 60,
                    velocity: 0
                },
            ]
        );
    }

    #[test]
    fn explicit_note_off_keeps_velocity() {
        let mut midi = decoder(1);
        let events = midi.feed_all(&[0x80, 0x40, 0x22]);
        assert_eq!(
            events,
            vec![NoteEvent::NoteOff {
                note: 64,
                velocity: 0x22
            }]
        );
    }

    #[test]
    fn note_zero_is_a_valid_note() {
        let mut midi = decoder(1);
        assert_eq!(
            midi.feed_all(&[0x90, 0x00, 0x10]),
            vec![NoteEvent::NoteOn {
                note: 0,
                velocity: 16
            }]
        );
    }

    #[test]
    fn real_time_bytes_are_transparent() {
        let mut midi = decoder(1);
        let events = midi.feed_all(&[0x90, 0xF8, 0x40, 0xFE, 0x7F]);
        assert_eq!(
            events,
            vec![NoteEvent::NoteOn {
                note: 64,
                velocity: 127
            }]
        );
    }

    #[test]
    fn system_common_clears_running_status() {
        let mut midi = decoder(1);
        let events = midi.feed_all(&[0x90, 0x40, 0x7F, 0xF0, 0x40, 0x7F]);
        assert_eq!(events.len(), 1);
        assert_eq!(midi.running_status(), None);
    }

    #[test]
    fn data_without_status_is_dropped() {
        let mut midi = decoder(1);
        assert!(midi.feed_all(&[0x40, 0x7F, 0x3C]).is_empty());
        assert_eq!(midi.running_status(), None);
    }

    #[test]
    fn new_status_discards_half_message() {
        let mut midi = decoder(1);
        assert_eq!(midi.feed(0x90), None);
        assert_eq!(midi.feed(0x40), None);
        assert_eq!(midi.feed(0x90), None);
        assert_eq!(midi.feed(0x3C), None);
        assert_eq!(
            midi.feed(0x50),
            Some(NoteEvent::NoteOn {
                note: 60,
                velocity: 0x50
            })
        );
    }

    #[test]
    fn other_channel_is_consumed_silently() {
        let mut midi = decoder(1);
        assert!(midi.feed_all(&[0x91, 0x40, 0x7F, 0x3C, 0x7F]).is_empty());
        assert_eq!(midi.running_status(), Some(0x91));
    }

    #[test]
    fn other_commands_are_ignored() {
        let mut midi = decoder(1);
        // Control change and poly aftertouch on the monitored channel.
        assert!(midi.feed_all(&[0xB0, 0x07, 0x64, 0xA0, 0x40, 0x10]).is_empty());
        assert_eq!(midi.running_status(), Some(0xA0));
    }

    #[test]
    fn higher_channel() {
        let mut midi = decoder(10);
        assert!(midi.feed_all(&[0x90, 0x40, 0x7F]).is_empty());
        assert_eq!(
            midi.feed_all(&[0x99, 0x24, 0x64]),
            vec![NoteEvent::NoteOn {
                note: 36,
                velocity: 100
            }]
        );
    }
}
