//! Monophonic voice allocation: note events in, at most one oscillator out.

use std::sync::Arc;

use crate::midi::NoteEvent;
use crate::oscillator::Oscillator;
use crate::wavetable::WaveTable;

/// Frequency of MIDI note 0 in Hz.
const NOTE_ZERO_HZ: f64 = 8.175;

/// Equal-tempered frequencies for all 128 MIDI notes.
#[derive(Debug, Clone)]
pub struct FrequencyTable([f64; 128]);

impl FrequencyTable {
    /// Computes `8.175 * 2^(note / 12)` for every note.
    pub fn new() -> Self {
        let mut table = [0.0; 128];
        for (note, freq) in table.iter_mut().enumerate() {
            *freq = NOTE_ZERO_HZ * 2f64.powf(note as f64 / 12.0);
        }
        Self(table)
    }

    /// Frequency of `note` in Hz. Notes above 127 are folded into range.
    #[inline]
    pub fn frequency(&self, note: u8) -> f64 {
        self.0[(note & 0x7F) as usize]
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Digital output line that follows the note state, e.g. an envelope trigger or an LED.
pub trait GateOutput {
    /// Drives the line high (`true`) or low (`false`).
    fn set_gate(&mut self, high: bool);
}

/// Gate that drives nothing, for boards without a gate line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGate;

impl GateOutput for NoGate {
    fn set_gate(&mut self, _high: bool) {}
}

/// Binds note events to a single oscillator with last-note priority.
///
/// Note-On always replaces the current oscillator with a fresh one at phase 0. Any Note-Off
/// silences the voice, whatever note it names.
pub struct VoiceController<G: GateOutput> {
    frequencies: FrequencyTable,
    table: Arc<WaveTable>,
    sample_rate: u32,
    active: Option<Oscillator>,
    gate: G,
}

impl<G: GateOutput> VoiceController<G> {
    /// Creates a silent controller.
    pub fn new(table: Arc<WaveTable>, sample_rate: u32, gate: G) -> Self {
        Self {
            frequencies: FrequencyTable::new(),
            table,
            sample_rate,
            active: None,
            gate,
        }
    }

    /// Applies a note event to the active voice and the gate.
    pub fn on_event(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::NoteOn { note, velocity } => {
                let frequency = self.frequencies.frequency(note);
                log::info!("Note On  {note:3} vel {velocity:3} -> {frequency:.2} Hz");
                self.active = Some(Oscillator::new(
                    frequency,
                    self.sample_rate,
                    Arc::clone(&self.table),
                ));
                self.gate.set_gate(true);
            }
            NoteEvent::NoteOff { note, velocity } => {
                log::info!("Note Off {note:3} vel {velocity:3}");
                self.active = None;
                self.gate.set_gate(false);
            }
        }
    }

    /// The sounding oscillator, if any.
    pub fn active_voice(&self) -> Option<&Oscillator> {
        self.active.as_ref()
    }

    /// Mutable access to the sounding oscillator, for synthesis.
    pub fn active_voice_mut(&mut self) -> Option<&mut Oscillator> {
        self.active.as_mut()
    }

    /// The frequency lookup table.
    pub fn frequencies(&self) -> &FrequencyTable {
        &self.frequencies
    }

    /// The gate collaborator.
    pub fn gate(&self) -> &G {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BitDepth;
    use approx::assert_relative_eq;

    #[derive(Default)]
    struct RecordingGate(Vec<bool>);

    impl GateOutput for RecordingGate {
        fn set_gate(&mut self, high: bool) {
            self.0.push(high);
        }
    }

    fn controller() -> VoiceController<RecordingGate> {
        let table = Arc::new(WaveTable::build(BitDepth::Sixteen, 32, 2000));
        VoiceController::new(table, 22_050, RecordingGate::default())
    }

    #[test]
    fn frequency_table() {
        let freqs = FrequencyTable::new();
        assert_relative_eq!(freqs.frequency(0), 8.175);
        assert_relative_eq!(freqs.frequency(12), 16.35);
        assert_relative_eq!(freqs.frequency(69), 440.0, max_relative = 1e-3);
    }

    #[test]
    fn note_on_starts_voice_and_raises_gate() {
        let mut voice = controller();
        assert!(voice.active_voice().is_none());

        voice.on_event(NoteEvent::NoteOn {
            note: 69,
            velocity: 100,
        });

        let osc = voice.active_voice().unwrap();
        assert_relative_eq!(osc.frequency(), voice.frequencies().frequency(69));
        assert_eq!(voice.gate().0, vec![true]);
    }

    #[test]
    fn retrigger_replaces_voice_at_phase_zero() {
        let mut voice = controller();
        voice.on_event(NoteEvent::NoteOn {
            note: 60,
            velocity: 100,
        });
        voice.active_voice_mut().unwrap().fill(100);
        assert!(voice.active_voice().unwrap().position() > 0.0);

        voice.on_event(NoteEvent::NoteOn {
            note: 72,
            velocity: 90,
        });

        let osc = voice.active_voice().unwrap();
        assert_relative_eq!(osc.frequency(), voice.frequencies().frequency(72));
        assert_eq!(osc.position(), 0.0);
    }

    #[test]
    fn any_note_off_silences() {
        let mut voice = controller();
        voice.on_event(NoteEvent::NoteOn {
            note: 60,
            velocity: 100,
        });
        voice.on_event(NoteEvent::NoteOff {
            note: 61,
            velocity: 0,
        });

        assert!(voice.active_voice().is_none());
        assert_eq!(voice.gate().0, vec![true, false]);
    }
}
