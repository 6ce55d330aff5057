#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod config;
pub mod error;
#[cfg(feature = "host")]
pub mod host;
pub mod midi;
pub mod oscillator;
pub mod scheduler;
pub mod shell;
pub mod voice;
pub mod wavetable;

pub use config::{BitDepth, SynthConfig};
pub use error::{Error, Result};
pub use midi::{MidiChannel, MidiDecoder, NoteEvent};
pub use oscillator::{AudioBuffer, Oscillator};
pub use scheduler::{BufferScheduler, HardwareCompletion};
pub use shell::{
    AudioPeripheral, MidiByteSource, PeripheralGuard, RunFlag, RunningPeripheral, ToneShell,
};
pub use voice::{FrequencyTable, GateOutput, NoGate, VoiceController};
pub use wavetable::WaveTable;
