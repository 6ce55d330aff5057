//! Board and audio configuration.
//!
//! Everything the hardware layer would otherwise discover (sample rate, sample width,
//! buffer length, MIDI channel) is passed in as a [`SynthConfig`] value. It can be built in
//! code or loaded from a TOML file; missing keys take the defaults below.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::midi::MidiChannel;

/// PCM sample width of the audio peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum BitDepth {
    /// Little-endian `i16` samples.
    #[default]
    #[serde(rename = "16")]
    Sixteen,
    /// Little-endian `i32` samples.
    #[serde(rename = "32")]
    ThirtyTwo,
}

impl BitDepth {
    /// Number of bits per sample.
    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Sixteen => 16,
            BitDepth::ThirtyTwo => 32,
        }
    }

    /// Number of bytes per encoded sample.
    pub fn bytes_per_sample(self) -> usize {
        self.bits() as usize / 8
    }

    /// Largest positive sample value, used to normalize PCM to `f32`.
    pub fn full_scale(self) -> f32 {
        match self {
            BitDepth::Sixteen => i16::MAX as f32,
            BitDepth::ThirtyTwo => i32::MAX as f32,
        }
    }
}

/// Static configuration of the synthesizer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// MIDI channel to listen on, 1..=16.
    pub midi_channel: u8,

    /// Output sample rate in Hz.
    pub sample_rate: u32,

    /// Output sample width.
    pub bit_depth: BitDepth,

    /// Headroom divisor applied to the half-scale amplitude of the wave table.
    pub amplitude_divisor: u32,

    /// Number of samples in one waveform period of the wave table.
    pub table_length: usize,

    /// Number of samples per audio buffer handed to the peripheral.
    pub buffer_samples: usize,

    /// Serial bit rate of the MIDI input. Only consumed by serial collaborators.
    pub midi_baud: u32,

    /// Opaque id of the gate output line, if the board has one.
    pub gate_pin: Option<u32>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            midi_channel: 1,
            sample_rate: 22_050,
            bit_depth: BitDepth::Sixteen,
            amplitude_divisor: 32,
            table_length: 2000,
            buffer_samples: 2000,
            midi_baud: 31_250,
            gate_pin: None,
        }
    }
}

impl SynthConfig {
    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SynthConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks that every value is usable by the audio pipeline.
    pub fn validate(&self) -> Result<()> {
        MidiChannel::new(self.midi_channel)?;

        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample_rate must be positive".into()));
        }
        if self.table_length == 0 {
            return Err(Error::InvalidConfig("table_length must be positive".into()));
        }
        if self.buffer_samples == 0 {
            return Err(Error::InvalidConfig("buffer_samples must be positive".into()));
        }
        // A divisor of 1 would push the positive peak past full scale.
        if self.amplitude_divisor < 2 {
            return Err(Error::InvalidConfig(
                "amplitude_divisor must be at least 2".into(),
            ));
        }
        // The bias must leave room for a non-zero swing (bias - 1 > 0).
        if self.bias() < 2 {
            return Err(Error::InvalidConfig(format!(
                "amplitude_divisor {} leaves no amplitude at {} bits",
                self.amplitude_divisor,
                self.bit_depth.bits()
            )));
        }

        Ok(())
    }

    /// The validated MIDI channel.
    pub fn channel(&self) -> Result<MidiChannel> {
        MidiChannel::new(self.midi_channel)
    }

    /// Mid-scale bias of the wave table: `2^(bits-1) / amplitude_divisor`.
    pub fn bias(&self) -> i64 {
        (1i64 << (self.bit_depth.bits() - 1)) / self.amplitude_divisor.max(1) as i64
    }

    /// Length of one audio buffer in bytes.
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_samples * self.bit_depth.bytes_per_sample()
    }

    /// Time the foreground loop has to refill the pending buffer, in seconds.
    pub fn refill_deadline_secs(&self) -> f64 {
        self.buffer_samples as f64 / self.sample_rate as f64
    }
}
