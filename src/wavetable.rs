//! One-period sine table in signed PCM units.

use std::f64::consts::TAU;

use crate::config::{BitDepth, SynthConfig};

/// Immutable table holding exactly one waveform period.
///
/// Samples are biased to `bias = 2^(bits-1) / amplitude_divisor` and swing by `bias - 1`
/// around it, so the divisor controls the headroom left below full scale.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveTable {
    samples: Box<[i32]>,
    bit_depth: BitDepth,
}

impl WaveTable {
    /// Builds a sine period of `length` samples.
    pub fn build(bit_depth: BitDepth, amplitude_divisor: u32, length: usize) -> Self {
        let bias = (1i64 << (bit_depth.bits() - 1)) / amplitude_divisor.max(1) as i64;
        let swing = (bias - 1) as f64;
        let (min, max) = match bit_depth {
            BitDepth::Sixteen => (i16::MIN as i64, i16::MAX as i64),
            BitDepth::ThirtyTwo => (i32::MIN as i64, i32::MAX as i64),
        };

        let samples = (0..length)
            .map(|i| {
                let angle = TAU * i as f64 / length as f64;
                let sample = bias + (swing * angle.sin()).round() as i64;
                sample.clamp(min, max) as i32
            })
            .collect();

        Self { samples, bit_depth }
    }

    /// Builds the table described by `config`.
    pub fn from_config(config: &SynthConfig) -> Self {
        Self::build(
            config.bit_depth,
            config.amplitude_divisor,
            config.table_length,
        )
    }

    /// Number of samples in the period.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the table holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample width the table was scaled for.
    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Sample at `index` modulo the table length.
    #[inline]
    pub fn at(&self, index: usize) -> i32 {
        self.samples[index % self.samples.len()]
    }

    /// The raw samples.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }
}
