//! PCM buffers and the phase-accumulator oscillator that fills them.

use std::sync::Arc;

use crate::config::BitDepth;
use crate::wavetable::WaveTable;

/// Fixed-length block of little-endian signed PCM, as handed to the audio peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    bytes: Box<[u8]>,
    bit_depth: BitDepth,
}

impl AudioBuffer {
    /// Creates an all-zero buffer of `samples` samples.
    pub fn silence(bit_depth: BitDepth, samples: usize) -> Self {
        Self {
            bytes: vec![0; samples * bit_depth.bytes_per_sample()].into_boxed_slice(),
            bit_depth,
        }
    }

    /// Sample width of the encoded data.
    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Number of samples in the buffer.
    pub fn len_samples(&self) -> usize {
        self.bytes.len() / self.bit_depth.bytes_per_sample()
    }

    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decodes the sample at `index`.
    #[inline]
    pub fn sample(&self, index: usize) -> i32 {
        let width = self.bit_depth.bytes_per_sample();
        let raw = &self.bytes[index * width..(index + 1) * width];
        match self.bit_depth {
            BitDepth::Sixteen => i16::from_le_bytes([raw[0], raw[1]]) as i32,
            BitDepth::ThirtyTwo => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
        }
    }

    /// Iterates over the decoded samples.
    pub fn samples(&self) -> impl Iterator<Item = i32> + '_ {
        (0..self.len_samples()).map(move |i| self.sample(i))
    }

    /// Returns `true` if every byte is zero.
    pub fn is_silent(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    #[inline]
    fn write_sample(&mut self, index: usize, value: i32) {
        match self.bit_depth {
            BitDepth::Sixteen => {
                let at = index * 2;
                self.bytes[at..at + 2].copy_from_slice(&(value as i16).to_le_bytes());
            }
            BitDepth::ThirtyTwo => {
                let at = index * 4;
                self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
            }
        }
    }
}

/// Reads a [`WaveTable`] at an arbitrary frequency by advancing a fractional position.
///
/// A new oscillator always starts at phase 0; repeated [`fill`](Self::fill) calls continue
/// where the previous one stopped.
#[derive(Debug, Clone)]
pub struct Oscillator {
    table: Arc<WaveTable>,
    frequency: f64,
    stride: f64,
    pos: f64,
}

impl Oscillator {
    /// Creates an oscillator at `frequency` Hz for output at `sample_rate` Hz.
    pub fn new(frequency: f64, sample_rate: u32, table: Arc<WaveTable>) -> Self {
        let stride = frequency * table.len() as f64 / sample_rate as f64;
        Self {
            table,
            frequency,
            stride,
            pos: 0.0,
        }
    }

    /// Sample width of the table this oscillator reads.
    pub fn bit_depth(&self) -> BitDepth {
        self.table.bit_depth()
    }

    /// Frequency in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Table positions advanced per output sample.
    pub fn stride(&self) -> f64 {
        self.stride
    }

    /// Current fractional table position, in `[0, table.len())`.
    pub fn position(&self) -> f64 {
        self.pos
    }

    /// Produces the next `samples` samples as a new buffer.
    pub fn fill(&mut self, samples: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::silence(self.table.bit_depth(), samples);
        self.fill_into(&mut buffer);
        buffer
    }

    /// Overwrites every sample of `buffer` with the next samples of the waveform.
    ///
    /// Samples are always encoded at the table's width. A buffer of another width is
    /// replaced by one of the same length at the table's width.
    pub fn fill_into(&mut self, buffer: &mut AudioBuffer) {
        if buffer.bit_depth() != self.bit_depth() {
            *buffer = AudioBuffer::silence(self.bit_depth(), buffer.len_samples());
        }

        let len = self.table.len() as f64;
        for i in 0..buffer.len_samples() {
            buffer.write_sample(i, self.table.at(self.pos as usize));
            self.pos = (self.pos + self.stride) % len;
        }
    }
}
