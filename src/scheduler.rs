//! Double-buffer handoff between the foreground loop and the audio completion interrupt.
//!
//! The pending slot is a single-producer/single-consumer ring of capacity one. The
//! foreground side finishes writing a buffer before pushing it, and the push publishes it
//! with release ordering, so the interrupt side can only ever pop complete buffers.
//!
//! Played-out buffers travel back through a second ring so that the interrupt side neither
//! allocates nor frees memory. At most two voice buffers exist at any time (one armed, one
//! pending), which the recycle ring can always hold.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::BitDepth;
use crate::oscillator::{AudioBuffer, Oscillator};

const RECYCLE_CAPACITY: usize = 2;

/// Contents of the pending or armed slot.
#[derive(Debug)]
enum Block {
    Voice(AudioBuffer),
    Silence,
}

/// Foreground half of the handoff. Owns the producer end of the pending slot.
pub struct BufferScheduler {
    pending: Producer<Block>,
    recycled: Consumer<AudioBuffer>,
    silence: Arc<AudioBuffer>,
    buffer_samples: usize,
    underruns: Arc<AtomicUsize>,
    reported_underruns: usize,
}

/// Interrupt half of the handoff, to be driven by the peripheral's completion callback.
///
/// [`on_hardware_complete`](Self::on_hardware_complete) is O(1), never blocks and never
/// allocates.
pub struct HardwareCompletion {
    pending: Consumer<Block>,
    recycled: Producer<AudioBuffer>,
    silence: Arc<AudioBuffer>,
    armed: Block,
    underruns: Arc<AtomicUsize>,
}

impl BufferScheduler {
    /// Creates both halves for buffers of `buffer_samples` samples.
    ///
    /// The completion half starts with the silence buffer armed, matching the primer write
    /// the peripheral receives at startup.
    pub fn new(bit_depth: BitDepth, buffer_samples: usize) -> (Self, HardwareCompletion) {
        let (pending_tx, pending_rx) = RingBuffer::new(1);
        let (recycled_tx, recycled_rx) = RingBuffer::new(RECYCLE_CAPACITY);
        let silence = Arc::new(AudioBuffer::silence(bit_depth, buffer_samples));
        let underruns = Arc::new(AtomicUsize::new(0));

        let scheduler = Self {
            pending: pending_tx,
            recycled: recycled_rx,
            silence: Arc::clone(&silence),
            buffer_samples,
            underruns: Arc::clone(&underruns),
            reported_underruns: 0,
        };
        let completion = HardwareCompletion {
            pending: pending_rx,
            recycled: recycled_tx,
            silence,
            armed: Block::Silence,
            underruns,
        };

        (scheduler, completion)
    }

    /// Returns `true` while the pending slot is empty.
    pub fn needs_refill(&self) -> bool {
        self.pending.slots() > 0
    }

    /// Fills and publishes the pending slot if the interrupt has consumed it.
    ///
    /// With an active voice the next chunk of its waveform is rendered; otherwise the shared
    /// silence buffer is queued. Returns `true` if a block was published.
    pub fn refill_if_needed(&mut self, voice: Option<&mut Oscillator>) -> bool {
        if !self.needs_refill() {
            return false;
        }

        let block = match voice {
            Some(osc) => {
                // Buffers take the voice's width so samples are never narrowed.
                let mut buffer = self
                    .recycled
                    .pop()
                    .unwrap_or_else(|_| {
                        AudioBuffer::silence(osc.bit_depth(), self.buffer_samples)
                    });
                osc.fill_into(&mut buffer);
                Block::Voice(buffer)
            }
            None => Block::Silence,
        };

        // Only this side pushes, so the free slot seen above is still free.
        self.pending.push(block).is_ok()
    }

    /// The shared all-zero buffer, used to prime the peripheral.
    pub fn silence(&self) -> &Arc<AudioBuffer> {
        &self.silence
    }

    /// Total number of interrupts that found the pending slot empty.
    pub fn underruns(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Number of underruns since the previous call.
    pub fn take_new_underruns(&mut self) -> usize {
        let total = self.underruns();
        let new = total - self.reported_underruns;
        self.reported_underruns = total;
        new
    }
}

impl HardwareCompletion {
    /// Arms the next buffer after the peripheral finished playing the current one.
    ///
    /// A ready pending block becomes the armed buffer and the slot is left empty. If the
    /// slot is empty the silence buffer is armed instead.
    pub fn on_hardware_complete(&mut self) -> &AudioBuffer {
        let next = match self.pending.pop() {
            Ok(block) => block,
            Err(_) => {
                self.underruns.fetch_add(1, Ordering::Relaxed);
                Block::Silence
            }
        };

        if let Block::Voice(done) = std::mem::replace(&mut self.armed, next) {
            // Sized for every voice buffer in circulation; a failed push cannot happen.
            let _ = self.recycled.push(done);
        }

        self.armed()
    }

    /// The buffer currently owned by the peripheral.
    pub fn armed(&self) -> &AudioBuffer {
        match &self.armed {
            Block::Voice(buffer) => buffer,
            Block::Silence => &self.silence,
        }
    }

    /// Returns `true` if the armed buffer is the shared silence buffer.
    pub fn is_silence_armed(&self) -> bool {
        matches!(self.armed, Block::Silence)
    }
}
