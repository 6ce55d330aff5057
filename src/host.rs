//! Desktop stand-ins for the board collaborators.
//!
//! MIDI arrives from every connected MIDI input through `midir`, and audio goes out through
//! `tinyaudio`. The output callback plays the armed buffer sample by sample and calls
//! [`HardwareCompletion::on_hardware_complete`] when it runs dry, the same way a DMA
//! completion interrupt would.

use std::sync::mpsc;
use std::time::Duration;

use midir::{MidiInput, MidiInputConnection};
use tinyaudio::{OutputDevice, OutputDeviceParameters, run_output_device};

use crate::config::{BitDepth, SynthConfig};
use crate::error::{Error, Result};
use crate::oscillator::AudioBuffer;
use crate::scheduler::HardwareCompletion;
use crate::shell::{AudioPeripheral, MidiByteSource, RunFlag, RunningPeripheral};
use crate::voice::GateOutput;

/// Samples per device callback.
const DEVICE_BUFFER_SAMPLES: usize = 256;

/// How long an empty poll waits for a byte before giving the loop back.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Clears `flag` when the process receives Ctrl-C.
pub fn stop_on_ctrl_c(flag: &RunFlag) -> Result<()> {
    let flag = flag.clone();
    ctrlc::set_handler(move || {
        log::info!("Stop requested");
        flag.stop();
    })
    .map_err(|err| Error::Io(std::io::Error::other(err.to_string())))
}

/// MIDI connections feeding a byte channel.
type MidiConnections = Vec<MidiInputConnection<mpsc::Sender<u8>>>;

/// Byte source fed by all available MIDI inputs.
pub struct MidirByteSource {
    receiver: mpsc::Receiver<u8>,
    _connections: MidiConnections,
}

impl MidirByteSource {
    /// Connects to every MIDI input port found on the system.
    pub fn connect_all() -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let mut connections = MidiConnections::new();

        let scan = MidiInput::new(&(env!("CARGO_PKG_NAME").to_owned() + " scan input"))
            .map_err(|err| Error::Midi(err.to_string()))?;

        for port in scan.ports().iter() {
            let input = MidiInput::new(&(env!("CARGO_PKG_NAME").to_owned() + " input"))
                .map_err(|err| Error::Midi(err.to_string()))?;
            let port_name = input
                .port_name(port)
                .map_err(|err| Error::Midi(err.to_string()))?;
            log::info!("Connecting to MIDI input {}", port_name);

            let conn = input
                .connect(
                    port,
                    port_name.as_str(),
                    |_timestamp, message, sender| {
                        for &byte in message {
                            sender.send(byte).ok();
                        }
                    },
                    sender.clone(),
                )
                .map_err(|err| Error::Midi(err.to_string()))?;
            connections.push(conn);
        }

        if connections.is_empty() {
            return Err(Error::Midi("no MIDI input ports found".into()));
        }

        Ok(Self {
            receiver,
            _connections: connections,
        })
    }

    fn from_receiver(receiver: mpsc::Receiver<u8>) -> Self {
        Self {
            receiver,
            _connections: MidiConnections::new(),
        }
    }
}

impl MidiByteSource for MidirByteSource {
    /// Returns a pending byte at once. With nothing pending, waits up to a millisecond so
    /// an idle loop does not spin a core; this stays far below the buffer refill deadline.
    fn poll_byte(&mut self) -> Result<Option<u8>> {
        match self.receiver.recv_timeout(IDLE_WAIT) {
            Ok(byte) => Ok(Some(byte)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::Midi("MIDI input disconnected".into()))
            }
        }
    }
}

/// Mono output device emulating a double-buffered PCM peripheral.
#[derive(Debug, Clone)]
pub struct TinyaudioPeripheral {
    sample_rate: u32,
    bit_depth: BitDepth,
    device_buffer: usize,
}

impl TinyaudioPeripheral {
    /// Creates a peripheral for the sample rate and width in `config`.
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            bit_depth: config.bit_depth,
            device_buffer: DEVICE_BUFFER_SAMPLES,
        }
    }

    /// Sets the number of samples per device callback, which determines the latency.
    pub fn with_device_buffer(mut self, samples: usize) -> Self {
        self.device_buffer = samples.max(1);
        self
    }
}

/// Running output device. Dropping the device stops the stream.
pub struct TinyaudioRunning {
    device: Option<OutputDevice>,
}

impl AudioPeripheral for TinyaudioPeripheral {
    type Running = TinyaudioRunning;

    fn start(
        self,
        primer: &AudioBuffer,
        mut completion: HardwareCompletion,
    ) -> Result<Self::Running> {
        let params = OutputDeviceParameters {
            channels_count: 1,
            sample_rate: self.sample_rate as usize,
            channel_sample_count: self.device_buffer,
        };
        let full_scale = self.bit_depth.full_scale();

        // The completion half starts with silence armed, which is the primer.
        log::info!(
            "Starting audio output with a {} sample primer",
            primer.len_samples()
        );
        let mut cursor = 0;

        let device = run_output_device(params, move |data| {
            for sample in data.iter_mut() {
                if cursor >= completion.armed().len_samples() {
                    completion.on_hardware_complete();
                    cursor = 0;
                }
                *sample = completion.armed().sample(cursor) as f32 / full_scale;
                cursor += 1;
            }
        })
        .map_err(|err| Error::Audio(err.to_string()))?;

        Ok(TinyaudioRunning {
            device: Some(device),
        })
    }
}

impl RunningPeripheral for TinyaudioRunning {
    fn deinit(&mut self) {
        drop(self.device.take());
    }
}

/// Gate output that only logs its level.
#[derive(Debug, Default)]
pub struct LogGate {
    high: bool,
}

impl LogGate {
    /// Current gate level.
    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl GateOutput for LogGate {
    fn set_gate(&mut self, high: bool) {
        if high != self.high {
            log::debug!("Gate {}", if high { "high" } else { "low" });
        }
        self.high = high;
    }
}
