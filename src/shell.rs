//! Foreground driver loop and the collaborators it talks to.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::SynthConfig;
use crate::error::{Error, Result};
use crate::midi::MidiDecoder;
use crate::oscillator::AudioBuffer;
use crate::scheduler::{BufferScheduler, HardwareCompletion};
use crate::voice::{GateOutput, VoiceController};
use crate::wavetable::WaveTable;

/// Non-blocking source of raw MIDI bytes, e.g. a serial port at 31250 baud.
pub trait MidiByteSource {
    /// Returns the next byte if one is available, without waiting.
    fn poll_byte(&mut self) -> Result<Option<u8>>;
}

/// Audio output hardware that plays fixed-length PCM buffers and signals completion.
pub trait AudioPeripheral {
    /// Handle of the started peripheral.
    type Running: RunningPeripheral;

    /// Writes `primer` synchronously and registers `completion` as the completion callback.
    fn start(self, primer: &AudioBuffer, completion: HardwareCompletion) -> Result<Self::Running>;
}

/// A started audio peripheral.
pub trait RunningPeripheral {
    /// Stops playback and deinitializes the hardware. Called exactly once.
    fn deinit(&mut self);
}

/// Owns a started peripheral and deinitializes it when dropped.
///
/// The drop runs on every way out of the run loop: normal return, an error propagated with
/// `?`, or a panic unwinding through it.
pub struct PeripheralGuard<R: RunningPeripheral> {
    running: R,
}

impl<R: RunningPeripheral> PeripheralGuard<R> {
    /// Takes ownership of a started peripheral.
    pub fn new(running: R) -> Self {
        Self { running }
    }
}

impl<R: RunningPeripheral> Drop for PeripheralGuard<R> {
    fn drop(&mut self) {
        log::info!("Releasing audio peripheral");
        self.running.deinit();
    }
}

/// Shared run/stop flag, cleared by an operator stop request such as Ctrl-C.
#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    /// Creates a flag in the running state.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Returns `true` until [`stop`](Self::stop) is called on any clone.
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Requests the run loop to finish its current iteration and return.
    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// The synthesizer: MIDI decoding, voice control and buffer refills on the foreground loop.
pub struct ToneShell<S: MidiByteSource, G: GateOutput> {
    config: SynthConfig,
    source: S,
    decoder: MidiDecoder,
    voice: VoiceController<G>,
    scheduler: BufferScheduler,
    completion: Option<HardwareCompletion>,
}

impl<S: MidiByteSource, G: GateOutput> ToneShell<S, G> {
    /// Validates `config` and builds the wave table, decoder, voice and buffer scheduler.
    pub fn new(config: SynthConfig, source: S, gate: G) -> Result<Self> {
        config.validate()?;

        let table = Arc::new(WaveTable::from_config(&config));
        let decoder = MidiDecoder::new(config.channel()?);
        let voice = VoiceController::new(table, config.sample_rate, gate);
        let (scheduler, completion) =
            BufferScheduler::new(config.bit_depth, config.buffer_samples);

        Ok(Self {
            config,
            source,
            decoder,
            voice,
            scheduler,
            completion: Some(completion),
        })
    }

    /// The configuration the shell was built with.
    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// The voice controller.
    pub fn voice(&self) -> &VoiceController<G> {
        &self.voice
    }

    /// The foreground half of the buffer handoff.
    pub fn scheduler(&self) -> &BufferScheduler {
        &self.scheduler
    }

    /// Hands out the interrupt half of the buffer handoff, once.
    ///
    /// [`run`](Self::run) takes it for the peripheral; use this only to drive the shell
    /// with [`step`](Self::step) directly.
    pub fn take_completion(&mut self) -> Option<HardwareCompletion> {
        self.completion.take()
    }

    /// One foreground iteration: poll one MIDI byte, dispatch it, refill if needed.
    ///
    /// Returns `true` if any work was done.
    pub fn step(&mut self) -> Result<bool> {
        let mut busy = false;

        if let Some(byte) = self.source.poll_byte()? {
            log::debug!("MIDI byte {byte:#04x}");
            if let Some(event) = self.decoder.feed(byte) {
                self.voice.on_event(event);
            }
            busy = true;
        }

        let underruns = self.scheduler.take_new_underruns();
        if underruns > 0 {
            log::warn!("Audio underrun: {underruns} buffer(s) replaced with silence");
        }

        busy |= self
            .scheduler
            .refill_if_needed(self.voice.active_voice_mut());

        Ok(busy)
    }

    /// Starts `peripheral` and runs the loop while `keep_running` returns `true`.
    ///
    /// The peripheral is deinitialized before this returns, whatever the outcome.
    pub fn run<P: AudioPeripheral>(
        &mut self,
        peripheral: P,
        mut keep_running: impl FnMut() -> bool,
    ) -> Result<()> {
        let completion = self
            .completion
            .take()
            .ok_or_else(|| Error::Audio("audio peripheral already started".into()))?;

        let primer = Arc::clone(self.scheduler.silence());
        let _guard = PeripheralGuard::new(peripheral.start(&primer, completion)?);
        log::info!(
            "Playing {} Hz, {} bit, {} samples per buffer ({:.1} ms), MIDI channel {}",
            self.config.sample_rate,
            self.config.bit_depth.bits(),
            self.config.buffer_samples,
            self.config.refill_deadline_secs() * 1000.0,
            self.config.midi_channel,
        );

        while keep_running() {
            if !self.step()? {
                std::thread::yield_now();
            }
        }

        Ok(())
    }

    /// Runs until `flag` is stopped or a collaborator fails.
    pub fn run_until_stopped<P: AudioPeripheral>(
        &mut self,
        peripheral: P,
        flag: &RunFlag,
    ) -> Result<()> {
        self.run(peripheral, || flag.is_running())
    }

    /// Runs until a collaborator fails.
    pub fn run_forever<P: AudioPeripheral>(&mut self, peripheral: P) -> Result<()> {
        self.run(peripheral, || true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::NoGate;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct ScriptedSource(VecDeque<Result<Option<u8>>>);

    impl ScriptedSource {
        fn bytes(bytes: &[u8]) -> Self {
            Self(bytes.iter().map(|&b| Ok(Some(b))).collect())
        }
    }

    impl MidiByteSource for ScriptedSource {
        fn poll_byte(&mut self) -> Result<Option<u8>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    #[derive(Clone, Default)]
    struct FakePeripheral {
        completion: Arc<Mutex<Option<HardwareCompletion>>>,
        deinits: Arc<AtomicUsize>,
    }

    impl AudioPeripheral for FakePeripheral {
        type Running = FakePeripheral;

        fn start(
            self,
            primer: &AudioBuffer,
            completion: HardwareCompletion,
        ) -> Result<Self::Running> {
            assert!(primer.is_silent());
            *self.completion.lock().unwrap() = Some(completion);
            Ok(self)
        }
    }

    impl RunningPeripheral for FakePeripheral {
        fn deinit(&mut self) {
            self.deinits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> SynthConfig {
        SynthConfig {
            buffer_samples: 32,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = SynthConfig {
            midi_channel: 0,
            ..Default::default()
        };
        assert!(ToneShell::new(config, ScriptedSource::bytes(&[]), NoGate).is_err());
    }

    #[test]
    fn note_on_reaches_the_armed_buffer() {
        let mut shell =
            ToneShell::new(config(), ScriptedSource::bytes(&[0x90, 0x45, 0x64]), NoGate)
                .unwrap();
        let mut completion = shell.take_completion().unwrap();

        // Silence is queued while the note bytes are still arriving.
        shell.step().unwrap();
        assert!(completion.on_hardware_complete().is_silent());
        shell.step().unwrap();
        shell.step().unwrap();
        assert!(shell.voice().active_voice().is_some());
        assert!(completion.on_hardware_complete().is_silent());

        shell.step().unwrap();
        assert!(!completion.on_hardware_complete().is_silent());
    }

    #[test]
    fn note_off_lets_armed_buffer_finish() {
        let mut shell = ToneShell::new(
            config(),
            ScriptedSource::bytes(&[0x90, 0x45, 0x64, 0x45, 0x00]),
            NoGate,
        )
        .unwrap();
        let mut completion = shell.take_completion().unwrap();

        for _ in 0..3 {
            shell.step().unwrap();
            completion.on_hardware_complete();
        }
        let playing = completion.armed().clone();
        assert!(!playing.is_silent());

        shell.step().unwrap();
        shell.step().unwrap();
        assert!(shell.voice().active_voice().is_none());
        assert_eq!(completion.armed(), &playing);

        // The buffer queued before the Note-Off still plays out.
        assert!(!completion.on_hardware_complete().is_silent());
        shell.step().unwrap();
        assert!(completion.on_hardware_complete().is_silent());
    }

    #[test]
    fn run_releases_peripheral_on_normal_exit() {
        let peripheral = FakePeripheral::default();
        let mut shell = ToneShell::new(config(), ScriptedSource::bytes(&[]), NoGate).unwrap();

        let mut iterations = 0;
        shell
            .run(peripheral.clone(), || {
                iterations += 1;
                iterations <= 5
            })
            .unwrap();

        assert_eq!(peripheral.deinits.load(Ordering::SeqCst), 1);
        assert!(peripheral.completion.lock().unwrap().is_some());
    }

    #[test]
    fn stop_request_ends_run_and_releases_peripheral() {
        let peripheral = FakePeripheral::default();
        let mut shell = ToneShell::new(
            config(),
            ScriptedSource::bytes(&[0x90, 0x45, 0x64]),
            NoGate,
        )
        .unwrap();
        let flag = RunFlag::new();

        std::thread::scope(|scope| {
            let stopper = flag.clone();
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                stopper.stop();
            });

            shell.run_until_stopped(peripheral.clone(), &flag).unwrap();
        });

        assert!(!flag.is_running());
        assert!(shell.voice().active_voice().is_some());
        assert_eq!(peripheral.deinits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_releases_peripheral_on_error() {
        let peripheral = FakePeripheral::default();
        let mut source = ScriptedSource::bytes(&[0x90, 0x40]);
        source.0.push_back(Err(Error::Midi("port vanished".into())));
        let mut shell = ToneShell::new(config(), source, NoGate).unwrap();

        let result = shell.run_forever(peripheral.clone());

        assert!(matches!(result, Err(Error::Midi(_))));
        assert_eq!(peripheral.deinits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn peripheral_starts_only_once() {
        let mut shell = ToneShell::new(config(), ScriptedSource::bytes(&[]), NoGate).unwrap();
        shell.run(FakePeripheral::default(), || false).unwrap();
        let again = shell.run(FakePeripheral::default(), || false);
        assert!(matches!(again, Err(Error::Audio(_))));
    }
}
