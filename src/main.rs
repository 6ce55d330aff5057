//! Plays a sine tone for the last note received on any connected MIDI input.
//!
//! Usage: `tone-shell [config.toml]`

use std::process::ExitCode;

use midi_tone_shell::host::{LogGate, MidirByteSource, TinyaudioPeripheral, stop_on_ctrl_c};
use midi_tone_shell::{Result, RunFlag, SynthConfig, ToneShell};

fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {path}");
            SynthConfig::load(path)?
        }
        None => SynthConfig::default(),
    };

    let source = MidirByteSource::connect_all()?;
    let peripheral = TinyaudioPeripheral::new(&config);
    let mut shell = ToneShell::new(config, source, LogGate::default())?;

    let flag = RunFlag::new();
    stop_on_ctrl_c(&flag)?;

    shell.run_until_stopped(peripheral, &flag)?;
    log::info!("Done");
    Ok(())
}
