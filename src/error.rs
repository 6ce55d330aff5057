//! Error type shared by configuration and the driver shell.
//!
//! The real-time core (decoder, oscillator, scheduler) never fails: protocol garbage is
//! dropped and underruns fall back to silence. Only setup and collaborator I/O report errors.

use thiserror::Error;

/// Errors reported while configuring or running the shell.
#[derive(Debug, Error)]
pub enum Error {
    /// MIDI channel outside 1..=16.
    #[error("invalid MIDI channel {0}, expected 1..=16")]
    InvalidChannel(u8),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Reading a configuration file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The MIDI input collaborator failed.
    #[error("MIDI input error: {0}")]
    Midi(String),

    /// The audio peripheral collaborator failed.
    #[error("audio peripheral error: {0}")]
    Audio(String),
}

/// Result alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
