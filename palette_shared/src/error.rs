//! Error taxonomy shared across the workspace. Fatal startup errors bubble up
//! through `anyhow` in the binary; these types carry the classification.

use thiserror::Error;

/// Fatal configuration problems, reported once at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(String),
    #[error("invalid instrument '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// The audio host could not be set up or a port could not be registered.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("audio backend unavailable: {0}")]
    Backend(String),
    #[error("cannot register MIDI port '{name}': {reason}")]
    PortRegistration { name: String, reason: String },
}

/// USB keyboard problems. Fatal at startup; read timeouts are tolerated up
/// to a consecutive limit at runtime.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("HID subsystem unavailable: {0}")]
    Init(String),
    #[error("no USB keyboard found")]
    NotFound,
    #[error("cannot open HID keyboard: {0}")]
    Open(String),
    #[error("HID read failed: {0}")]
    Read(String),
    #[error("giving up after {0} consecutive read timeouts")]
    TimedOut(u32),
}

/// A malformed record on the input channel. Recoverable: the line is logged
/// and skipped.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("empty input line")]
    Empty,
    #[error("input line must start with '+' or '-': {0:?}")]
    BadSign(String),
    #[error("bad key code in input line {0:?}")]
    BadCode(String),
}
