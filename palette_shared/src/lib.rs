pub mod config;
pub mod error;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Status byte for note-on; the channel is OR'd into the low nibble.
pub const NOTE_ON: u8 = 0x90;
/// Status byte for note-off.
pub const NOTE_OFF: u8 = 0x80;
/// Velocity used for every note the engine emits.
pub const DEFAULT_VELOCITY: u8 = 64;

/// Raw three-byte MIDI message as written to an output port.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl MidiEvent {
    pub const fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            status: NOTE_ON | (channel & 0x0f),
            data1: note,
            data2: velocity,
        }
    }

    pub const fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            status: NOTE_OFF | (channel & 0x0f),
            data1: note,
            data2: velocity,
        }
    }

    pub const fn bytes(&self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }
}

/// One keystroke transition read from the input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press(u8),
    Release(u8),
}

impl KeyEvent {
    /// Decode one `+<code>` / `-<code>` record. The trailing newline (and any
    /// surrounding whitespace) is tolerated.
    pub fn parse_line(line: &str) -> Result<Self, WireError> {
        let record = line.trim();
        if record.is_empty() {
            return Err(WireError::Empty);
        }
        let parse_code = |digits: &str| {
            digits
                .parse::<u8>()
                .map_err(|_| WireError::BadCode(record.to_string()))
        };
        if let Some(digits) = record.strip_prefix('+') {
            Ok(KeyEvent::Press(parse_code(digits)?))
        } else if let Some(digits) = record.strip_prefix('-') {
            Ok(KeyEvent::Release(parse_code(digits)?))
        } else {
            Err(WireError::BadSign(record.to_string()))
        }
    }

    pub fn code(&self) -> u8 {
        match *self {
            KeyEvent::Press(code) | KeyEvent::Release(code) => code,
        }
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            KeyEvent::Press(code) => write!(f, "+{code}"),
            KeyEvent::Release(code) => write!(f, "-{code}"),
        }
    }
}
