use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One entry of the instrument table (`palette.json`). `mapping` is keyed by
/// decimal HID usage code; the value is `[channel, note]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    pub mapping: BTreeMap<u8, (u8, u8)>,

    #[serde(default)]
    pub snap: bool,

    #[serde(default)]
    pub sticky: bool,

    /// Subdivisions of a beat that snapped key presses quantise to.
    #[serde(default = "default_subdivision", rename = "snapBeatsPerBeat")]
    pub snap_beats_per_beat: u32,

    /// Accepted for forward compatibility; record-transition quantisation is
    /// not performed yet.
    #[serde(default = "default_subdivision", rename = "loopBeatsPerBeat")]
    pub loop_beats_per_beat: u32,
}

fn default_subdivision() -> u32 {
    1
}

impl InstrumentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            name: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        if self.snap_beats_per_beat == 0 || self.loop_beats_per_beat == 0 {
            return Err(invalid("beat subdivisions must be at least 1".into()));
        }
        for (&code, &(channel, note)) in &self.mapping {
            if channel > 15 {
                return Err(invalid(format!("key {code}: channel {channel} > 15")));
            }
            if note > 127 {
                return Err(invalid(format!("key {code}: note {note} > 127")));
            }
        }
        Ok(())
    }
}
