use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::info;

use palette_shared::config::InstrumentConfig;
use palette_shared::error::{ConfigError, HostError};

use crate::clock::Clock;
use crate::host::MidiHost;
use crate::instrument::{Instrument, InstrumentHandle};

/// Owns every configured instrument and fans the process callback out to
/// them in config order. The returned handles are the control-plane view of
/// the same instruments.
#[derive(Debug)]
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
}

impl InstrumentRegistry {
    /// Load the instrument table from the JSON config file.
    pub fn load(path: &Path) -> Result<(Self, Vec<InstrumentHandle>), ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let configs: Vec<InstrumentConfig> = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        Self::from_configs(&configs)
    }

    pub fn from_configs(
        configs: &[InstrumentConfig],
    ) -> Result<(Self, Vec<InstrumentHandle>), ConfigError> {
        let mut instruments = Vec::with_capacity(configs.len());
        let mut handles = Vec::with_capacity(configs.len());
        for config in configs {
            config.validate()?;
            let (instrument, handle) = Instrument::from_config(config);
            instruments.push(instrument);
            handles.push(handle);
        }
        Ok((Self { instruments }, handles))
    }

    /// Register one MIDI output port per instrument name and hand it over.
    pub fn bind_ports(&mut self, host: &mut dyn MidiHost) -> Result<(), HostError> {
        for instrument in self.instruments.iter_mut() {
            let port = host.register_midi_outport(instrument.name())?;
            instrument.set_port(port);
            info!(port = instrument.name(), "registered MIDI output");
        }
        Ok(())
    }

    /// Audio-thread fan-out, once per block.
    pub fn process(&mut self, block_size: usize, clock: &Clock) {
        for instrument in self.instruments.iter_mut() {
            instrument.process(block_size, clock);
        }
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
