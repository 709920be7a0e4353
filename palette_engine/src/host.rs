//! The host contract the engine runs against: a transport the audio callback
//! can query and the control thread can drive, plus MIDI output ports.
//!
//! The production transport is lock-free atomic state shared between the
//! audio callback and the control thread; MIDI delivery goes through one
//! virtual `midir` port per instrument.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use midir::MidiOutput;
use midir::os::unix::VirtualOutput;

use palette_shared::MidiEvent;
use palette_shared::error::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Starting,
    Rolling,
}

/// Snapshot of the transport position. Bars and beats are 1-indexed, the
/// host convention.
#[derive(Debug, Clone, Copy)]
pub struct TransportPosition {
    pub bar: u32,
    pub beat: u32,
    pub tick: u32,
    pub bpm: f64,
    pub beats_per_bar: u32,
    pub beat_type: u32,
    pub ticks_per_beat: u32,
}

impl Default for TransportPosition {
    fn default() -> Self {
        Self {
            bar: 1,
            beat: 1,
            tick: 0,
            bpm: 120.0,
            beats_per_bar: 4,
            beat_type: 4,
            ticks_per_beat: crate::clock::TICKS_PER_BEAT,
        }
    }
}

/// Transport side of the host. `query` is called from the audio callback
/// every block; the rest are control-thread operations.
pub trait Transport: Send + Sync {
    fn state(&self) -> TransportState;
    fn query(&self) -> TransportPosition;
    fn start(&self);
    fn stop(&self);
    fn reposition(&self, position: TransportPosition);
}

/// One MIDI output buffer. `offset` is in frames within the current block.
pub trait MidiOutPort: Send {
    fn clear_buffer(&mut self);
    fn write_midi_event(&mut self, offset: u32, event: MidiEvent);
}

/// Port registration side of the host.
pub trait MidiHost {
    fn register_midi_outport(&mut self, name: &str) -> Result<Box<dyn MidiOutPort>, HostError>;
}

/// Lock-free transport state shared between the audio callback and the
/// control thread. Atomic loads/stores only, safe on the audio thread.
pub struct SharedTransport {
    playing: AtomicBool,
    sample_rate: AtomicU32,
    bpm_bits: AtomicU64,
    beats_per_bar: AtomicU32,
    beat_type: AtomicU32,
    ticks_per_beat: AtomicU32,
    /// Musical position in ticks since transport zero, f64 bit pattern.
    tick_position_bits: AtomicU64,
}

impl SharedTransport {
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            sample_rate: AtomicU32::new(48_000),
            bpm_bits: AtomicU64::new(120.0f64.to_bits()),
            beats_per_bar: AtomicU32::new(4),
            beat_type: AtomicU32::new(4),
            ticks_per_beat: AtomicU32::new(crate::clock::TICKS_PER_BEAT),
            tick_position_bits: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate.max(1), Ordering::Relaxed);
    }

    /// Advance the musical position by one audio block. Single writer: the
    /// audio callback.
    pub fn advance(&self, frames: usize) {
        if !self.playing.load(Ordering::Relaxed) {
            return;
        }
        let rate = self.sample_rate.load(Ordering::Relaxed) as f64;
        let bpm = f64::from_bits(self.bpm_bits.load(Ordering::Relaxed));
        let ticks_per_beat = self.ticks_per_beat.load(Ordering::Relaxed) as f64;
        let ticks = f64::from_bits(self.tick_position_bits.load(Ordering::Relaxed));
        let advanced = ticks + frames as f64 / rate * (bpm / 60.0) * ticks_per_beat;
        self.tick_position_bits
            .store(advanced.to_bits(), Ordering::Relaxed);
    }
}

impl Default for SharedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SharedTransport {
    fn state(&self) -> TransportState {
        if self.playing.load(Ordering::Relaxed) {
            TransportState::Rolling
        } else {
            TransportState::Stopped
        }
    }

    fn query(&self) -> TransportPosition {
        let ticks_per_beat = self.ticks_per_beat.load(Ordering::Relaxed).max(1);
        let beats_per_bar = self.beats_per_bar.load(Ordering::Relaxed).max(1);
        let ticks = f64::from_bits(self.tick_position_bits.load(Ordering::Relaxed));
        let total_beats = (ticks / ticks_per_beat as f64) as u64;
        let tick = (ticks - total_beats as f64 * ticks_per_beat as f64) as u32;
        TransportPosition {
            bar: (total_beats / beats_per_bar as u64) as u32 + 1,
            beat: (total_beats % beats_per_bar as u64) as u32 + 1,
            tick: tick.min(ticks_per_beat - 1),
            bpm: f64::from_bits(self.bpm_bits.load(Ordering::Relaxed)),
            beats_per_bar,
            beat_type: self.beat_type.load(Ordering::Relaxed),
            ticks_per_beat,
        }
    }

    fn start(&self) {
        self.playing.store(true, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::Relaxed);
    }

    fn reposition(&self, position: TransportPosition) {
        self.bpm_bits
            .store(position.bpm.max(1.0).to_bits(), Ordering::Relaxed);
        self.beats_per_bar
            .store(position.beats_per_bar.max(1), Ordering::Relaxed);
        self.beat_type
            .store(position.beat_type.max(1), Ordering::Relaxed);
        self.ticks_per_beat
            .store(position.ticks_per_beat.max(1), Ordering::Relaxed);
        let beats = (position.bar.max(1) - 1) as u64 * position.beats_per_bar.max(1) as u64
            + (position.beat.max(1) - 1) as u64;
        let ticks = beats as f64 * position.ticks_per_beat.max(1) as f64 + position.tick as f64;
        self.tick_position_bits
            .store(ticks.to_bits(), Ordering::Relaxed);
    }
}

/// Registers one virtual MIDI output port per instrument, visible to the
/// system MIDI graph.
pub struct MidirHost {
    client_name: String,
}

impl MidirHost {
    pub fn new(client_name: &str) -> Self {
        Self {
            client_name: client_name.to_string(),
        }
    }
}

impl MidiHost for MidirHost {
    fn register_midi_outport(&mut self, name: &str) -> Result<Box<dyn MidiOutPort>, HostError> {
        let output = MidiOutput::new(&self.client_name).map_err(|err| HostError::Backend(err.to_string()))?;
        let connection = output
            .create_virtual(name)
            .map_err(|err| HostError::PortRegistration {
                name: name.to_string(),
                reason: err.to_string(),
            })?;
        Ok(Box::new(MidirPort { connection }))
    }
}

/// Write-through port: midir has no per-block event buffer, so events go out
/// in write order and the intra-block offset collapses to "now".
struct MidirPort {
    connection: midir::MidiOutputConnection,
}

impl MidiOutPort for MidirPort {
    fn clear_buffer(&mut self) {}

    fn write_midi_event(&mut self, _offset: u32, event: MidiEvent) {
        // a closed peer is not an engine error; the event is simply lost
        let _ = self.connection.send(&event.bytes());
    }
}
