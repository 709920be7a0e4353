use crate::host::{Transport, TransportPosition, TransportState};

/// Host tick resolution per beat.
pub const TICKS_PER_BEAT: u32 = 1920;

/// Mirror of the host transport, refreshed once per audio block by the
/// process callback. There is no state machine here beyond mirroring; the
/// control-plane operations go straight to the host transport.
#[derive(Debug, Clone)]
pub struct Clock {
    pub bpm: f64,
    pub beat_numerator: u32,
    pub beat_denominator: u32,
    pub ticks_per_beat: u32,
    /// Current beat within the bar, 0-indexed.
    pub beat: u32,
    /// Ticks left until the next beat boundary.
    pub ticks_until_beat: u32,
    pub rolling: bool,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            bpm: 120.0,
            beat_numerator: 4,
            beat_denominator: 4,
            ticks_per_beat: TICKS_PER_BEAT,
            beat: 0,
            ticks_until_beat: TICKS_PER_BEAT,
            rolling: false,
        }
    }

    /// Audio-thread refresh. While the transport is stopped the mirrored
    /// fields keep their last value.
    pub fn refresh(&mut self, transport: &dyn Transport) {
        if transport.state() != TransportState::Rolling {
            self.rolling = false;
            return;
        }
        let position = transport.query();
        self.bpm = position.bpm;
        self.beat_numerator = position.beats_per_bar;
        self.beat_denominator = position.beat_type;
        self.ticks_per_beat = position.ticks_per_beat;
        // the host counts beats from 1
        self.beat = position.beat.saturating_sub(1);
        self.ticks_until_beat = position.ticks_per_beat.saturating_sub(position.tick);
        self.rolling = true;
    }

    /// Push the startup defaults (120 bpm, 4/4, bar 1 beat 1) into the host.
    pub fn sync_to_host(transport: &dyn Transport) {
        transport.reposition(TransportPosition::default());
    }

    /// Start the transport if stopped, stop it if rolling.
    pub fn toggle(transport: &dyn Transport) {
        if transport.state() == TransportState::Stopped {
            transport.start();
        } else {
            transport.stop();
        }
    }

    /// Read-modify-write the tempo through the host transport.
    pub fn adjust_bpm(transport: &dyn Transport, delta: f64) {
        let mut position = transport.query();
        position.bpm = (position.bpm + delta).max(1.0);
        transport.reposition(position);
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
