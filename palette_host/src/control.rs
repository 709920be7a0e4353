//! Routes parsed key events to the selected instrument or to the global
//! transport actions. Everything here runs on the control thread; the only
//! paths to the audio thread are the instrument handles and the transport.

use std::sync::Arc;

use tracing::{debug, info};

use palette_engine::clock::Clock;
use palette_engine::host::Transport;
use palette_engine::instrument::{InstrumentHandle, LoopMode};
use palette_shared::KeyEvent;

// HID usage codes (keyboard page) for the control surface
pub const KEY_ESC: u8 = 41;
pub const KEY_SPACE: u8 = 44;
pub const KEY_F1: u8 = 58;
pub const KEY_F12: u8 = 69;
pub const KEY_ARROW_DOWN: u8 = 81;
pub const KEY_ARROW_UP: u8 = 82;
pub const KEY_NUM_DIV: u8 = 84;
pub const KEY_NUM_MUL: u8 = 85;
pub const KEY_NUM_SUB: u8 = 86;
pub const KEY_NUM_ADD: u8 = 87;
pub const KEY_NUM_1: u8 = 89;
pub const KEY_NUM_9: u8 = 97;

/// The main playable pad: the letter/number/punctuation block.
fn pad_contains(code: u8) -> bool {
    matches!(code, 4..=39 | 51 | 54..=56)
}

/// Numpad 1..9 select loops 0..8.
fn loop_index(code: u8) -> Option<usize> {
    (KEY_NUM_1..=KEY_NUM_9)
        .contains(&code)
        .then(|| (code - KEY_NUM_1) as usize)
}

/// F1..F12 select instruments 0..11.
fn headboard_index(code: u8) -> Option<usize> {
    (KEY_F1..=KEY_F12)
        .contains(&code)
        .then(|| (code - KEY_F1) as usize)
}

/// Numpad operators select the loop mode while held.
fn loop_op_mode(code: u8) -> Option<LoopMode> {
    match code {
        KEY_NUM_MUL => Some(LoopMode::Record),
        KEY_NUM_DIV => Some(LoopMode::Delete),
        KEY_NUM_SUB => Some(LoopMode::Half),
        KEY_NUM_ADD => Some(LoopMode::Double),
        _ => None,
    }
}

pub struct ControlPlane {
    instruments: Vec<InstrumentHandle>,
    current: usize,
    transport: Arc<dyn Transport>,
}

impl ControlPlane {
    pub fn new(instruments: Vec<InstrumentHandle>, transport: Arc<dyn Transport>) -> Self {
        Self {
            instruments,
            current: 0,
            transport,
        }
    }

    /// Dispatch one key event. Returns false once shutdown was requested.
    pub fn handle(&mut self, event: KeyEvent) -> bool {
        match event {
            KeyEvent::Press(code) => self.key_pressed(code),
            KeyEvent::Release(code) => {
                self.key_released(code);
                true
            }
        }
    }

    fn key_pressed(&mut self, code: u8) -> bool {
        match code {
            KEY_ESC => {
                info!("escape pressed, shutting down");
                return false;
            }
            KEY_SPACE => Clock::toggle(self.transport.as_ref()),
            KEY_ARROW_UP => Clock::adjust_bpm(self.transport.as_ref(), 1.0),
            KEY_ARROW_DOWN => Clock::adjust_bpm(self.transport.as_ref(), -1.0),
            _ => {
                if let Some(mode) = loop_op_mode(code) {
                    if let Some(handle) = self.current_mut() {
                        handle.set_mode(mode);
                    }
                } else if let Some(index) = loop_index(code) {
                    if let Some(handle) = self.current_mut() {
                        handle.loop_trigger(index);
                    }
                } else if let Some(index) = headboard_index(code) {
                    if index < self.instruments.len() {
                        self.current = index;
                        debug!(instrument = %self.instruments[index].name(), "selected");
                    }
                } else if pad_contains(code) {
                    if let Some(handle) = self.current_mut() {
                        handle.key_pressed(code);
                    }
                }
                // anything else is not ours; ignore it
            }
        }
        true
    }

    fn key_released(&mut self, code: u8) {
        if loop_op_mode(code).is_some() {
            if let Some(handle) = self.current_mut() {
                handle.set_mode(LoopMode::Normal);
            }
        } else if pad_contains(code) {
            if let Some(handle) = self.current_mut() {
                handle.key_released(code);
            }
        }
    }

    fn current_mut(&mut self) -> Option<&mut InstrumentHandle> {
        self.instruments.get_mut(self.current)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use super::*;
    use palette_engine::clock::Clock;
    use palette_engine::host::{MidiOutPort, SharedTransport, TransportState};
    use palette_engine::instrument::Instrument;
    use palette_shared::config::InstrumentConfig;
    use palette_shared::MidiEvent;

    type Written = Arc<Mutex<Vec<(u32, [u8; 3])>>>;

    struct TestPort {
        written: Written,
    }

    impl MidiOutPort for TestPort {
        fn clear_buffer(&mut self) {
            self.written.lock().unwrap().clear();
        }

        fn write_midi_event(&mut self, offset: u32, event: MidiEvent) {
            self.written.lock().unwrap().push((offset, event.bytes()));
        }
    }

    fn config(name: &str, key: u8, note: u8) -> InstrumentConfig {
        InstrumentConfig {
            name: name.into(),
            mapping: BTreeMap::from([(key, (0, note))]),
            snap: false,
            sticky: false,
            snap_beats_per_beat: 1,
            loop_beats_per_beat: 1,
        }
    }

    fn plane_with_two_instruments() -> (ControlPlane, Vec<Instrument>, Vec<Written>) {
        let mut instruments = Vec::new();
        let mut handles = Vec::new();
        let mut buffers = Vec::new();
        for (name, key, note) in [("first", 29u8, 36u8), ("second", 29, 48)] {
            let (mut instrument, handle) = Instrument::from_config(&config(name, key, note));
            let written: Written = Arc::new(Mutex::new(Vec::new()));
            instrument.set_port(Box::new(TestPort {
                written: written.clone(),
            }));
            instruments.push(instrument);
            handles.push(handle);
            buffers.push(written);
        }
        let transport: Arc<dyn Transport> = Arc::new(SharedTransport::new());
        (
            ControlPlane::new(handles, transport),
            instruments,
            buffers,
        )
    }

    #[test]
    fn pad_keys_reach_the_current_instrument() {
        let (mut plane, mut instruments, buffers) = plane_with_two_instruments();
        assert!(plane.handle(KeyEvent::Press(29)));
        instruments[0].process(10, &Clock::new());
        assert_eq!(*buffers[0].lock().unwrap(), vec![(0, [0x90, 36, 64])]);
        assert!(buffers[1].lock().unwrap().is_empty());
    }

    #[test]
    fn headboard_switches_the_current_instrument() {
        let (mut plane, mut instruments, buffers) = plane_with_two_instruments();
        plane.handle(KeyEvent::Press(KEY_F1 + 1));
        plane.handle(KeyEvent::Press(29));
        instruments[0].process(10, &Clock::new());
        instruments[1].process(10, &Clock::new());
        assert!(buffers[0].lock().unwrap().is_empty());
        assert_eq!(*buffers[1].lock().unwrap(), vec![(0, [0x90, 48, 64])]);
    }

    #[test]
    fn out_of_range_headboard_keys_keep_the_selection() {
        let (mut plane, mut instruments, buffers) = plane_with_two_instruments();
        plane.handle(KeyEvent::Press(KEY_F1 + 7));
        plane.handle(KeyEvent::Press(29));
        instruments[0].process(10, &Clock::new());
        assert_eq!(buffers[0].lock().unwrap().len(), 1);
    }

    #[test]
    fn space_toggles_the_transport() {
        let (mut plane, _instruments, _buffers) = plane_with_two_instruments();
        assert_eq!(plane.transport.state(), TransportState::Stopped);
        plane.handle(KeyEvent::Press(KEY_SPACE));
        assert_eq!(plane.transport.state(), TransportState::Rolling);
        plane.handle(KeyEvent::Press(KEY_SPACE));
        assert_eq!(plane.transport.state(), TransportState::Stopped);
    }

    #[test]
    fn arrows_adjust_the_tempo_by_one() {
        let (mut plane, _instruments, _buffers) = plane_with_two_instruments();
        Clock::sync_to_host(plane.transport.as_ref());
        plane.handle(KeyEvent::Press(KEY_ARROW_UP));
        assert_eq!(plane.transport.query().bpm, 121.0);
        plane.handle(KeyEvent::Press(KEY_ARROW_DOWN));
        plane.handle(KeyEvent::Press(KEY_ARROW_DOWN));
        assert_eq!(plane.transport.query().bpm, 119.0);
    }

    #[test]
    fn escape_requests_shutdown() {
        let (mut plane, _instruments, _buffers) = plane_with_two_instruments();
        assert!(!plane.handle(KeyEvent::Press(KEY_ESC)));
    }

    #[test]
    fn unknown_codes_are_ignored() {
        let (mut plane, _instruments, _buffers) = plane_with_two_instruments();
        assert!(plane.handle(KeyEvent::Press(0)));
        assert!(plane.handle(KeyEvent::Release(255)));
    }

    #[test]
    fn releasing_a_loop_op_returns_to_normal_mode() {
        // record a one-block loop: trigger while the record key is held,
        // stop after it is released (mode back to Normal keeps it playing)
        let (mut plane, mut instruments, buffers) = plane_with_two_instruments();
        let clock = Clock::new();

        plane.handle(KeyEvent::Press(KEY_NUM_MUL));
        plane.handle(KeyEvent::Press(KEY_NUM_1));
        plane.handle(KeyEvent::Press(29));
        instruments[0].process(10, &clock);

        plane.handle(KeyEvent::Press(KEY_NUM_1));
        instruments[0].process(10, &clock);
        plane.handle(KeyEvent::Release(KEY_NUM_MUL));

        // normal mode now: the loop-pad key toggles playback off
        plane.handle(KeyEvent::Press(KEY_NUM_1));
        instruments[0].process(10, &clock);
        assert!(buffers[0].lock().unwrap().is_empty());
    }
}
