//! End-to-end run of the per-block pipeline (transport advance, clock
//! refresh, registry fan-out) without an audio device, driven the same way
//! the stream callback drives it.

use std::collections::BTreeMap;

use palette_shared::config::InstrumentConfig;

use crate::clock::Clock;
use crate::host::testing::CaptureHost;
use crate::host::{SharedTransport, Transport};
use crate::instrument::LoopMode;
use crate::registry::InstrumentRegistry;

const BLOCK: usize = 256;
const SAMPLE_RATE: u32 = 48_000;

struct Pipeline {
    transport: SharedTransport,
    clock: Clock,
    registry: InstrumentRegistry,
    handles: Vec<crate::instrument::InstrumentHandle>,
    host: CaptureHost,
}

fn pipeline(configs: Vec<InstrumentConfig>) -> Pipeline {
    let (mut registry, handles) = InstrumentRegistry::from_configs(&configs).unwrap();
    let mut host = CaptureHost::default();
    registry.bind_ports(&mut host).unwrap();
    let transport = SharedTransport::new();
    transport.set_sample_rate(SAMPLE_RATE);
    Clock::sync_to_host(&transport);
    Pipeline {
        transport,
        clock: Clock::new(),
        registry,
        handles,
        host,
    }
}

impl Pipeline {
    /// One iteration of the stream callback body.
    fn run_block(&mut self) {
        self.transport.advance(BLOCK);
        self.clock.refresh(&self.transport);
        self.registry.process(BLOCK, &self.clock);
    }

    fn port(&self, name: &str) -> Vec<(u32, [u8; 3])> {
        self.host.ports[name]
            .lock()
            .unwrap()
            .iter()
            .map(|&(t, e)| (t, e.bytes()))
            .collect()
    }
}

fn keyboard() -> InstrumentConfig {
    InstrumentConfig {
        name: "keyboard".into(),
        mapping: BTreeMap::from([(29, (0, 36)), (22, (0, 37))]),
        snap: false,
        sticky: false,
        snap_beats_per_beat: 1,
        loop_beats_per_beat: 1,
    }
}

#[test]
fn keystrokes_become_midi_on_the_instrument_port() {
    let mut p = pipeline(vec![keyboard()]);
    p.transport.start();

    p.handles[0].key_pressed(29);
    p.run_block();
    assert_eq!(p.port("keyboard"), vec![(0, [0x90, 36, 64])]);

    p.handles[0].key_released(29);
    p.run_block();
    assert_eq!(p.port("keyboard"), vec![(0, [0x80, 36, 64])]);
}

#[test]
fn keys_play_even_while_the_transport_is_stopped() {
    let mut p = pipeline(vec![keyboard()]);
    p.handles[0].key_pressed(22);
    p.run_block();
    assert!(!p.clock.rolling);
    assert_eq!(p.port("keyboard"), vec![(0, [0x90, 37, 64])]);
}

#[test]
fn clock_mirror_follows_the_advancing_transport() {
    let mut p = pipeline(vec![keyboard()]);
    p.transport.start();
    // just past half a second at 120 bpm = one beat
    for _ in 0..(SAMPLE_RATE as usize / 2 / BLOCK + 1) {
        p.run_block();
    }
    assert!(p.clock.rolling);
    assert_eq!(p.clock.bpm, 120.0);
    assert_eq!(p.clock.beat, 1);
}

#[test]
fn recorded_loop_replays_with_the_original_spacing() {
    let mut p = pipeline(vec![keyboard()]);
    p.transport.start();

    p.handles[0].set_mode(LoopMode::Record);
    p.handles[0].loop_trigger(0);
    p.handles[0].key_pressed(29);
    p.run_block();
    p.handles[0].key_released(29);
    p.run_block();
    p.handles[0].loop_trigger(0);
    p.run_block();
    p.handles[0].set_mode(LoopMode::Normal);

    // playback starts at the wrap in the stop-record block itself, then the
    // two-block loop alternates note-on and note-off blocks
    assert_eq!(p.port("keyboard"), vec![(0, [0x90, 36, 64])]);
    p.run_block();
    assert_eq!(p.port("keyboard"), vec![(0, [0x80, 36, 64])]);
    p.run_block();
    assert_eq!(p.port("keyboard"), vec![(0, [0x90, 36, 64])]);
}

#[test]
fn instruments_are_isolated_per_port() {
    let sampler = InstrumentConfig {
        name: "sampler".into(),
        mapping: BTreeMap::from([(30, (1, 40))]),
        snap: false,
        sticky: true,
        snap_beats_per_beat: 1,
        loop_beats_per_beat: 1,
    };
    let mut p = pipeline(vec![keyboard(), sampler]);
    p.transport.start();

    p.handles[0].key_pressed(29);
    p.handles[1].key_pressed(30);
    p.run_block();
    assert_eq!(p.port("keyboard"), vec![(0, [0x90, 36, 64])]);
    assert_eq!(p.port("sampler"), vec![(0, [0x91, 40, 64])]);

    // sticky instrument: the second press stops the note
    p.handles[1].key_pressed(30);
    p.run_block();
    assert!(p.port("keyboard").is_empty());
    assert_eq!(p.port("sampler"), vec![(0, [0x81, 40, 64])]);
}

#[test]
fn bpm_changes_from_the_control_side_reach_the_clock() {
    let mut p = pipeline(vec![keyboard()]);
    p.transport.start();
    Clock::adjust_bpm(&p.transport, 1.0);
    p.run_block();
    assert_eq!(p.clock.bpm, 121.0);
    Clock::adjust_bpm(&p.transport, -1.0);
    p.run_block();
    assert_eq!(p.clock.bpm, 120.0);
}
