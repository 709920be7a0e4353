//! An instrument is split in two. The control half owns the key mapping and
//! the producer ends of the queues and runs on the control thread; the audio
//! half owns the MIDI port, the loop bank and the consumer ends and runs in
//! the process callback. Everything crossing the boundary is a single
//! producer / single consumer ring or a relaxed atomic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::error;

use palette_shared::config::InstrumentConfig;
use palette_shared::{DEFAULT_VELOCITY, MidiEvent};

use crate::clock::Clock;
use crate::host::MidiOutPort;
use crate::looper::{LOOP_EVENT_CAPACITY, Loop};

pub const LOOPS_PER_INSTRUMENT: usize = 9;

/// Worst-case pending notes between two audio blocks, per queue. Overflow is
/// reported and the key event dropped.
const NOTE_QUEUE_CAPACITY: usize = 1024;
const TRIGGER_QUEUE_CAPACITY: usize = 64;

/// Loop-operation mode selected by the held loop-ops key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LoopMode {
    #[default]
    Normal = 0,
    Record = 1,
    Delete = 2,
    Half = 3,
    Double = 4,
}

impl LoopMode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LoopMode::Record,
            2 => LoopMode::Delete,
            3 => LoopMode::Half,
            4 => LoopMode::Double,
            _ => LoopMode::Normal,
        }
    }
}

/// Audio-thread half: drains the key queues into the MIDI port and runs the
/// loop bank. Bounded work, no allocation, no locks.
pub struct Instrument {
    name: String,
    snap: bool,
    snap_subdivision: u32,
    port: Option<Box<dyn MidiOutPort>>,
    to_play: HeapCons<(u8, u8)>,
    to_stop: HeapCons<(u8, u8)>,
    triggers: HeapCons<u8>,
    mode: Arc<AtomicU8>,
    loops: [Loop; LOOPS_PER_INSTRUMENT],
    live: Vec<(u32, MidiEvent)>,
    playback: Vec<(u32, MidiEvent)>,
}

/// Control-thread half: key lookup, sticky tracking and the producer ends.
pub struct InstrumentHandle {
    name: String,
    mapping: HashMap<u8, (u8, u8)>,
    sticky: bool,
    sounding: HashSet<u8>,
    to_play: HeapProd<(u8, u8)>,
    to_stop: HeapProd<(u8, u8)>,
    triggers: HeapProd<u8>,
    mode: Arc<AtomicU8>,
}

impl Instrument {
    pub fn from_config(config: &InstrumentConfig) -> (Instrument, InstrumentHandle) {
        let (play_tx, play_rx) = HeapRb::<(u8, u8)>::new(NOTE_QUEUE_CAPACITY).split();
        let (stop_tx, stop_rx) = HeapRb::<(u8, u8)>::new(NOTE_QUEUE_CAPACITY).split();
        let (trigger_tx, trigger_rx) = HeapRb::<u8>::new(TRIGGER_QUEUE_CAPACITY).split();
        let mode = Arc::new(AtomicU8::new(LoopMode::Normal as u8));

        let instrument = Instrument {
            name: config.name.clone(),
            snap: config.snap,
            snap_subdivision: config.snap_beats_per_beat.max(1),
            port: None,
            to_play: play_rx,
            to_stop: stop_rx,
            triggers: trigger_rx,
            mode: mode.clone(),
            loops: std::array::from_fn(|_| Loop::new()),
            live: Vec::with_capacity(NOTE_QUEUE_CAPACITY * 2),
            playback: Vec::with_capacity(LOOP_EVENT_CAPACITY),
        };
        let handle = InstrumentHandle {
            name: config.name.clone(),
            mapping: config.mapping.iter().map(|(&k, &v)| (k, v)).collect(),
            sticky: config.sticky,
            sounding: HashSet::new(),
            to_play: play_tx,
            to_stop: stop_tx,
            triggers: trigger_tx,
            mode,
        };
        (instrument, handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_port(&mut self, port: Box<dyn MidiOutPort>) {
        self.port = Some(port);
    }

    /// Per-block audio work: apply queued loop commands, drain the key
    /// queues into the port, then feed the loop bank.
    pub fn process(&mut self, block_size: usize, clock: &Clock) {
        // loop commands queued by the control thread apply at block start
        while let Some(index) = self.triggers.try_pop() {
            self.dispatch_trigger(index as usize);
        }

        let Some(port) = self.port.as_mut() else {
            return;
        };
        port.clear_buffer();

        let offset = if self.snap {
            let ticks_per_snap = clock.ticks_per_beat / self.snap_subdivision;
            let until = i64::from(ticks_per_snap) - i64::from(clock.ticks_until_beat);
            if until > block_size as i64 {
                // the snap point is beyond this block; keep everything queued
                return;
            }
            until.max(0) as u32
        } else {
            0
        };

        self.live.clear();
        while let Some((channel, note)) = self.to_play.try_pop() {
            let event = MidiEvent::note_on(channel, note, DEFAULT_VELOCITY);
            port.write_midi_event(offset, event);
            self.live.push((offset, event));
        }
        while let Some((channel, note)) = self.to_stop.try_pop() {
            let event = MidiEvent::note_off(channel, note, DEFAULT_VELOCITY);
            port.write_midi_event(offset, event);
            self.live.push((offset, event));
        }

        for lp in self.loops.iter_mut() {
            self.playback.clear();
            lp.process(block_size, &self.live, &mut self.playback);
            for &(at, event) in &self.playback {
                port.write_midi_event(at, event);
            }
        }
    }

    fn dispatch_trigger(&mut self, index: usize) {
        let Some(lp) = self.loops.get_mut(index) else {
            return;
        };
        match LoopMode::from_u8(self.mode.load(Ordering::Relaxed)) {
            LoopMode::Normal => {
                if lp.is_playing() {
                    lp.stop_playing();
                } else {
                    lp.start_playing();
                }
            }
            LoopMode::Record => {
                if lp.is_playing() {
                    return;
                }
                if lp.is_recording() {
                    lp.stop_recording();
                } else {
                    lp.start_recording();
                }
            }
            LoopMode::Delete => {
                if !lp.is_playing() && !lp.is_recording() {
                    lp.clear();
                }
            }
            LoopMode::Half => lp.half(),
            LoopMode::Double => lp.double(),
        }
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for InstrumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl InstrumentHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A pressed pad key. Sticky instruments toggle the sounding state on
    /// every press; otherwise the note follows the physical key.
    pub fn key_pressed(&mut self, code: u8) {
        let Some(&note) = self.mapping.get(&code) else {
            return;
        };
        if !self.sticky {
            self.push_play(note);
        } else if self.sounding.insert(code) {
            self.push_play(note);
        } else {
            self.sounding.remove(&code);
            self.push_stop(note);
        }
    }

    /// A released pad key. Sticky instruments ignore releases.
    pub fn key_released(&mut self, code: u8) {
        if self.sticky {
            return;
        }
        let Some(&note) = self.mapping.get(&code) else {
            return;
        };
        self.push_stop(note);
    }

    /// Queue a loop-pad press for the audio thread. What it does there
    /// depends on the mode in effect when the block starts.
    pub fn loop_trigger(&mut self, index: usize) {
        if index >= LOOPS_PER_INSTRUMENT {
            return;
        }
        if self.triggers.try_push(index as u8).is_err() {
            error!(
                instrument = %self.name,
                index, "loop trigger queue overflow; trigger dropped"
            );
        }
    }

    pub fn set_mode(&mut self, mode: LoopMode) {
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    fn push_play(&mut self, (channel, note): (u8, u8)) {
        if self.to_play.try_push((channel, note)).is_err() {
            error!(instrument = %self.name, "note-on queue overflow; key dropped");
        }
    }

    fn push_stop(&mut self, (channel, note): (u8, u8)) {
        if self.to_stop.try_push((channel, note)).is_err() {
            error!(instrument = %self.name, "note-off queue overflow; key dropped");
        }
    }
}
