use tracing::error;

use palette_shared::MidiEvent;

/// Maximum events a single loop can hold. The buffer is allocated up front
/// so recording never allocates on the audio thread.
pub const LOOP_EVENT_CAPACITY: usize = 4096;

/// Lifecycle of a loop. Replaces the record/play boolean pair: a loop is
/// never both recording and playing, and zero length means empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Empty,
    Recording,
    Playing,
    Paused,
}

/// A recorded timeline of MIDI events replayed against the current position
/// modulo its length.
pub struct Loop {
    events: Vec<(u64, MidiEvent)>,
    length: u64,
    position: u64,
    state: LoopState,
    dropped: u32,
}

impl Loop {
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(LOOP_EVENT_CAPACITY),
            length: 0,
            position: 0,
            state: LoopState::Empty,
            dropped: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == LoopState::Recording
    }

    pub fn is_playing(&self) -> bool {
        self.state == LoopState::Playing
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Events lost to a full recording buffer since the last clear.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn start_recording(&mut self) {
        self.events.clear();
        self.length = 0;
        self.position = 0;
        self.state = LoopState::Recording;
    }

    /// Recording rolls straight into playback. The position stays at the end
    /// of the recording so playback resumes at the wrap on the next block.
    pub fn stop_recording(&mut self) {
        self.state = if self.length == 0 {
            LoopState::Empty
        } else {
            LoopState::Playing
        };
    }

    pub fn start_playing(&mut self) {
        if self.state == LoopState::Empty {
            return;
        }
        self.position = 0;
        self.state = LoopState::Playing;
    }

    pub fn stop_playing(&mut self) {
        if self.state == LoopState::Playing {
            self.state = LoopState::Paused;
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.length = 0;
        self.position = 0;
        self.dropped = 0;
        self.state = LoopState::Empty;
    }

    /// Append silence equal to the current length between iterations. The
    /// events are untouched.
    pub fn double(&mut self) {
        self.length *= 2;
    }

    /// Halve the playtime. Events beyond the new length stay recorded but
    /// dormant until a later `double` restores them.
    pub fn half(&mut self) {
        if self.length == 0 {
            return;
        }
        self.length /= 2;
        if self.length == 0 {
            self.position = 0;
        } else if self.position >= self.length {
            self.position %= self.length;
        }
    }

    /// Record or play one audio block. `incoming` holds the live events the
    /// instrument emitted this block; playback events are appended to `out`
    /// with offsets inside the block.
    pub fn process(
        &mut self,
        block_size: usize,
        incoming: &[(u32, MidiEvent)],
        out: &mut Vec<(u32, MidiEvent)>,
    ) {
        if block_size == 0 {
            return;
        }
        let frames = block_size as u64;
        match self.state {
            LoopState::Recording => {
                for &(offset, event) in incoming {
                    if self.events.len() >= LOOP_EVENT_CAPACITY {
                        if self.dropped == 0 {
                            error!("loop event buffer full; dropping further recorded events");
                        }
                        self.dropped = self.dropped.saturating_add(1);
                        continue;
                    }
                    self.events.push((self.position + offset as u64, event));
                }
                self.length += frames;
                self.position += frames;
            }
            LoopState::Playing if self.length > 0 => {
                // the block window [position, position + frames) wraps
                // modulo length: a head up to the end of the loop, then a
                // tail from the start
                let head_end = (self.position + frames).min(self.length);
                let tail_len = frames - (head_end - self.position);
                for &(at, event) in &self.events {
                    if at >= self.position && at < head_end {
                        out.push(((at - self.position) as u32, event));
                    }
                }
                if tail_len > 0 {
                    for &(at, event) in &self.events {
                        if at < tail_len {
                            out.push(((self.length - self.position + at) as u32, event));
                        }
                    }
                }
                self.position = (self.position + frames) % self.length;
            }
            _ => {}
        }
    }
}

impl Default for Loop {
    fn default() -> Self {
        Self::new()
    }
}
