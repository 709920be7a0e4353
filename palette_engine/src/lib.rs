pub mod clock;
pub mod engine;
pub mod host;
pub mod instrument;
pub mod looper;
pub mod registry;

#[cfg(test)]
mod tests_pipeline;

pub use clock::Clock;
pub use engine::AudioEngine;
pub use host::{
    MidiHost, MidiOutPort, MidirHost, SharedTransport, Transport, TransportPosition,
    TransportState,
};
pub use instrument::{Instrument, InstrumentHandle, LoopMode};
pub use registry::InstrumentRegistry;
