use std::sync::Arc;

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::host::SharedTransport;
use crate::registry::InstrumentRegistry;

/// Owns the audio stream whose callback is the process entry point. The
/// registry and clock move into the callback; per block it advances the
/// transport, refreshes the clock mirror and fans out to the instruments.
pub struct AudioEngine {
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl AudioEngine {
    /// Build the output stream and start the process callback. Ports must
    /// already be bound on the registry.
    pub fn new(
        mut registry: InstrumentRegistry,
        mut clock: Clock,
        transport: Arc<SharedTransport>,
    ) -> Result<Self, anyhow::Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(anyhow!("no output device available"))?;
        let config = device.default_output_config()?;

        let sample_rate = config.sample_rate();
        let channels = config.channels() as usize;
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();

        transport.set_sample_rate(sample_rate);
        info!(sample_rate, "audio engine starting");

        let err_fn = |err: cpal::StreamError| {
            // underruns are observable-only; the engine takes no action
            warn!("audio stream error: {err}");
        };

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    transport.advance(frames);
                    clock.refresh(transport.as_ref());
                    registry.process(frames, &clock);
                    // the engine emits MIDI only; the audio buffer stays silent
                    data.fill(0.0);
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported sample format: {other}")),
        };

        stream.play()?;

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop the callback. No further blocks arrive after this returns.
    pub fn shutdown(self) {
        let _ = self._stream.pause();
    }
}
