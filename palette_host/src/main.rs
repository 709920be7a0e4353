mod control;
mod driver;

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use crossbeam_channel::{Sender, unbounded};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use palette_engine::clock::Clock;
use palette_engine::engine::AudioEngine;
use palette_engine::host::{MidirHost, SharedTransport, Transport};
use palette_engine::registry::InstrumentRegistry;
use palette_shared::KeyEvent;

use control::ControlPlane;

const CONFIG_PATH: &str = "palette.json";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let test_mode = std::env::args().skip(1).any(|arg| arg == "-t");

    let (mut registry, handles) = InstrumentRegistry::load(Path::new(CONFIG_PATH))
        .context("loading instrument configuration")?;
    info!(instruments = registry.len(), "configuration loaded");

    let mut midi = MidirHost::new("palette");
    registry
        .bind_ports(&mut midi)
        .context("registering MIDI ports")?;

    let transport = Arc::new(SharedTransport::new());
    Clock::sync_to_host(transport.as_ref());

    let engine = AudioEngine::new(registry, Clock::new(), transport.clone())
        .context("starting audio engine")?;

    let (line_tx, line_rx) = unbounded::<String>();
    if test_mode {
        info!("test mode: reading key events from stdin");
        thread::spawn(move || read_stdin(line_tx));
    } else {
        thread::spawn(move || {
            if let Err(err) = driver::run(line_tx) {
                warn!("input driver stopped: {err}");
            }
        });
    }

    let plane_transport: Arc<dyn Transport> = transport;
    let mut plane = ControlPlane::new(handles, plane_transport);
    for line in line_rx {
        match KeyEvent::parse_line(&line) {
            Ok(event) => {
                if !plane.handle(event) {
                    break;
                }
            }
            Err(err) => warn!("skipping malformed input line: {err}"),
        }
    }

    engine.shutdown();
    info!("goodbye");
    Ok(())
}

fn read_stdin(lines: Sender<String>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                if lines.send(line).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}
