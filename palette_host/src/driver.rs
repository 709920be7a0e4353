//! USB keyboard reader. Runs on its own thread, turns raw HID boot reports
//! into `+<code>` / `-<code>` records on the line channel.

use crossbeam_channel::Sender;
use hidapi::{HidApi, HidDevice};
use tracing::{debug, info};

use palette_shared::error::DeviceError;

/// Boot-protocol keyboard report: modifier byte, reserved byte, then up to
/// six held key codes.
const REPORT_SIZE: usize = 8;
const READ_TIMEOUT_MS: i32 = 1000;
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 10;

const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
const USAGE_KEYBOARD: u16 = 0x06;

/// Find the first HID keyboard and stream key transitions into the channel
/// until the channel closes or the device gives up.
pub fn run(lines: Sender<String>) -> Result<(), DeviceError> {
    let api = HidApi::new().map_err(|err| DeviceError::Init(err.to_string()))?;
    let device = open_keyboard(&api)?;
    read_loop(&device, &lines)
}

fn open_keyboard(api: &HidApi) -> Result<HidDevice, DeviceError> {
    for info in api.device_list() {
        if info.usage_page() == USAGE_PAGE_GENERIC_DESKTOP && info.usage() == USAGE_KEYBOARD {
            info!(
                vendor = info.vendor_id(),
                product = info.product_id(),
                "using HID keyboard"
            );
            return info
                .open_device(api)
                .map_err(|err| DeviceError::Open(err.to_string()));
        }
    }
    Err(DeviceError::NotFound)
}

fn read_loop(device: &HidDevice, lines: &Sender<String>) -> Result<(), DeviceError> {
    let mut held: Vec<u8> = Vec::new();
    let mut report = [0u8; REPORT_SIZE];
    let mut timeouts = 0u32;
    loop {
        let read = device
            .read_timeout(&mut report, READ_TIMEOUT_MS)
            .map_err(|err| DeviceError::Read(err.to_string()))?;
        if read == 0 {
            timeouts += 1;
            if timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
                return Err(DeviceError::TimedOut(timeouts));
            }
            continue;
        }
        timeouts = 0;
        if !emit_transitions(&report[..read.min(REPORT_SIZE)], &mut held, lines) {
            debug!("input channel closed, stopping driver");
            return Ok(());
        }
    }
}

/// Diff one report against the held set and send the transitions, releases
/// first. Returns false when the channel is closed.
fn emit_transitions(report: &[u8], held: &mut Vec<u8>, lines: &Sender<String>) -> bool {
    // bytes 0 and 1 are the modifier mask and a reserved byte
    let pressed: &[u8] = if report.len() > 2 { &report[2..] } else { &[] };

    let released: Vec<u8> = held
        .iter()
        .copied()
        .filter(|code| !pressed.contains(code))
        .collect();
    for code in released {
        held.retain(|&c| c != code);
        if lines.send(format!("-{code}")).is_err() {
            return false;
        }
    }

    for &code in pressed {
        if code == 0 {
            continue;
        }
        if !held.contains(&code) {
            held.push(code);
            if lines.send(format!("+{code}")).is_err() {
                return false;
            }
        }
    }
    true
}
