//! Rendering helpers shared by the commands.
//!
//! Text goes to stdout via these helpers; logs go to stderr via
//! tracing. With `--json` every command prints serialized structures
//! instead.

use colored::Colorize;
use mircast_protocol::{Device, DeviceState, MirrorConfig, ResolutionCap, Transport};
use serde::Serialize;

use crate::error::Result;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One NDJSON line, used by the streaming commands.
pub fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub fn device_line(device: &Device) -> String {
    let state = match device.state {
        DeviceState::Ready => "ready".green(),
        DeviceState::Unauthorized => "unauthorized".yellow(),
        DeviceState::Offline => "offline".red(),
    };
    let transport = match device.transport {
        Transport::Usb => "usb",
        Transport::Network => "wifi",
    };

    let mut line = format!(
        "{:<24} {:<5} {:<13} {}",
        device.serial.bold(),
        transport,
        state,
        device.display_name()
    );
    if let Some((w, h)) = device.physical_resolution {
        line.push_str(&format!("  {w}x{h}"));
    }
    if let Some(hz) = device.refresh_rate {
        line.push_str(&format!(" @{hz}Hz"));
    }
    line
}

pub fn config_summary(config: &MirrorConfig) -> String {
    let cap = match config.resolution_cap {
        ResolutionCap::Native => "native".to_owned(),
        ResolutionCap::Pixels(p) => format!("{p}px"),
    };
    format!(
        "resolution {}  fps {}  bitrate {}M  codec {}",
        cap.bold(),
        config.fps.to_string().bold(),
        config.bitrate_mbps.to_string().bold(),
        config.codec.as_engine_arg().bold()
    )
}
