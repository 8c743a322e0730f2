use std::path::PathBuf;

use colored::Colorize;
use mircast_protocol::{
    MirrorConfig, RecommendationTable, ResolutionCap, TelemetryEvent, TelemetryKind, recommend,
};
use mircast_runtime::{BridgeClient, SessionStatus, Supervisor, SupervisorConfig};
use tracing::info;

use crate::cli::CliCodec;
use crate::commands::{pick_device, probe_capabilities};
use crate::error::{CliError, Result};
use crate::hostinfo::host_ram_bytes;
use crate::output::{config_summary, print_json_line};

pub struct Overrides {
    pub auto: bool,
    pub max_size: Option<String>,
    pub fps: Option<u32>,
    pub bitrate: Option<u32>,
    pub codec: Option<CliCodec>,
    pub turn_screen_off: bool,
    pub borderless: bool,
}

pub async fn execute(
    bridge: &BridgeClient,
    engine: Option<PathBuf>,
    serial: Option<String>,
    overrides: Overrides,
    json: bool,
) -> Result<()> {
    let mut device = pick_device(bridge, serial, None).await?;

    let mut config = if overrides.auto {
        probe_capabilities(bridge, &mut device).await;
        recommend(
            &RecommendationTable::default(),
            host_ram_bytes(),
            device.physical_resolution,
            device.refresh_rate,
        )
    } else {
        MirrorConfig::default()
    };
    apply_overrides(&mut config, &overrides)?;

    let supervisor = match engine {
        Some(path) => Supervisor::new(path, SupervisorConfig::default()),
        None => Supervisor::locate(SupervisorConfig::default())?,
    };

    if !json {
        eprintln!("mirroring {}  {}", device.serial.bold(), config_summary(&config));
    }

    let mut session = supervisor.launch(&device, config)?;
    let mut events = session.subscribe();
    let mut status = session.status_stream();

    // Stream telemetry until the engine exits or the user interrupts.
    let final_status = loop {
        tokio::select! {
            changed = status.changed() => {
                let current = *status.borrow();
                if changed.is_err() || current.is_terminal() {
                    break current;
                }
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    render_event(&event, json)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(target = "mircast", serial = %device.serial, "interrupt, stopping session");
                break session.stop().await;
            }
        }
    };
    // Telemetry that raced the exit is still worth showing.
    while let Ok(event) = events.try_recv() {
        render_event(&event, json)?;
    }
    supervisor.reap(&device.serial);

    match final_status {
        SessionStatus::Crashed => {
            Err(CliError::Runtime(mircast_runtime::Error::ProcessCrashed {
                code: session.exit_code().unwrap_or(-1),
                diagnostics: session.diagnostics(),
            }))
        }
        status => {
            info!(target = "mircast", serial = %device.serial, ?status, "session ended");
            Ok(())
        }
    }
}

/// Explicit flags win over both the defaults and the auto-derived
/// settings.
fn apply_overrides(config: &mut MirrorConfig, overrides: &Overrides) -> Result<()> {
    if let Some(max_size) = &overrides.max_size {
        config.resolution_cap = parse_max_size(max_size)?;
    }
    if let Some(fps) = overrides.fps {
        config.fps = fps;
    }
    if let Some(bitrate) = overrides.bitrate {
        config.bitrate_mbps = bitrate;
    }
    if let Some(codec) = overrides.codec {
        config.codec = codec.into();
    }
    if overrides.turn_screen_off {
        config.screen_off_on_start = true;
    }
    if overrides.borderless {
        config.borderless = true;
    }
    Ok(())
}

fn parse_max_size(value: &str) -> Result<ResolutionCap> {
    value
        .parse()
        .map_err(|_| CliError::InvalidMaxSize(value.to_owned()))
}

fn render_event(event: &TelemetryEvent, json: bool) -> Result<()> {
    if json {
        return print_json_line(event);
    }
    match &event.kind {
        TelemetryKind::FpsSample { fps } => println!("{fps:.1} fps"),
        TelemetryKind::FrameDrop { dropped } => {
            println!("{}", format!("{dropped} frames dropped").yellow());
        }
        TelemetryKind::Error { message } => println!("{}", message.red()),
        // Unclassified engine chatter stays visible only in the JSON stream
        TelemetryKind::Info { .. } => {}
    }
    Ok(())
}
