use mircast_runtime::{Bridge, BridgeClient, DeviceRegistry, RegistryConfig, RegistryEvent};
use tracing::info;

use crate::commands::{bridge_arc, probe_capabilities};
use crate::error::Result;
use crate::output::{device_line, print_json, print_json_line};

pub async fn execute(bridge: &BridgeClient, watch: bool, json: bool) -> Result<()> {
    if watch {
        return watch_events(bridge, json).await;
    }

    let mut devices = bridge.list_devices().await?;
    for device in &mut devices {
        probe_capabilities(bridge, device).await;
    }

    if json {
        return print_json(&devices);
    }
    if devices.is_empty() {
        println!("no devices attached");
        return Ok(());
    }
    for device in &devices {
        println!("{}", device_line(device));
    }
    Ok(())
}

/// Streams registry change events until interrupted.
async fn watch_events(bridge: &BridgeClient, json: bool) -> Result<()> {
    let registry = DeviceRegistry::spawn(bridge_arc(bridge), RegistryConfig::default());
    let mut events = registry.subscribe();
    info!(target = "mircast", "watching for device changes, ctrl-c to stop");

    use tokio::sync::broadcast::error::RecvError;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => render_event(&event, json)?,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    registry.shutdown().await;
    Ok(())
}

fn render_event(event: &RegistryEvent, json: bool) -> Result<()> {
    if json {
        return print_json_line(event);
    }
    match event {
        RegistryEvent::DeviceAdded(device) => println!("+ {}", device_line(device)),
        RegistryEvent::DeviceRemoved { serial } => println!("- {serial}"),
        RegistryEvent::DeviceStateChanged { serial, old, new } => {
            println!("~ {serial}  {old:?} -> {new:?}");
        }
    }
    Ok(())
}
