use colored::Colorize;
use mircast_protocol::Transport;
use mircast_runtime::{Bridge, BridgeClient};

use crate::commands::pick_device;
use crate::error::Result;
use crate::output::print_json;

pub async fn execute(bridge: &BridgeClient, serial: Option<String>, json: bool) -> Result<()> {
    let device = pick_device(bridge, serial, Some(Transport::Network)).await?;
    bridge.disconnect(&device.serial).await?;

    if json {
        return print_json(&serde_json::json!({
            "disconnected": device.serial,
        }));
    }
    println!(
        "{} {}",
        "disconnected:".green().bold(),
        device.serial.bold()
    );
    Ok(())
}
