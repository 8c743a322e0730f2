use colored::Colorize;
use mircast_protocol::Transport;
use mircast_runtime::{
    BridgeClient, DeviceRegistry, PairingConfig, PairingPhase, PairingSession, RegistryConfig,
};

use crate::commands::{bridge_arc, pick_device};
use crate::error::Result;
use crate::output::{print_json, print_json_line};

pub async fn execute(
    bridge: &BridgeClient,
    serial: Option<String>,
    port: u16,
    json: bool,
) -> Result<()> {
    let device = pick_device(bridge, serial, Some(Transport::Usb)).await?;
    let registry = DeviceRegistry::spawn(bridge_arc(bridge), RegistryConfig::default());

    let mut session = PairingSession::new(
        &device.serial,
        PairingConfig {
            port,
            ..PairingConfig::default()
        },
    );
    let mut updates = session.updates();

    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if json {
                let _ = print_json_line(&update);
            } else {
                render_update(&update);
            }
        }
    });

    let result = session.run(bridge, &registry).await;
    let _ = printer.await;
    registry.shutdown().await;

    let paired = result?;
    if json {
        print_json(&paired)?;
    } else {
        println!(
            "{} {} is now wireless, the cable can be unplugged",
            "paired:".green().bold(),
            paired.serial.bold()
        );
    }
    Ok(())
}

fn render_update(update: &mircast_runtime::PairingUpdate) {
    let label = match update.phase {
        PairingPhase::DiscoverIp => "discovering wi-fi address",
        PairingPhase::EnableTcpip => "switching bridge to tcp/ip mode",
        PairingPhase::AwaitReconnect => "reconnecting over the network",
        PairingPhase::Verify => "verifying the wireless connection",
        PairingPhase::Done => "done",
        PairingPhase::Failed => "failed",
    };
    let mut line = format!("[{}] {label}", update.serial);
    if let Some(ip) = &update.target_ip {
        line.push_str(&format!(" ({ip})"));
    }
    if update.phase == PairingPhase::AwaitReconnect && update.attempts > 0 {
        line.push_str(&format!(", attempt {}", update.attempts));
    }
    if let Some(err) = &update.last_error {
        line.push_str(&format!(": {err}"));
    }
    eprintln!("{line}");
}
