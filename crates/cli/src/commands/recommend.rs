use mircast_protocol::{RecommendationTable, recommend};
use mircast_runtime::BridgeClient;
use serde::Serialize;
use tracing::debug;

use crate::commands::{pick_device, probe_capabilities};
use crate::error::Result;
use crate::hostinfo::host_ram_bytes;
use crate::output::{config_summary, device_line, print_json};

#[derive(Serialize)]
struct Recommendation {
    device: mircast_protocol::Device,
    host_ram_bytes: u64,
    config: mircast_protocol::MirrorConfig,
}

pub async fn execute(bridge: &BridgeClient, serial: Option<String>, json: bool) -> Result<()> {
    let mut device = pick_device(bridge, serial, None).await?;
    probe_capabilities(bridge, &mut device).await;

    let ram = host_ram_bytes();
    debug!(
        target = "mircast",
        serial = %device.serial,
        ram_gib = ram >> 30,
        resolution = ?device.physical_resolution,
        refresh = ?device.refresh_rate,
        "recommendation inputs"
    );

    let config = recommend(
        &RecommendationTable::default(),
        ram,
        device.physical_resolution,
        device.refresh_rate,
    );

    if json {
        return print_json(&Recommendation {
            device,
            host_ram_bytes: ram,
            config,
        });
    }

    println!("{}", device_line(&device));
    println!("{}", config_summary(&config));
    Ok(())
}
