mod devices;
mod disconnect;
mod mirror;
mod pair;
mod recommend;

use std::sync::Arc;

use mircast_protocol::{Device, DeviceState, Transport};
use mircast_runtime::{Bridge, BridgeClient};

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};

pub async fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        verbose: _,
        adb,
        scrcpy,
        json,
        command,
    } = cli;

    let bridge = match adb {
        Some(path) => BridgeClient::with_path(path),
        None => BridgeClient::locate()?,
    };

    match command {
        Commands::Devices { watch } => devices::execute(&bridge, watch, json).await,
        Commands::Pair { serial, port } => pair::execute(&bridge, serial, port, json).await,
        Commands::Disconnect { serial } => disconnect::execute(&bridge, serial, json).await,
        Commands::Recommend { serial } => recommend::execute(&bridge, serial, json).await,
        Commands::Mirror {
            serial,
            auto,
            max_size,
            fps,
            bitrate,
            codec,
            turn_screen_off,
            borderless,
        } => {
            let overrides = mirror::Overrides {
                auto,
                max_size,
                fps,
                bitrate,
                codec,
                turn_screen_off,
                borderless,
            };
            mirror::execute(&bridge, scrcpy, serial, overrides, json).await
        }
    }
}

/// Resolves the target device: an explicit serial must be attached and
/// match the transport the command needs; with no serial there must be
/// exactly one ready candidate.
pub(crate) async fn pick_device(
    bridge: &dyn Bridge,
    serial: Option<String>,
    transport: Option<Transport>,
) -> Result<Device> {
    let devices = bridge.list_devices().await?;

    if let Some(serial) = serial {
        let device = devices
            .into_iter()
            .find(|d| d.serial == serial)
            .ok_or(CliError::Runtime(mircast_runtime::Error::DeviceNotFound {
                serial,
            }))?;
        if let Some(required) = transport {
            if device.transport != required {
                return Err(CliError::TransportMismatch {
                    serial: device.serial,
                    required: transport_label(required),
                });
            }
        }
        return Ok(device);
    }

    let mut candidates: Vec<Device> = devices
        .into_iter()
        .filter(|d| d.state == DeviceState::Ready)
        .filter(|d| transport.is_none_or(|t| d.transport == t))
        .collect();

    match candidates.len() {
        0 => Err(CliError::NoDevice),
        1 => Ok(candidates.remove(0)),
        count => Err(CliError::AmbiguousDevice {
            count,
            candidates: candidates.into_iter().map(|d| d.serial).collect(),
        }),
    }
}

/// Fills in the capability fields the plain device listing lacks.
pub(crate) async fn probe_capabilities(bridge: &BridgeClient, device: &mut Device) {
    if device.state != DeviceState::Ready {
        return;
    }
    if let Ok(size) = bridge.physical_size(&device.serial).await {
        device.physical_resolution = size;
    }
    if let Ok(rate) = bridge.refresh_rate(&device.serial).await {
        device.refresh_rate = rate;
    }
    if device.model.is_none() {
        device.model = bridge.model(&device.serial).await.ok();
    }
    if let Ok(manufacturer) = bridge.manufacturer(&device.serial).await {
        device.manufacturer = Some(manufacturer);
    }
}

pub(crate) fn bridge_arc(bridge: &BridgeClient) -> Arc<dyn Bridge> {
    Arc::new(bridge.clone())
}

pub(crate) fn transport_label(transport: Transport) -> &'static str {
    match transport {
        Transport::Usb => "usb",
        Transport::Network => "wireless",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mircast_runtime::Result as RuntimeResult;

    struct StubBridge {
        devices: Vec<Device>,
    }

    #[async_trait]
    impl Bridge for StubBridge {
        async fn list_devices(&self) -> RuntimeResult<Vec<Device>> {
            Ok(self.devices.clone())
        }

        async fn get_prop(&self, _serial: &str, _key: &str) -> RuntimeResult<String> {
            Ok(String::new())
        }

        async fn set_tcpip(&self, _serial: &str, _port: u16) -> RuntimeResult<()> {
            Ok(())
        }

        async fn connect_tcp(&self, ip: &str, port: u16) -> RuntimeResult<Device> {
            Ok(Device::network(format!("{ip}:{port}"), DeviceState::Ready))
        }

        async fn disconnect(&self, _serial: &str) -> RuntimeResult<()> {
            Ok(())
        }

        async fn device_ip(&self, _serial: &str) -> RuntimeResult<Option<String>> {
            Ok(None)
        }
    }

    fn bridge_with(devices: Vec<Device>) -> StubBridge {
        StubBridge { devices }
    }

    #[tokio::test]
    async fn explicit_serial_must_match_the_required_transport() {
        let bridge = bridge_with(vec![Device::network(
            "192.168.1.42:5555",
            DeviceState::Ready,
        )]);
        // An already-wireless device is no candidate for pairing, even
        // when named explicitly.
        let err = pick_device(
            &bridge,
            Some("192.168.1.42:5555".into()),
            Some(Transport::Usb),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CliError::TransportMismatch { required: "usb", .. }));
    }

    #[tokio::test]
    async fn defaults_to_the_sole_matching_transport() {
        let bridge = bridge_with(vec![
            Device::usb("USB1", DeviceState::Ready),
            Device::network("192.168.1.42:5555", DeviceState::Ready),
        ]);

        let usb = pick_device(&bridge, None, Some(Transport::Usb)).await.unwrap();
        assert_eq!(usb.serial, "USB1");

        let wireless = pick_device(&bridge, None, Some(Transport::Network))
            .await
            .unwrap();
        assert_eq!(wireless.serial, "192.168.1.42:5555");
    }

    #[tokio::test]
    async fn unfiltered_pick_rejects_ambiguity() {
        let bridge = bridge_with(vec![
            Device::usb("USB1", DeviceState::Ready),
            Device::usb("USB2", DeviceState::Ready),
        ]);
        let err = pick_device(&bridge, None, None).await.unwrap_err();
        assert!(matches!(err, CliError::AmbiguousDevice { count: 2, .. }));
    }
}
