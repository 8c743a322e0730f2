//! Device identity and state as reported by the bridge tool.

use serde::{Deserialize, Serialize};

/// Physical or logical channel to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Cable-attached, serial is the hardware serial number
    Usb,
    /// Bridge-over-TCP/IP, serial is `ip:port`
    Network,
}

/// Bridge-reported device availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// Attached but the host key has not been accepted on the device
    Unauthorized,
    /// Known to the bridge but not currently reachable
    Offline,
    /// Fully enumerated and accepting commands
    Ready,
}

/// A device observed by the bridge, keyed by serial.
///
/// Capability fields (`physical_resolution`, `refresh_rate`) are filled
/// lazily by explicit probes; a bare enumeration leaves them `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique per physical unit (USB) or per transport session (network)
    pub serial: String,
    pub transport: Transport,
    pub state: DeviceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Physical panel size in pixels, (width, height)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_resolution: Option<(u32, u32)>,
    /// Maximum panel refresh rate in Hz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<u32>,
    /// Set for network-transport devices only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl Device {
    /// Creates a USB device in the given state with no capability data.
    pub fn usb(serial: impl Into<String>, state: DeviceState) -> Self {
        Self {
            serial: serial.into(),
            transport: Transport::Usb,
            state,
            model: None,
            manufacturer: None,
            physical_resolution: None,
            refresh_rate: None,
            ip_address: None,
        }
    }

    /// Creates a network device from an `ip:port` serial.
    pub fn network(serial: impl Into<String>, state: DeviceState) -> Self {
        let serial = serial.into();
        let ip = serial.split(':').next().map(str::to_owned);
        Self {
            serial,
            transport: Transport::Network,
            state,
            model: None,
            manufacturer: None,
            physical_resolution: None,
            refresh_rate: None,
            ip_address: ip,
        }
    }

    /// Whether a bridge serial has the `ip:port` shape of a network device.
    pub fn is_network_serial(serial: &str) -> bool {
        match serial.split_once(':') {
            Some((host, port)) => {
                host.parse::<std::net::Ipv4Addr>().is_ok() && port.parse::<u16>().is_ok()
            }
            None => false,
        }
    }

    /// Long edge of the physical panel in pixels, if probed.
    pub fn long_edge(&self) -> Option<u32> {
        self.physical_resolution.map(|(w, h)| w.max(h))
    }

    /// Human-readable name: "Manufacturer Model (serial)", with a
    /// wireless marker for network transports.
    pub fn display_name(&self) -> String {
        let suffix = match self.transport {
            Transport::Network => "wireless".to_owned(),
            Transport::Usb => self.serial.clone(),
        };
        match (&self.manufacturer, &self.model) {
            (Some(manufacturer), Some(model)) => format!("{manufacturer} {model} ({suffix})"),
            (None, Some(model)) => format!("{model} ({suffix})"),
            _ => match self.transport {
                Transport::Network => format!("{} (wireless)", self.serial),
                Transport::Usb => self.serial.clone(),
            },
        }
    }
}
