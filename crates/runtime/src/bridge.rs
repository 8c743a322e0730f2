//! Thin command-invocation layer over the adb device bridge.
//!
//! Every operation is one bounded subprocess invocation; nothing here
//! retries. Retry and backoff policy belongs to the callers (the
//! registry's poll loop and the pairing state machine).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use mircast_protocol::{Device, DeviceState};
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default bound applied to every bridge invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Device-bridge operations needed by the registry and the pairing
/// machine.
///
/// The production implementation shells out to the adb executable;
/// tests substitute a scripted fake.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Enumerates all devices the bridge currently knows about.
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// Reads a system property from a device.
    async fn get_prop(&self, serial: &str, key: &str) -> Result<String>;

    /// Switches a device's bridge daemon to TCP/IP listening mode.
    async fn set_tcpip(&self, serial: &str, port: u16) -> Result<()>;

    /// Connects to a device's bridge daemon over the network.
    async fn connect_tcp(&self, ip: &str, port: u16) -> Result<Device>;

    /// Tears down a network connection established with `connect_tcp`.
    async fn disconnect(&self, serial: &str) -> Result<()>;

    /// Discovers a device's Wi-Fi address, if it has one.
    async fn device_ip(&self, serial: &str) -> Result<Option<String>>;
}

/// Bridge client backed by the adb executable.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    adb: PathBuf,
    timeout: Duration,
}

impl BridgeClient {
    /// Locates the bridge executable.
    ///
    /// Search order:
    /// 1. `MIRCAST_ADB` environment variable (runtime override)
    /// 2. `adb` on PATH
    /// 3. Common install locations
    pub fn locate() -> Result<Self> {
        find_bridge_executable().map(Self::with_path)
    }

    /// Uses an explicit executable path, bypassing discovery.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            adb: path.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Overrides the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.adb
    }

    /// Runs one bridge invocation and returns its stdout.
    ///
    /// `serial` is only used to classify "device not found" failures.
    async fn run(&self, args: &[&str], serial: Option<&str>) -> Result<String> {
        let command = args.join(" ");
        debug!(target = "mircast.bridge", %command, "invoking bridge");

        // kill_on_drop: a timed-out invocation must not leave the child
        // running when the output future is dropped.
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.adb)
                .args(args)
                .stdin(std::process::Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::CommandFailed {
            command: command.clone(),
            detail: format!("timed out after {}ms", self.timeout.as_millis()),
        })?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::BridgeUnavailable,
            _ => Error::Io(e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(serial) = serial {
            if stderr.contains("not found") {
                return Err(Error::DeviceNotFound {
                    serial: serial.to_owned(),
                });
            }
        }
        Err(Error::CommandFailed {
            command,
            detail: if stderr.trim().is_empty() {
                format!("exit status {}", output.status)
            } else {
                stderr.trim().to_owned()
            },
        })
    }

    /// Probes the physical panel size via `wm size`.
    pub async fn physical_size(&self, serial: &str) -> Result<Option<(u32, u32)>> {
        let out = self
            .run(&["-s", serial, "shell", "wm", "size"], Some(serial))
            .await?;
        Ok(extract_physical_size(&out))
    }

    /// Probes the maximum panel refresh rate via `dumpsys display`.
    pub async fn refresh_rate(&self, serial: &str) -> Result<Option<u32>> {
        let out = self
            .run(&["-s", serial, "shell", "dumpsys", "display"], Some(serial))
            .await?;
        Ok(extract_refresh_rate(&out))
    }

    pub async fn model(&self, serial: &str) -> Result<String> {
        self.get_prop(serial, "ro.product.model").await
    }

    pub async fn manufacturer(&self, serial: &str) -> Result<String> {
        self.get_prop(serial, "ro.product.manufacturer").await
    }
}

#[async_trait]
impl Bridge for BridgeClient {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let out = self.run(&["devices", "-l"], None).await?;
        Ok(parse_devices(&out))
    }

    async fn get_prop(&self, serial: &str, key: &str) -> Result<String> {
        let out = self
            .run(&["-s", serial, "shell", "getprop", key], Some(serial))
            .await?;
        Ok(out.trim().to_owned())
    }

    async fn set_tcpip(&self, serial: &str, port: u16) -> Result<()> {
        let port = port.to_string();
        self.run(&["-s", serial, "tcpip", &port], Some(serial))
            .await?;
        Ok(())
    }

    async fn connect_tcp(&self, ip: &str, port: u16) -> Result<Device> {
        let target = format!("{ip}:{port}");
        let result = self.run(&["connect", &target], None).await;

        let out = match result {
            Ok(out) => out,
            Err(Error::CommandFailed { detail, .. }) if detail.contains("timed out") => {
                return Err(Error::ConnectTimeout {
                    target,
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            Err(e) => return Err(e),
        };

        // adb exits zero even when the connect is refused, so the
        // outcome lives in the output text.
        if out.to_lowercase().contains("connected") {
            Ok(Device::network(target, DeviceState::Ready))
        } else {
            Err(Error::CommandFailed {
                command: format!("connect {target}"),
                detail: out.trim().to_owned(),
            })
        }
    }

    async fn disconnect(&self, serial: &str) -> Result<()> {
        self.run(&["disconnect", serial], Some(serial)).await?;
        Ok(())
    }

    async fn device_ip(&self, serial: &str) -> Result<Option<String>> {
        let out = self
            .run(&["-s", serial, "shell", "ip", "route"], Some(serial))
            .await?;
        Ok(extract_wlan_ip(&out))
    }
}

/// Finds the adb executable via env override, PATH, then well-known
/// install locations.
pub fn find_bridge_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MIRCAST_ADB") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        warn!(
            target = "mircast.bridge",
            path = %path.display(),
            "MIRCAST_ADB is set but does not exist; falling back"
        );
    }

    if let Ok(path) = which::which("adb") {
        return Ok(path);
    }

    #[cfg(not(windows))]
    let common_locations = [
        "/usr/bin/adb",
        "/usr/local/bin/adb",
        "/opt/homebrew/bin/adb",
        "/opt/android-sdk/platform-tools/adb",
    ];

    #[cfg(windows)]
    let common_locations = [
        "C:\\platform-tools\\adb.exe",
        "C:\\Android\\platform-tools\\adb.exe",
    ];

    for location in &common_locations {
        let path = PathBuf::from(location);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(Error::BridgeUnavailable)
}

/// Parses `adb devices -l` output into devices.
pub fn parse_devices(output: &str) -> Vec<Device> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(parse_device_line)
        .collect()
}

fn parse_device_line(line: &str) -> Option<Device> {
    let mut fields = line.split_whitespace();
    let serial = fields.next()?;
    let state = match fields.next()? {
        "device" => DeviceState::Ready,
        "unauthorized" => DeviceState::Unauthorized,
        // "offline", "recovery", "sideload", ... are all unusable
        _ => DeviceState::Offline,
    };

    let mut device = if Device::is_network_serial(serial) {
        Device::network(serial, state)
    } else {
        Device::usb(serial, state)
    };

    for field in fields {
        if let Some(model) = field.strip_prefix("model:") {
            device.model = Some(model.replace('_', " "));
        }
    }
    Some(device)
}

static WLAN_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"dev\s+wlan\d+\s+.*?src\s+(\d+\.\d+\.\d+\.\d+)").unwrap()
});
static SRC_WLAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"src\s+(\d+\.\d+\.\d+\.\d+)\s+.*?wlan\d+").unwrap()
});

/// Extracts the wlan interface source address from `ip route` output.
/// Some vendors order the route fields differently, hence two patterns.
pub fn extract_wlan_ip(output: &str) -> Option<String> {
    WLAN_SRC_RE
        .captures(output)
        .or_else(|| SRC_WLAN_RE.captures(output))
        .map(|caps| caps[1].to_owned())
}

static PHYSICAL_SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Physical size:\s*(\d+)x(\d+)").unwrap());
static ANY_SIZE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)x(\d+)").unwrap());

/// Extracts "Physical size: WxH" from `wm size` output, falling back to
/// the first WxH pair (override size).
pub fn extract_physical_size(output: &str) -> Option<(u32, u32)> {
    PHYSICAL_SIZE_RE
        .captures(output)
        .or_else(|| ANY_SIZE_RE.captures(output))
        .and_then(|caps| {
            let w = caps[1].parse().ok()?;
            let h = caps[2].parse().ok()?;
            Some((w, h))
        })
}

static FPS_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fps=(\d+(?:\.\d+)?)").unwrap());

/// Extracts the highest plausible refresh rate from `dumpsys display`.
pub fn extract_refresh_rate(output: &str) -> Option<u32> {
    FPS_VALUE_RE
        .captures_iter(output)
        .filter_map(|caps| caps[1].parse::<f64>().ok())
        .map(|fps| fps.round() as u32)
        .filter(|fps| (30..=360).contains(fps))
        .max()
}
