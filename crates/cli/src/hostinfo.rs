//! Host capability probes feeding the recommendation engine.

use tracing::debug;

const FALLBACK_RAM_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Total physical memory of this machine in bytes.
///
/// Falls back to 8 GiB when the platform probe fails, which lands in
/// the middle recommendation tier rather than the most expensive one.
pub fn host_ram_bytes() -> u64 {
    match probe_ram_bytes() {
        Some(bytes) => bytes,
        None => {
            debug!(target = "mircast", "host memory probe failed, assuming 8 GiB");
            FALLBACK_RAM_BYTES
        }
    }
}

#[cfg(target_os = "linux")]
fn probe_ram_bytes() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_total(&meminfo)
}

/// Reads the `MemTotal:` line, reported in kB.
#[cfg(any(target_os = "linux", test))]
fn parse_meminfo_total(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

#[cfg(target_os = "macos")]
fn probe_ram_bytes() -> Option<u64> {
    let output = std::process::Command::new("sysctl")
        .args(["-n", "hw.memsize"])
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn probe_ram_bytes() -> Option<u64> {
    None
}
