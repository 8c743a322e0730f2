//! Mirroring configuration assembled before launch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Video codec the engine is asked to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Lower latency, universally supported
    H264,
    /// Better compression at high resolutions
    H265,
}

impl Codec {
    /// Value for the engine's `--video-codec` flag.
    pub fn as_engine_arg(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::H264 => write!(f, "H.264"),
            Codec::H265 => write!(f, "H.265"),
        }
    }
}

/// Cap on the streamed long-edge size, in the engine's `-m` terms
/// (720p ⇒ 1280, 1080p ⇒ 1920, 1440p ⇒ 2560).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionCap {
    /// Stream at the device's native size, no `-m` flag
    Native,
    /// Downscale so the long edge does not exceed this many pixels
    Pixels(u32),
}

impl fmt::Display for ResolutionCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionCap::Native => write!(f, "native"),
            ResolutionCap::Pixels(p) => write!(f, "{p}"),
        }
    }
}

impl FromStr for ResolutionCap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("native") {
            return Ok(ResolutionCap::Native);
        }
        s.parse::<u32>()
            .map(ResolutionCap::Pixels)
            .map_err(|_| format!("expected a pixel count or \"native\", got {s:?}"))
    }
}

/// Immutable launch configuration for one mirroring session.
///
/// Owned by the caller; the process supervisor consumes it to build the
/// engine invocation and never mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub resolution_cap: ResolutionCap,
    /// Frame-rate cap passed to the engine
    pub fps: u32,
    /// Video bitrate in megabits per second
    pub bitrate_mbps: u32,
    pub codec: Codec,
    /// Turn the device screen off once mirroring starts
    pub screen_off_on_start: bool,
    /// Borderless mirror window
    pub borderless: bool,
    /// Ask the engine to report its rendered frame rate on stdout, so
    /// telemetry gets direct fps samples
    pub print_fps: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            resolution_cap: ResolutionCap::Pixels(1920),
            fps: 60,
            bitrate_mbps: 10,
            codec: Codec::H264,
            screen_off_on_start: false,
            borderless: false,
            print_fps: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_cap_parses() {
        assert_eq!("native".parse::<ResolutionCap>(), Ok(ResolutionCap::Native));
        assert_eq!("Native".parse::<ResolutionCap>(), Ok(ResolutionCap::Native));
        assert_eq!("1920".parse::<ResolutionCap>(), Ok(ResolutionCap::Pixels(1920)));
        assert!("2K".parse::<ResolutionCap>().is_err());
    }
}
