//! Recommended mirroring configuration from host and device capability
//! data.
//!
//! Pure and total: any (RAM, resolution, refresh rate) input yields a
//! fully-populated, internally consistent [`MirrorConfig`]. The numeric
//! cutoffs are product policy, not structure, so they live in a
//! [`RecommendationTable`] rather than in the code.

use serde::{Deserialize, Serialize};

use crate::config::{Codec, MirrorConfig, ResolutionCap};

/// Tunable policy table for [`recommend`].
///
/// Resolution caps are expressed as long-edge pixel counts, matching the
/// engine's `-m` flag: 720p ⇒ 1280, 1080p ⇒ 1920, 1440p ⇒ 2560.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationTable {
    /// Hosts with at least this much RAM get the mid cap
    pub mid_ram_gib: u64,
    /// Hosts with strictly more than this get the high cap
    pub high_ram_gib: u64,
    pub low_cap: u32,
    pub mid_cap: u32,
    pub high_cap: u32,

    /// Frame-rate cap for ordinary hosts/devices
    pub base_fps: u32,
    /// Frame-rate cap when both boost conditions hold
    pub boost_fps: u32,
    /// Device refresh rate required for the boost cap
    pub boost_min_refresh: u32,
    /// Host RAM required for the boost cap
    pub boost_min_ram_gib: u64,

    /// Bitrate rows for the resolution axis (Mbps)
    pub bitrate_low: u32,
    pub bitrate_mid: u32,
    pub bitrate_high: u32,
    /// Bitrate row for the high-fps axis (Mbps)
    pub bitrate_high_fps: u32,
    /// Hard clamp applied last (Mbps)
    pub bitrate_floor: u32,
    pub bitrate_ceiling: u32,

    /// Long edge at or above which H.265 is preferred
    pub hevc_min_edge: u32,
}

impl Default for RecommendationTable {
    fn default() -> Self {
        Self {
            mid_ram_gib: 8,
            high_ram_gib: 16,
            low_cap: 1280,
            mid_cap: 1920,
            high_cap: 2560,
            base_fps: 60,
            boost_fps: 120,
            boost_min_refresh: 90,
            boost_min_ram_gib: 16,
            bitrate_low: 8,
            bitrate_mid: 10,
            bitrate_high: 20,
            bitrate_high_fps: 16,
            bitrate_floor: 4,
            bitrate_ceiling: 40,
            hevc_min_edge: 2560,
        }
    }
}

/// Derives a recommended configuration.
///
/// `host_ram_bytes` is total physical memory; `resolution` is the device
/// panel size if probed; `refresh_rate` defaults to 60 Hz when unknown.
pub fn recommend(
    table: &RecommendationTable,
    host_ram_bytes: u64,
    resolution: Option<(u32, u32)>,
    refresh_rate: Option<u32>,
) -> MirrorConfig {
    let ram_gib = host_ram_bytes >> 30;
    let long_edge = resolution.map(|(w, h)| w.max(h));

    let tier_cap = if ram_gib > table.high_ram_gib {
        table.high_cap
    } else if ram_gib >= table.mid_ram_gib {
        table.mid_cap
    } else {
        table.low_cap
    };

    // Downscaling to a cap at or above the panel size is a no-op, so
    // stream native in that case.
    let resolution_cap = match long_edge {
        Some(edge) if edge <= tier_cap => ResolutionCap::Native,
        _ => ResolutionCap::Pixels(tier_cap),
    };

    let refresh = refresh_rate.unwrap_or(table.base_fps);
    let fps_cap = if refresh >= table.boost_min_refresh && ram_gib >= table.boost_min_ram_gib {
        table.boost_fps
    } else {
        table.base_fps
    };
    let fps = refresh.min(fps_cap);

    // The long edge actually streamed, for the bitrate and codec rows.
    let effective_edge = match resolution_cap {
        ResolutionCap::Pixels(p) => p,
        ResolutionCap::Native => long_edge.unwrap_or(table.mid_cap),
    };
    let resolution_mbps = if effective_edge >= table.high_cap {
        table.bitrate_high
    } else if effective_edge >= table.mid_cap {
        table.bitrate_mid
    } else {
        table.bitrate_low
    };
    let fps_mbps = if fps >= table.boost_min_refresh {
        table.bitrate_high_fps
    } else {
        0
    };
    let bitrate_mbps = resolution_mbps
        .max(fps_mbps)
        .clamp(table.bitrate_floor, table.bitrate_ceiling);

    let codec = if effective_edge >= table.hevc_min_edge {
        Codec::H265
    } else {
        Codec::H264
    };

    MirrorConfig {
        resolution_cap,
        fps,
        bitrate_mbps,
        codec,
        screen_off_on_start: false,
        borderless: false,
        print_fps: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1 << 30;

    #[test]
    fn mid_tier_host_with_high_refresh_panel() {
        // 16 GiB host, 2400x1080 @ 90 Hz: cap 1920, boosted fps, H.264.
        let table = RecommendationTable::default();
        let config = recommend(&table, 16 * GIB, Some((1080, 2400)), Some(90));
        assert_eq!(config.resolution_cap, ResolutionCap::Pixels(1920));
        assert_eq!(config.fps, 90);
        assert_eq!(config.bitrate_mbps, 16);
        assert_eq!(config.codec, Codec::H264);
    }

    #[test]
    fn low_ram_host_gets_conservative_config() {
        let table = RecommendationTable::default();
        let config = recommend(&table, 4 * GIB, Some((1440, 3200)), Some(120));
        assert_eq!(config.resolution_cap, ResolutionCap::Pixels(1280));
        // High-refresh panel but not enough RAM for the boost cap.
        assert_eq!(config.fps, 60);
        assert_eq!(config.codec, Codec::H264);
    }

    #[test]
    fn big_host_and_panel_prefer_hevc() {
        let table = RecommendationTable::default();
        let config = recommend(&table, 32 * GIB, Some((1880, 3008)), Some(120));
        assert_eq!(config.resolution_cap, ResolutionCap::Pixels(2560));
        assert_eq!(config.fps, 120);
        assert_eq!(config.bitrate_mbps, 20);
        assert_eq!(config.codec, Codec::H265);
    }

    #[test]
    fn small_panel_streams_native() {
        let table = RecommendationTable::default();
        let config = recommend(&table, 16 * GIB, Some((1080, 1920)), None);
        assert_eq!(config.resolution_cap, ResolutionCap::Native);
        assert_eq!(config.fps, 60);
    }

    #[test]
    fn unknown_capabilities_still_yield_full_config() {
        let table = RecommendationTable::default();
        let config = recommend(&table, 8 * GIB, None, None);
        assert_eq!(config.resolution_cap, ResolutionCap::Pixels(1920));
        assert_eq!(config.fps, 60);
        assert!(config.print_fps);
    }

    #[test]
    fn bitrate_always_within_clamp() {
        let table = RecommendationTable::default();
        for ram_gib in [0u64, 2, 8, 16, 24, 64, 256] {
            for resolution in [None, Some((720, 1280)), Some((1080, 2400)), Some((2000, 4000))] {
                for refresh in [None, Some(30), Some(60), Some(90), Some(144)] {
                    let config = recommend(&table, ram_gib * GIB, resolution, refresh);
                    assert!(
                        (table.bitrate_floor..=table.bitrate_ceiling)
                            .contains(&config.bitrate_mbps),
                        "bitrate {} out of range for ram={ram_gib} res={resolution:?} hz={refresh:?}",
                        config.bitrate_mbps,
                    );
                    assert!(config.fps > 0);
                }
            }
        }
    }

    #[test]
    fn deterministic_for_equal_inputs() {
        let table = RecommendationTable::default();
        let a = recommend(&table, 16 * GIB, Some((1080, 2400)), Some(90));
        let b = recommend(&table, 16 * GIB, Some((1080, 2400)), Some(90));
        assert_eq!(a, b);
    }
}
