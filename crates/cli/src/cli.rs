use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use mircast_protocol::Codec;

#[derive(Parser, Debug)]
#[command(name = "mircast")]
#[command(about = "Mircast - Android device discovery and screen mirroring")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to the adb executable (overrides discovery)
    #[arg(long, global = true, value_name = "PATH")]
    pub adb: Option<PathBuf>,

    /// Path to the scrcpy executable (overrides discovery)
    #[arg(long, global = true, value_name = "PATH")]
    pub scrcpy: Option<PathBuf>,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Video codec (clap-compatible enum)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CliCodec {
    #[default]
    H264,
    H265,
}

impl From<CliCodec> for Codec {
    fn from(codec: CliCodec) -> Self {
        match codec {
            CliCodec::H264 => Codec::H264,
            CliCodec::H265 => Codec::H265,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List attached devices
    #[command(alias = "ls")]
    Devices {
        /// Keep polling and stream change events until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Transition a USB device to a wireless connection
    Pair {
        /// Device serial (defaults to the only ready USB device)
        serial: Option<String>,
        /// TCP port for the device's bridge daemon
        #[arg(short, long, default_value = "5555")]
        port: u16,
    },

    /// Tear down a wireless connection
    Disconnect {
        /// Device serial, `ip:port` (defaults to the only wireless device)
        serial: Option<String>,
    },

    /// Show the launch settings the recommendation engine would pick
    #[command(alias = "rec")]
    Recommend {
        /// Device serial (defaults to the only ready device)
        serial: Option<String>,
    },

    /// Launch a mirroring session
    Mirror {
        /// Device serial (defaults to the only ready device)
        serial: Option<String>,

        /// Derive settings from device capabilities and host memory
        #[arg(short, long)]
        auto: bool,

        /// Long-edge resolution cap in pixels, or "native"
        #[arg(short = 'm', long, value_name = "PIXELS")]
        max_size: Option<String>,

        /// Frame rate ceiling
        #[arg(long)]
        fps: Option<u32>,

        /// Video bitrate in Mbps
        #[arg(short, long)]
        bitrate: Option<u32>,

        /// Video codec
        #[arg(long, value_enum)]
        codec: Option<CliCodec>,

        /// Blank the device screen while mirroring
        #[arg(long)]
        turn_screen_off: bool,

        /// Render the mirror window without borders
        #[arg(long)]
        borderless: bool,
    },
}
