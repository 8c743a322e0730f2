//! Mircast Runtime - Device discovery, pairing, and session supervision
//!
//! This crate provides the runtime infrastructure between the launcher
//! and the two external executables it drives:
//!
//! - **Bridge client**: Typed wrapper around the `adb` debug bridge
//! - **Device registry**: Polled view of attached devices with debounced
//!   removal and ordered change events
//! - **Pairing**: The USB to wireless transition as an observable state
//!   machine
//! - **Supervisor**: Mirroring engine process lifecycle, one session per
//!   device
//! - **Telemetry**: Classification of the engine's live output stream
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  mircast-cli │  Commands (devices, pair, recommend, mirror)
//! └──────┬───────┘
//!        │
//! ┌──────▼───────────┐
//! │ mircast-runtime  │  This crate
//! │  ┌────────────┐  │
//! │  │ Registry   │  │  Poll loop, debounce, events
//! │  │ Pairing    │  │  USB -> TCP/IP state machine
//! │  └─────┬──────┘  │
//! │  ┌─────▼──────┐  │
//! │  │ Bridge     │  │  adb subprocess wrapper
//! │  └────────────┘  │
//! │  ┌────────────┐  │
//! │  │ Supervisor │  │  scrcpy process + telemetry
//! │  └────────────┘  │
//! └──────────────────┘
//! ```
//!
//! # Decoupling via the Bridge trait
//!
//! The registry and pairing machine talk to the debug bridge through the
//! [`bridge::Bridge`] trait rather than the concrete subprocess client,
//! so tests can drive them with an in-process fake and no attached
//! hardware.

pub mod bridge;
pub mod engine;
pub mod error;
pub mod pairing;
pub mod registry;
pub mod supervisor;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export key types at crate root
pub use bridge::{Bridge, BridgeClient, find_bridge_executable};
pub use engine::find_engine_executable;
pub use error::{Error, PairingFailure, Result};
pub use pairing::{PairingConfig, PairingPhase, PairingSession, PairingUpdate};
pub use registry::{DeviceRegistry, RegistryConfig, RegistryEvent};
pub use supervisor::{Session, SessionStatus, Supervisor, SupervisorConfig, build_args};
pub use telemetry::TelemetryParser;
