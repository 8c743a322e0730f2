//! Data model for the mircast device session manager.
//!
//! This crate contains the serde-serializable types shared between the
//! runtime and the user-facing surface: devices as enumerated by the
//! bridge tool, mirroring configurations, telemetry events derived from
//! the engine's output, and the pure recommendation policy.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No I/O, no process handles, no channels
//! - **Stable**: Changes only when the model itself changes
//!
//! The recommendation engine lives here too because it is a pure,
//! deterministic function over host and device capability data. All
//! process and transport behavior is built on top in `mircast-runtime`.

pub mod config;
pub mod device;
pub mod recommend;
pub mod telemetry;

pub use config::*;
pub use device::*;
pub use recommend::*;
pub use telemetry::*;
