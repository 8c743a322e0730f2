//! Error types for the mircast runtime.

use std::fmt;

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the mircast runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// The bridge executable is missing. Fatal to all device operations.
    #[error("bridge tool (adb) not found. Install platform-tools or set MIRCAST_ADB")]
    BridgeUnavailable,

    /// The serial is absent from the bridge's current enumeration.
    #[error("device not found: {serial}")]
    DeviceNotFound { serial: String },

    /// A bridge command exited non-zero. Scoped to one operation.
    #[error("bridge command `{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    /// A network connect did not complete within the bounded wait.
    #[error("connecting to {target} timed out after {timeout_ms}ms")]
    ConnectTimeout { target: String, timeout_ms: u64 },

    /// A session for this device is already starting or running.
    #[error("a mirroring session is already active for device {serial}")]
    AlreadyRunning { serial: String },

    /// The pairing session reached its terminal failure phase. The
    /// caller may retry by starting a new session.
    #[error("wireless pairing failed ({reason}): {detail}")]
    PairingFailed {
        reason: PairingFailure,
        detail: String,
    },

    /// The mirroring engine executable is missing.
    #[error("mirroring engine (scrcpy) not found. Install scrcpy or set MIRCAST_SCRCPY")]
    EngineNotFound,

    /// The mirroring engine could not be started.
    #[error("failed to launch mirroring engine: {0}")]
    LaunchFailed(String),

    /// The engine exited non-zero on its own. Diagnostics carry the last
    /// telemetry error lines.
    #[error("mirroring engine crashed with exit code {code}")]
    ProcessCrashed { code: i32, diagnostics: Vec<String> },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An event channel closed while a producer was still live.
    #[error("event channel closed unexpectedly")]
    ChannelClosed,
}

/// Terminal pairing failure reasons, stable identifiers the UI layer can
/// map to actionable messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingFailure {
    /// The device reported no Wi-Fi address
    NoNetwork,
    /// Switching the device to TCP/IP listening mode failed
    EnableFailed,
    /// All reconnect attempts were exhausted
    ConnectTimeout,
    /// The network device never showed up ready in the registry
    VerifyTimeout,
}

impl PairingFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairingFailure::NoNetwork => "no_network",
            PairingFailure::EnableFailed => "enable_failed",
            PairingFailure::ConnectTimeout => "connect_timeout",
            PairingFailure::VerifyTimeout => "verify_timeout",
        }
    }
}

impl fmt::Display for PairingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Returns the pairing failure reason, if this is a pairing error.
    pub fn pairing_failure(&self) -> Option<PairingFailure> {
        match self {
            Error::PairingFailed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// True for transient, single-operation failures that callers may
    /// retry with their own policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound { .. }
                | Error::CommandFailed { .. }
                | Error::ConnectTimeout { .. }
        )
    }
}
