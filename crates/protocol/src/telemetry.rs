//! Structured events derived from the engine's live output.

use serde::{Deserialize, Serialize};

/// One classified line (or synthesized sample) from a session's output
/// stream. Ephemeral: published to subscribers, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Milliseconds since the Unix epoch at classification time
    pub wall_time: i64,
    #[serde(flatten)]
    pub kind: TelemetryKind,
}

/// Event classification, in the order patterns are tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryKind {
    /// Rendered frame rate, reported by the engine or derived from a
    /// rolling window
    FpsSample { fps: f64 },
    /// Frames skipped or dropped by the pipeline
    FrameDrop { dropped: u32 },
    /// Fatal or error-level engine output
    Error { message: String },
    /// Anything unrecognized; the stream never halts on these
    Info { message: String },
}

impl TelemetryEvent {
    /// Wraps a kind with the current wall-clock timestamp.
    pub fn now(kind: TelemetryKind) -> Self {
        let wall_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self { wall_time, kind }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, TelemetryKind::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_flat_kind_tag() {
        let event = TelemetryEvent {
            wall_time: 1700000000000,
            kind: TelemetryKind::FpsSample { fps: 59.8 },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "fps_sample");
        assert_eq!(json["fps"], 59.8);
    }
}
