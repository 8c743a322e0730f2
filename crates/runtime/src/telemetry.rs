//! Line classification for the mirroring engine's output stream.
//!
//! Parsing is best-effort: an unrecognized line becomes an `Info` event
//! and never halts the stream. Patterns are tried in a fixed order
//! (fps report, dropped-frame warning, error marker) and the first
//! match wins.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use mircast_protocol::{TelemetryEvent, TelemetryKind};
use regex::Regex;

static FPS_LABELED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfps[:=\s]\s*([0-9]+(?:\.[0-9]+)?)").unwrap());
static FPS_TRAILING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+(?:\.[0-9]+)?)\s*fps\b").unwrap());
static FRAME_DROP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:([0-9]+)\s+)?frames?\s+(?:skipped|dropped|lost)|skipping\s+frames?")
        .unwrap()
});
static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*\[?(?:error|fatal)\]?[:\s]|exception").unwrap());
static FRAME_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bframe\s*#?[0-9]+\b|\bnew frame\b").unwrap());

/// Stateless line classifier plus a rolling window that synthesizes
/// fps samples from per-frame markers when the engine does not report
/// its frame rate directly.
pub struct TelemetryParser {
    window: Duration,
    frames_in_window: u32,
    window_started: Option<Instant>,
}

impl Default for TelemetryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryParser {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(2))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            frames_in_window: 0,
            window_started: None,
        }
    }

    /// Classifies one line. Usually one event; a frame-marker line that
    /// completes the sampling window yields a synthesized fps sample as
    /// well. Blank lines yield nothing.
    pub fn parse_line(&mut self, line: &str, now: Instant) -> Vec<TelemetryEvent> {
        let line = line.trim_end();
        if line.trim().is_empty() {
            return Vec::new();
        }

        if let Some(fps) = extract_fps(line) {
            return vec![TelemetryEvent::now(TelemetryKind::FpsSample { fps })];
        }

        if let Some(caps) = FRAME_DROP_RE.captures(line) {
            let dropped = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            return vec![TelemetryEvent::now(TelemetryKind::FrameDrop { dropped })];
        }

        if ERROR_RE.is_match(line) {
            return vec![TelemetryEvent::now(TelemetryKind::Error {
                message: line.to_owned(),
            })];
        }

        let mut events = Vec::with_capacity(2);
        if FRAME_MARKER_RE.is_match(line) {
            if let Some(fps) = self.count_frame(now) {
                events.push(TelemetryEvent::now(TelemetryKind::FpsSample { fps }));
            }
        }
        events.push(TelemetryEvent::now(TelemetryKind::Info {
            message: line.to_owned(),
        }));
        events
    }

    /// Counts one rendered frame; returns a derived fps value when the
    /// sampling window has elapsed.
    fn count_frame(&mut self, now: Instant) -> Option<f64> {
        match self.window_started {
            None => {
                self.window_started = Some(now);
                self.frames_in_window = 1;
                None
            }
            Some(started) => {
                self.frames_in_window += 1;
                let elapsed = now.duration_since(started);
                if elapsed >= self.window {
                    let fps = f64::from(self.frames_in_window) / elapsed.as_secs_f64();
                    self.window_started = Some(now);
                    self.frames_in_window = 0;
                    Some(fps)
                } else {
                    None
                }
            }
        }
    }
}

fn extract_fps(line: &str) -> Option<f64> {
    FPS_LABELED_RE
        .captures(line)
        .or_else(|| FPS_TRAILING_RE.captures(line))
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(parser: &mut TelemetryParser, line: &str) -> Vec<TelemetryKind> {
        parser
            .parse_line(line, Instant::now())
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn labeled_fps_line_is_one_sample() {
        let mut parser = TelemetryParser::new();
        assert_eq!(
            kinds(&mut parser, "fps: 59.8"),
            vec![TelemetryKind::FpsSample { fps: 59.8 }]
        );
    }

    #[test]
    fn engine_fps_report_is_a_sample_even_with_skip_suffix() {
        // The engine's --print-fps line carries both figures; the fps
        // pattern is tried first.
        let mut parser = TelemetryParser::new();
        assert_eq!(
            kinds(&mut parser, "INFO: 59 fps (+12 frames skipped)"),
            vec![TelemetryKind::FpsSample { fps: 59.0 }]
        );
    }

    #[test]
    fn skipped_frames_become_frame_drop() {
        let mut parser = TelemetryParser::new();
        assert_eq!(
            kinds(&mut parser, "WARN: 3 frames skipped"),
            vec![TelemetryKind::FrameDrop { dropped: 3 }]
        );
        assert_eq!(
            kinds(&mut parser, "skipping frame due to late decode"),
            vec![TelemetryKind::FrameDrop { dropped: 1 }]
        );
    }

    #[test]
    fn error_markers_become_error_events() {
        let mut parser = TelemetryParser::new();
        assert_eq!(
            kinds(&mut parser, "ERROR: Could not open video stream"),
            vec![TelemetryKind::Error {
                message: "ERROR: Could not open video stream".into()
            }]
        );
        assert!(matches!(
            kinds(&mut parser, "[FATAL] device disconnected")[0],
            TelemetryKind::Error { .. }
        ));
    }

    #[test]
    fn unrecognized_line_is_info_and_never_halts() {
        let mut parser = TelemetryParser::new();
        assert_eq!(
            kinds(&mut parser, "Device: Pixel 7"),
            vec![TelemetryKind::Info {
                message: "Device: Pixel 7".into()
            }]
        );
        // The stream keeps going afterwards.
        assert_eq!(
            kinds(&mut parser, "fps: 60"),
            vec![TelemetryKind::FpsSample { fps: 60.0 }]
        );
    }

    #[test]
    fn blank_lines_yield_nothing() {
        let mut parser = TelemetryParser::new();
        assert!(parser.parse_line("   ", Instant::now()).is_empty());
    }

    #[test]
    fn frame_markers_synthesize_fps_after_window() {
        let mut parser = TelemetryParser::with_window(Duration::from_secs(1));
        let start = Instant::now();

        // 30 markers spread over exactly one second, then one past it.
        for i in 0..30 {
            let events = parser.parse_line(
                "frame #1 rendered",
                start + Duration::from_millis(i * 33),
            );
            assert_eq!(events.len(), 1, "no sample inside the window");
        }
        let events = parser.parse_line("frame #31 rendered", start + Duration::from_millis(1100));
        assert_eq!(events.len(), 2);
        match events[0].kind {
            TelemetryKind::FpsSample { fps } => {
                assert!((20.0..40.0).contains(&fps), "derived fps {fps} out of band");
            }
            ref other => panic!("expected synthesized fps sample, got {other:?}"),
        }
    }
}
