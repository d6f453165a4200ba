//! Scans blender's line-oriented stdout for frame boundary markers.
//!
//! Blender prints many lines per frame, each starting with `Fra:<n>`. The
//! parser only cares about the moment the embedded frame number changes:
//! that closes the previous frame's timing window and opens the next one.
//! The same ordered lines and timestamps always reduce to the same ordered
//! frame events.

use crate::models::error::ParseWarning;
use crate::models::event::FrameEvent;
use crate::models::mode::Frame;
use std::time::{Duration, Instant};

/// Token blender prefixes every per-frame log line with.
pub const DEFAULT_MARKER_TOKEN: &str = "Fra:";

#[derive(Debug)]
pub struct ProgressParser {
    token: String,
    /// Samples at or below this are dropped as clock-skew artifacts.
    min_duration: Duration,
    last_seen_frame: Option<Frame>,
    current_frame_start: Instant,
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_TOKEN)
    }
}

impl ProgressParser {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            min_duration: Duration::ZERO,
            last_seen_frame: None,
            current_frame_start: Instant::now(),
        }
    }

    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub fn last_seen_frame(&self) -> Option<Frame> {
        self.last_seen_frame
    }

    /// Feed one output line. Returns a completed-frame event when `line`
    /// carries a frame number different from the one being tracked. A marker
    /// with a non-numeric payload is a warning; the line is otherwise
    /// ignored and parser state is left untouched.
    pub fn parse_line(
        &mut self,
        line: &str,
        now: Instant,
    ) -> Result<Option<FrameEvent>, ParseWarning> {
        let frame = match self.extract_frame(line) {
            None => return Ok(None),
            Some(result) => result?,
        };

        if self.last_seen_frame == Some(frame) {
            // more output for the frame already in progress
            return Ok(None);
        }

        let event = self.close_window(now);
        self.current_frame_start = now;
        self.last_seen_frame = Some(frame);
        Ok(event)
    }

    /// Stream end: the process exiting counts as completion of the frame in
    /// progress. Safe to call when no frame was ever seen.
    pub fn finish(&mut self, now: Instant) -> Option<FrameEvent> {
        let event = self.close_window(now);
        self.last_seen_frame = None;
        event
    }

    fn close_window(&self, now: Instant) -> Option<FrameEvent> {
        let frame = self.last_seen_frame?;
        let duration = now.saturating_duration_since(self.current_frame_start);
        if duration <= self.min_duration {
            log::debug!("dropping frame {frame} sample of {duration:?} as a clock anomaly");
            return None;
        }
        Some(FrameEvent {
            frame,
            completed_at: now,
            duration,
        })
    }

    /// Locate the marker token and read the integer glued to it, tolerating
    /// any surrounding text.
    fn extract_frame(&self, line: &str) -> Option<Result<Frame, ParseWarning>> {
        let start = line.find(&self.token)? + self.token.len();
        let payload = line[start..].split_whitespace().next().unwrap_or("");
        match payload.parse::<Frame>() {
            Ok(frame) => Some(Ok(frame)),
            Err(_) => Some(Err(ParseWarning { line: line.to_owned() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn repeated_markers_emit_one_event_per_frame() {
        let mut parser = ProgressParser::default();
        let t0 = Instant::now();

        assert_eq!(parser.parse_line("Fra:1 Mem:120M | Rendering 1 / 64", t0), Ok(None));
        assert_eq!(parser.parse_line("Fra:1 Mem:122M | Rendering 32 / 64", t0 + secs(1)), Ok(None));

        let first = parser
            .parse_line("Fra:2 Mem:118M | Sce: Scene", t0 + secs(3))
            .unwrap()
            .unwrap();
        assert_eq!(first.frame, 1);
        assert_eq!(first.duration, secs(3));

        let last = parser.finish(t0 + secs(5)).unwrap();
        assert_eq!(last.frame, 2);
        assert_eq!(last.duration, secs(2));

        // flush is final - nothing left to report
        assert_eq!(parser.finish(t0 + secs(6)), None);
    }

    #[test]
    fn malformed_payload_warns_and_leaves_state_alone() {
        let mut parser = ProgressParser::default();
        let t0 = Instant::now();

        parser.parse_line("Fra:7 start", t0).unwrap();
        let warning = parser.parse_line("Fra:abc oops", t0 + secs(1)).unwrap_err();
        assert!(warning.line.contains("Fra:abc"));
        assert_eq!(parser.last_seen_frame(), Some(7));
    }

    #[test]
    fn lines_without_marker_are_ignored() {
        let mut parser = ProgressParser::default();
        let t0 = Instant::now();
        assert_eq!(parser.parse_line("Blender 4.1.0 (hash abc123)", t0), Ok(None));
        assert_eq!(parser.last_seen_frame(), None);
    }

    #[test]
    fn out_of_order_frame_numbers_still_close_the_window() {
        let mut parser = ProgressParser::default();
        let t0 = Instant::now();

        parser.parse_line("Fra:10", t0).unwrap();
        let event = parser.parse_line("Fra:9", t0 + secs(2)).unwrap().unwrap();
        assert_eq!(event.frame, 10);
        assert_eq!(parser.last_seen_frame(), Some(9));
    }

    #[test]
    fn zero_length_window_is_dropped() {
        let mut parser = ProgressParser::default();
        let t0 = Instant::now();

        parser.parse_line("Fra:1", t0).unwrap();
        // same timestamp - the sample is a clock anomaly, not a real frame
        assert_eq!(parser.parse_line("Fra:2", t0), Ok(None));
        assert_eq!(parser.last_seen_frame(), Some(2));
    }

    #[test]
    fn threshold_is_tunable() {
        let mut parser = ProgressParser::default().with_min_duration(secs(1));
        let t0 = Instant::now();

        parser.parse_line("Fra:1", t0).unwrap();
        assert_eq!(parser.parse_line("Fra:2", t0 + Duration::from_millis(500)), Ok(None));
        let event = parser.parse_line("Fra:3", t0 + secs(3)).unwrap().unwrap();
        assert_eq!(event.frame, 2);
    }
}
