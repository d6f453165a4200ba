//! Running per-frame timing history for one render job.
//!
//! Pure accumulation - no clocks of its own beyond the construction instant,
//! no I/O. Every published figure is a value copy; until the first frame
//! completes the mean and the estimate stay unknown rather than zero.

use crate::models::event::{FrameEvent, TimingSnapshot};
use crate::models::mode::Frame;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TimingEstimator {
    started: Instant,
    end_frame: Frame,
    /// Completed frame durations in arrival order, never reordered.
    durations: Vec<Duration>,
    last_completed_frame: Option<Frame>,
    current_frame_start: Instant,
}

impl TimingEstimator {
    pub fn new(end_frame: Frame) -> Self {
        Self::starting_at(end_frame, Instant::now())
    }

    pub fn starting_at(end_frame: Frame, started: Instant) -> Self {
        Self {
            started,
            end_frame,
            durations: Vec::new(),
            last_completed_frame: None,
            current_frame_start: started,
        }
    }

    pub fn frames_recorded(&self) -> usize {
        self.durations.len()
    }

    /// Fold one completed frame into the history and derive fresh figures.
    pub fn record(&mut self, event: FrameEvent) -> TimingSnapshot {
        self.durations.push(event.duration);
        self.last_completed_frame = Some(event.frame);
        self.current_frame_start = event.completed_at;
        self.snapshot_at(event.completed_at)
    }

    /// Time-based fields only - used between frame events so elapsed and
    /// current-frame clocks keep moving.
    pub fn snapshot_now(&self) -> TimingSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> TimingSnapshot {
        let average = self.average_frame_time();
        let remaining = average.map(|mean| {
            let frames_left = self
                .last_completed_frame
                .map(|frame| (self.end_frame - frame).max(0) as u32)
                .unwrap_or(0);
            mean * frames_left
        });

        TimingSnapshot {
            elapsed: now.saturating_duration_since(self.started),
            current_frame_time: now.saturating_duration_since(self.current_frame_start),
            average_frame_time: average,
            estimated_remaining: remaining,
        }
    }

    fn average_frame_time(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let total: Duration = self.durations.iter().sum();
        Some(total / self.durations.len() as u32)
    }
}
