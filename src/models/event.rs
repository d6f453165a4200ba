use crate::models::mode::Frame;
use crate::models::status::SessionState;
use std::time::{Duration, Instant};

/// One parsed observation that a frame finished rendering. Ephemeral -
/// produced by the progress parser, consumed by the timing estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameEvent {
    pub frame: Frame,
    pub completed_at: Instant,
    /// Wall-clock delta from the moment this frame's first marker line was seen.
    pub duration: Duration,
}

/// Immutable value copy of the estimator's derived figures. Republished on
/// every frame event and on the periodic tick; never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingSnapshot {
    /// Time since the job started.
    pub elapsed: Duration,
    /// How long the frame currently in progress has been going.
    pub current_frame_time: Duration,
    /// Arithmetic mean of all completed frame durations. None until the
    /// first frame completes - unknown, not zero.
    pub average_frame_time: Option<Duration>,
    /// mean * frames left. None whenever the mean is unknown.
    pub estimated_remaining: Option<Duration>,
}

/// Push update published to session observers. At least one per frame event,
/// plus one on every state transition.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress {
        frame: Frame,
        total: u32,
        rendered: u32,
    },
    Timing(TimingSnapshot),
    StateChanged(SessionState),
}
