use serde::{Deserialize, Serialize};

pub type Frame = i32;

// context for serde: https://serde.rs/enum-representations.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    // JSON: "Frame": "i32",
    Frame(Frame),

    // JSON: "Animation": {"start":"i32", "end":"i32"}
    Animation { start: Frame, end: Frame },
}

impl Mode {
    /// Number of frames this mode will produce as an image sequence.
    pub fn total_frames(&self) -> u32 {
        match self {
            Mode::Frame(_) => 1,
            Mode::Animation { start, end } => (end - start + 1).max(0) as u32,
        }
    }

    /// Last frame index of the range.
    pub fn end_frame(&self) -> Frame {
        match self {
            Mode::Frame(f) => *f,
            Mode::Animation { end, .. } => *end,
        }
    }

    pub fn start_frame(&self) -> Frame {
        match self {
            Mode::Frame(f) => *f,
            Mode::Animation { start, .. } => *start,
        }
    }
}
