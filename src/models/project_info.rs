use crate::models::mode::Frame;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Render configuration read back from a blend file by running blender in
/// query mode. Everything here is what the scene has saved, before any user
/// override is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub output_directory: PathBuf,
    pub output_filename: String,
    /// Blender's spelling of the configured format, e.g. "OPEN_EXR_MULTILAYER".
    pub image_format: String,
    /// PNG/EXR compression level in percent.
    pub compression: u8,
    /// Codec within the container, e.g. "ZIP" for EXR.
    pub compression_codec: String,
    /// Bits per channel as blender reports it, e.g. "16".
    pub color_depth: String,
}

impl ProjectInfo {
    pub fn total_frames(&self) -> u32 {
        (self.end_frame - self.start_frame + 1).max(0) as u32
    }
}
