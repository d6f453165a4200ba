use crate::models::mode::Frame;
use crate::models::status::SessionState;
use std::path::PathBuf;
use thiserror::Error;

/// The external executable could not be started at all. Fatal for the job.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("blender executable not found at {0}")]
    ExecutableNotFound(PathBuf),
    #[error("failed to spawn blender: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("blender did not report a parsable version: {0}")]
    VersionProbe(String),
}

/// A progress line that carried the marker token but no readable frame
/// number. Logged and skipped, never fatal to the drain loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed frame marker in line: {line:?}")]
pub struct ParseWarning {
    pub line: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("operation is not valid while the session is {0:?}")]
    InvalidState(SessionState),
    #[error("invalid frame range: start {start} is past end {end}")]
    InvalidRange { start: Frame, end: Frame },
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Query mode could not recover the project's render metadata.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to run blender in query mode: {0}")]
    Io(#[from] std::io::Error),
    #[error("query output missing required field: {0}")]
    MissingField(&'static str),
    #[error("query output field {field} was not readable: {value:?}")]
    Malformed { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unable to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no config directory available on this platform")]
    NoConfigDir,
}
