//! Handle to a blender installation on this machine.
//!
//! Blender is an opaque executable here: we hand it CLI flags, it hands us
//! line-oriented text. This module owns both directions - building the
//! argument vector for a batch render and scraping the query-mode output
//! that describes what a project file has configured.

use crate::models::args::Args;
use crate::models::error::{ExtractionError, LaunchError};
use crate::models::mode::Frame;
use crate::models::project_info::ProjectInfo;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use uuid::Uuid;

/// Python expression handed to `--python-expr` in query mode. Prints one
/// labelled line per field we need to read back.
const QUERY_EXPR: &str = r#"
import bpy
scene = bpy.context.scene
render = scene.render
image = render.image_settings
print(f"Frame Range: {scene.frame_start} - {scene.frame_end}")
print(f"Output Path: {render.filepath}")
print(f"Image Format: {image.file_format}")
print(f"Compression: {image.compression}")
print(f"Codec: {getattr(image, 'exr_codec', 'NONE')}")
print(f"Color Depth: {image.color_depth}")
"#;

/// Blender structure to hold path to executable and version of blender installed.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Blender {
    /// Path to blender executable on the system.
    executable: PathBuf,
    /// Version of blender installed on the system.
    version: Version,
}

/// One spawned external render process with both streams captured. Owned
/// exclusively by the render session; dropped once the job reaches a
/// terminal state.
#[derive(Debug)]
pub struct RunningJob {
    pub id: Uuid,
    pub pid: u32,
    pub child: Child,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl Blender {
    /// Create a new blender struct with provided path and version. Note this is not checked and enforced!
    pub fn new(executable: PathBuf, version: Version) -> Self {
        Blender { executable, version }
    }

    /// Create a blender struct from an executable path, fetching the version
    /// by invoking `-v`.
    pub async fn from_executable(executable: impl AsRef<Path>) -> Result<Self, LaunchError> {
        let executable = executable.as_ref().to_path_buf();
        let output = Command::new(&executable)
            .arg("-v")
            .output()
            .await
            .map_err(|e| Self::map_spawn_error(e, &executable))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = Self::parse_version_line(&stdout)?;
        Ok(Blender { executable, version })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Spawn one headless batch render. The caller gets the process handle
    /// plus both captured streams; nothing here blocks on the render itself.
    /// Frame-range validity is the session's responsibility.
    pub fn render(&self, args: &Args) -> Result<RunningJob, LaunchError> {
        let arg_list = args.create_arg_list();
        log::info!("launching {} {}", self.executable.display(), arg_list.join(" "));

        let mut child = Command::new(&self.executable)
            .args(&arg_list)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &self.executable))?;

        let pid = child
            .id()
            .ok_or_else(|| LaunchError::Spawn(std::io::Error::other("process exited before its pid could be read")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::Spawn(std::io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LaunchError::Spawn(std::io::Error::other("stderr was not captured")))?;

        Ok(RunningJob {
            id: Uuid::new_v4(),
            pid,
            child,
            stdout,
            stderr,
        })
    }

    /// Run blender in query mode against `project` and read back the frame
    /// range and output settings saved in the file.
    pub async fn peek(&self, project: impl AsRef<Path>) -> Result<ProjectInfo, ExtractionError> {
        let output = Command::new(&self.executable)
            .arg("-b")
            .arg(project.as_ref())
            .arg("--python-expr")
            .arg(QUERY_EXPR)
            .output()
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        scrape_project_info(&stdout)
    }

    fn map_spawn_error(error: std::io::Error, executable: &Path) -> LaunchError {
        match error.kind() {
            ErrorKind::NotFound => LaunchError::ExecutableNotFound(executable.to_path_buf()),
            _ => LaunchError::Spawn(error),
        }
    }

    /// The `-v` banner opens with a line like `Blender 4.1.0`.
    fn parse_version_line(stdout: &str) -> Result<Version, LaunchError> {
        let first = stdout.lines().next().unwrap_or_default().trim();
        first
            .strip_prefix("Blender ")
            .and_then(|rest| Version::parse(rest.split_whitespace().next()?).ok())
            .ok_or_else(|| LaunchError::VersionProbe(first.to_owned()))
    }
}

impl PartialEq for Blender {
    fn eq(&self, other: &Self) -> bool {
        self.version.eq(&other.version)
    }
}

/// Pull the labelled query-mode lines out of blender's chatter. Every field
/// is required - a missing line means the probe script did not run or the
/// scene is unreadable.
fn scrape_project_info(stdout: &str) -> Result<ProjectInfo, ExtractionError> {
    let range = Regex::new(r"Frame Range:\s*(-?\d+)\s*-\s*(-?\d+)").ok();
    let (start_frame, end_frame) = range
        .as_ref()
        .and_then(|re| re.captures(stdout))
        .and_then(|caps| {
            let start: Frame = caps[1].parse().ok()?;
            let end: Frame = caps[2].parse().ok()?;
            Some((start, end))
        })
        .ok_or(ExtractionError::MissingField("Frame Range"))?;

    let output_path = labelled_value(stdout, "Output Path")?;
    let path = Path::new(&output_path);
    let output_directory = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let output_filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let compression_raw = labelled_value(stdout, "Compression")?;
    let compression = compression_raw
        .parse::<u8>()
        .map_err(|_| ExtractionError::Malformed {
            field: "Compression",
            value: compression_raw,
        })?;

    Ok(ProjectInfo {
        start_frame,
        end_frame,
        output_directory,
        output_filename,
        image_format: labelled_value(stdout, "Image Format")?,
        compression,
        compression_codec: labelled_value(stdout, "Codec")?,
        color_depth: labelled_value(stdout, "Color Depth")?,
    })
}

fn labelled_value(stdout: &str, label: &'static str) -> Result<String, ExtractionError> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(label).and_then(|rest| rest.strip_prefix(':')))
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(ExtractionError::MissingField(label))
}
