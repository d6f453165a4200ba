use crate::models::{format::Format, mode::Mode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the rendered image sequence should land when the user overrides
/// whatever the project file has configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOverride {
    pub directory: PathBuf,
    /// File name pattern; `#` runs are substituted with the zero-padded
    /// frame number, no `#` appends four of them.
    pub file_name: String,
}

impl OutputOverride {
    pub fn new(directory: impl AsRef<Path>, file_name: impl Into<String>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            file_name: file_name.into(),
        }
    }

    fn to_arg(&self) -> String {
        self.directory.join(&self.file_name).to_string_lossy().into_owned()
    }
}

// ref: https://docs.blender.org/manual/en/latest/advanced/command_line/render.html
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Args {
    file: PathBuf,                      // required
    mode: Mode,                         // required
    pub output: Option<OutputOverride>, // optional - project default when absent
    pub format: Option<Format>,         // optional - project default when absent
}

impl Args {
    pub fn new(file: impl AsRef<Path>, mode: Mode) -> Self {
        Args {
            file: file.as_ref().to_path_buf(),
            mode,
            output: None,
            format: None,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn create_arg_list(&self) -> Vec<String> {
        // More context: https://docs.blender.org/manual/en/latest/advanced/command_line/arguments.html#argument-order
        let mut col = vec!["-b".to_owned(), self.file.to_string_lossy().into_owned()];

        if let Some(format) = &self.format {
            col.push("-F".to_owned());
            col.push(format.to_string());
            col.push("-x".to_owned()); // use the extension matching -F
            col.push("1".to_owned());
        }
        if let Some(output) = &self.output {
            col.push("-o".to_owned());
            col.push(output.to_arg());
        }

        // frame arguments must come after everything else
        let mut additional_args = match self.mode {
            Mode::Frame(frame) => {
                vec!["-f".to_owned(), frame.to_string()]
            }
            // Render the range as an animation so the whole sequence lands on disk.
            Mode::Animation { start, end } => vec![
                "-s".to_owned(),
                start.to_string(),
                "-e".to_owned(),
                end.to_string(),
                "-a".to_owned(),
            ],
        };
        col.append(&mut additional_args);
        col
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animation_args_keep_range_flags_last() {
        let mut args = Args::new("/tmp/scene.blend", Mode::Animation { start: 1, end: 10 });
        args.format = Some(Format::OpenExrMultilayer);
        args.output = Some(OutputOverride::new("/tmp/out", "render_####"));

        let list = args.create_arg_list();
        assert_eq!(
            list,
            vec![
                "-b",
                "/tmp/scene.blend",
                "-F",
                "OPEN_EXR_MULTILAYER",
                "-x",
                "1",
                "-o",
                "/tmp/out/render_####",
                "-s",
                "1",
                "-e",
                "10",
                "-a",
            ]
        );
    }

    #[test]
    fn single_frame_args_skip_overrides_when_unset() {
        let args = Args::new("/tmp/scene.blend", Mode::Frame(42));
        assert_eq!(args.create_arg_list(), vec!["-b", "/tmp/scene.blend", "-f", "42"]);
    }
}
