//! Per-project settings file keyed by blend file path.
//!
//! One JSON map in the user's config directory: for every project the scene
//! values read back from the file, the user's last-chosen overrides, and the
//! blend file's modification time as seen when the scene values were cached.
//! A differing mtime means the project changed behind our back and the
//! cached scene values are suspect.

use crate::models::error::SettingsError;
use crate::models::mode::Frame;
use crate::models::project_info::ProjectInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const SETTINGS_DIR: &str = "BlenderLauncher/";
const SETTINGS_FILE_NAME: &str = "ProjectSettings.json";

/// Which value wins for a given field: what the scene has saved, what the
/// user typed, or the application default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingSource {
    Scene,
    User,
    #[default]
    Default,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceToggles {
    pub frame_range: SettingSource,
    pub file_name: SettingSource,
    pub output: SettingSource,
}

/// The user's last-chosen override values for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub output_directory: PathBuf,
    pub output_filename: String,
    pub override_output: bool,
    pub sources: SourceToggles,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Values read from the blend file in query mode, cached.
    pub scene: Option<ProjectInfo>,
    pub user: Option<UserSettings>,
    /// Blend file mtime at the moment `scene` was cached.
    pub last_modified: Option<SystemTime>,
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    entries: HashMap<String, ProjectSettings>,
}

impl SettingsStore {
    /// Load from the user's config directory, starting empty when no file
    /// exists yet.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(Self::default_path()?)
    }

    pub fn load_from(path: PathBuf) -> Result<Self, SettingsError> {
        let entries = match fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    fn default_path() -> Result<PathBuf, SettingsError> {
        let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(dir.join(SETTINGS_DIR).join(SETTINGS_FILE_NAME))
    }

    /// Prior settings for project `P`, if it was ever loaded before.
    pub fn get(&self, project: &Path) -> Option<&ProjectSettings> {
        self.entries.get(&Self::key(project))
    }

    pub fn put(&mut self, project: &Path, settings: ProjectSettings) {
        self.entries.insert(Self::key(project), settings);
    }

    /// Cache fresh scene values along with the blend file's current mtime.
    pub fn record_scene(&mut self, project: &Path, info: ProjectInfo) {
        let entry = self.entries.entry(Self::key(project)).or_default();
        entry.scene = Some(info);
        entry.last_modified = blend_last_modified(project);
    }

    pub fn update_user(&mut self, project: &Path, user: UserSettings) {
        let entry = self.entries.entry(Self::key(project)).or_default();
        entry.user = Some(user);
    }

    /// True when the blend file on disk no longer matches the mtime we
    /// cached the scene values under.
    pub fn has_changed(&self, project: &Path) -> bool {
        match self.get(project).and_then(|entry| entry.last_modified) {
            None => true,
            Some(cached) => blend_last_modified(project) != Some(cached),
        }
    }

    fn key(project: &Path) -> String {
        project.to_string_lossy().into_owned()
    }
}

fn blend_last_modified(project: &Path) -> Option<SystemTime> {
    fs::metadata(project).and_then(|meta| meta.modified()).ok()
}
