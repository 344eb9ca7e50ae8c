use directories::ProjectDirs;
use ink_model::Preferences;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const PREFS_SCHEMA_VERSION: u32 = 1;
const PREFS_FILE_NAME: &str = "preferences.json";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unable to resolve the configuration directory")]
    NoConfigDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("preferences schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("invalid preferences: {0}")]
    Invalid(#[from] ink_model::ModelError),
}

/// Location of the preferences file.
#[derive(Debug, Clone)]
pub struct Settings {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreferencesEnvelope {
    version: u32,
    preferences: Preferences,
}

impl Settings {
    pub fn from_default_project() -> Result<Self, SettingsError> {
        let dirs = ProjectDirs::from("dev", "PaperInk", "PaperInk")
            .ok_or(SettingsError::NoConfigDirectory)?;

        Ok(Self::in_dir(dirs.config_dir()))
    }

    /// `preferences.json` inside `root`
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        Self { path: root.as_ref().join(PREFS_FILE_NAME) }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing files yield defaults. Stored values are validated so a hand
    /// edited file cannot start a session with a zero-width pen or a
    /// negative export scale.
    pub fn load_preferences(&self) -> Result<Preferences, SettingsError> {
        if !self.path.exists() {
            log::debug!("no preferences at {}, using defaults", self.path.display());
            return Ok(Preferences::default());
        }

        let bytes = fs::read(&self.path)?;
        let envelope: PreferencesEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > PREFS_SCHEMA_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: envelope.version,
                supported: PREFS_SCHEMA_VERSION,
            });
        }

        envelope.preferences.validate()?;
        Ok(envelope.preferences)
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let envelope =
            PreferencesEnvelope { version: PREFS_SCHEMA_VERSION, preferences: *preferences };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(&self.path, bytes)?;
        log::debug!("saved preferences to {}", self.path.display());
        Ok(())
    }
}
