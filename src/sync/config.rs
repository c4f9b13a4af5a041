use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::lock::LockConfig;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

pub const DEFAULT_FILE_NAME: &str = "bookmarks.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to write settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Data directory not found")]
    DataDirNotFound,
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),
    #[error("A profile named '{0}' already exists")]
    DuplicateProfile(String),
}

/// Default data directory for settings, credentials and local state
pub fn default_data_dir() -> Result<PathBuf, SettingsError> {
    dirs::data_local_dir()
        .map(|p| p.join("marksync"))
        .ok_or(SettingsError::DataDirNotFound)
}

/// One backup target: a Gist file, optionally tied to a single local folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProfile {
    pub id: Uuid,
    pub name: String,
    pub gist_id: String,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Folder path such as "Bookmarks Bar/Work". Absent means the whole tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_folder: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_push: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pull: Option<DateTime<Utc>>,
}

fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_string()
}

fn default_true() -> bool {
    true
}

impl BackupProfile {
    pub fn new(name: impl Into<String>, gist_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            gist_id: gist_id.into(),
            file_name: default_file_name(),
            local_folder: None,
            enabled: true,
            last_push: None,
            last_pull: None,
        }
    }

    pub fn with_local_folder(mut self, folder: impl Into<String>) -> Self {
        self.local_folder = Some(folder.into());
        self
    }

    pub fn is_folder_scoped(&self) -> bool {
        self.local_folder.as_deref().is_some_and(|f| !f.trim().is_empty())
    }
}

/// Lock timings as they appear in the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockSettings {
    pub stale_after_secs: u64,
    pub confirm_delay_ms: u64,
    pub retry_backoff_ms: u64,
    /// How long push and pull wait for the lock
    pub acquire_timeout_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: 30,
            confirm_delay_ms: 100,
            retry_backoff_ms: 250,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl LockSettings {
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            stale_after: Duration::from_secs(self.stale_after_secs),
            confirm_delay: Duration::from_millis(self.confirm_delay_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub lock: LockSettings,
    #[serde(default)]
    pub profiles: Vec<BackupProfile>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            lock: LockSettings::default(),
            profiles: Vec::new(),
        }
    }
}

impl SyncSettings {
    pub fn settings_path(data_dir: &Path) -> PathBuf {
        data_dir.join("config.toml")
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Look a profile up by name or id.
    pub fn profile(&self, key: &str) -> Result<&BackupProfile, SettingsError> {
        self.profiles
            .iter()
            .find(|p| p.name == key || p.id.to_string() == key)
            .ok_or_else(|| SettingsError::ProfileNotFound(key.to_string()))
    }

    pub fn profile_mut(&mut self, key: &str) -> Result<&mut BackupProfile, SettingsError> {
        self.profiles
            .iter_mut()
            .find(|p| p.name == key || p.id.to_string() == key)
            .ok_or_else(|| SettingsError::ProfileNotFound(key.to_string()))
    }

    pub fn add_profile(&mut self, profile: BackupProfile) -> Result<(), SettingsError> {
        if self.profiles.iter().any(|p| p.name == profile.name) {
            return Err(SettingsError::DuplicateProfile(profile.name));
        }
        self.profiles.push(profile);
        Ok(())
    }

    pub fn remove_profile(&mut self, key: &str) -> Result<BackupProfile, SettingsError> {
        let position = self
            .profiles
            .iter()
            .position(|p| p.name == key || p.id.to_string() == key)
            .ok_or_else(|| SettingsError::ProfileNotFound(key.to_string()))?;
        Ok(self.profiles.remove(position))
    }

    pub fn enabled_profiles(&self) -> Vec<BackupProfile> {
        self.profiles.iter().filter(|p| p.enabled).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = SyncSettings::load(&temp.path().join("config.toml")).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.lock.lock_config().stale_after, Duration::from_secs(30));
    }

    #[test]
    fn test_settings_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = SyncSettings::settings_path(temp.path());

        let mut settings = SyncSettings::default();
        settings.add_profile(BackupProfile::new("all", "abc123")).unwrap();
        settings
            .add_profile(BackupProfile::new("work", "def456").with_local_folder("Bookmarks Bar/Work"))
            .unwrap();
        settings.profile_mut("work").unwrap().last_push = Some(Utc::now());
        settings.save(&path).unwrap();

        let loaded = SyncSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert!(loaded.profile("work").unwrap().is_folder_scoped());
        assert!(!loaded.profile("all").unwrap().is_folder_scoped());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let data = r#"
            [[profiles]]
            id = "7f1c2a2e-7b3a-4c55-9a57-1a0c1d0f6b11"
            name = "home"
            gistId = "g1"
        "#;
        let settings: SyncSettings = toml::from_str(data).unwrap();
        assert_eq!(settings.api_base_url, DEFAULT_API_BASE_URL);
        let profile = settings.profile("home").unwrap();
        assert_eq!(profile.file_name, DEFAULT_FILE_NAME);
        assert!(profile.enabled);
    }

    #[test]
    fn test_duplicate_and_missing_profiles() {
        let mut settings = SyncSettings::default();
        settings.add_profile(BackupProfile::new("a", "g")).unwrap();
        assert!(matches!(
            settings.add_profile(BackupProfile::new("a", "h")),
            Err(SettingsError::DuplicateProfile(_))
        ));
        assert!(matches!(settings.remove_profile("b"), Err(SettingsError::ProfileNotFound(_))));
        assert_eq!(settings.remove_profile("a").unwrap().gist_id, "g");
    }
}
