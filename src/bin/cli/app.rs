use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use marksync_lib::bookmarks::FileTreeStore;
use marksync_lib::sync::config::default_data_dir;
use marksync_lib::sync::{
    BackupProfile, CredentialStore, GistProvider, JsonFileStore, SyncLock, SyncManager, SyncSettings,
};

/// Shared application state for CLI commands
pub struct App {
    pub data_dir: PathBuf,
    pub settings: SyncSettings,
    pub credentials: CredentialStore,
    /// Re-read on every access, so only the lock holder's view counts
    pub store: Arc<FileTreeStore>,
}

impl App {
    /// Initialize from the default data directory
    pub fn new(bookmarks: Option<PathBuf>) -> Result<Self> {
        let data_dir = default_data_dir().context("Failed to get data directory")?;
        let settings = SyncSettings::load(&SyncSettings::settings_path(&data_dir))
            .context("Failed to load settings")?;

        let bookmarks_path = bookmarks.unwrap_or_else(|| data_dir.join("bookmarks.json"));

        Ok(Self {
            credentials: CredentialStore::new(&data_dir),
            data_dir,
            settings,
            store: Arc::new(FileTreeStore::new(bookmarks_path)),
        })
    }

    pub fn save_settings(&self) -> Result<()> {
        self.settings
            .save(&SyncSettings::settings_path(&self.data_dir))
            .context("Failed to save settings")
    }

    /// Manager over the local file store, with the lock kept in `state.json`
    /// so separate invocations see each other.
    pub fn manager(&self) -> SyncManager {
        let state = Arc::new(JsonFileStore::new(self.data_dir.join("state.json")));
        let lock = SyncLock::new(state, self.settings.lock.lock_config());
        let provider = GistProvider::new(self.settings.api_base_url.clone(), self.credentials.clone());
        SyncManager::new(self.store.clone(), lock, Arc::new(provider))
            .with_lock_timeout(self.settings.lock.acquire_timeout())
    }

    pub fn profile(&self, name: &str) -> Result<BackupProfile> {
        Ok(self.settings.profile(name)?.clone())
    }

    /// Profiles selected by `--profile` or `--all`
    pub fn select_profiles(&self, profile: Option<&str>, all: bool) -> Result<Vec<BackupProfile>> {
        match (profile, all) {
            (Some(name), _) => Ok(vec![self.profile(name)?]),
            (None, true) => {
                let profiles = self.settings.enabled_profiles();
                if profiles.is_empty() {
                    bail!("No enabled profiles. Add one with `marksync-cli profile add`.");
                }
                Ok(profiles)
            }
            (None, false) => match self.settings.profiles.as_slice() {
                [only] => Ok(vec![only.clone()]),
                [] => bail!("No profiles configured. Add one with `marksync-cli profile add`."),
                _ => bail!("Several profiles configured. Pass --profile <name> or --all."),
            },
        }
    }
}
