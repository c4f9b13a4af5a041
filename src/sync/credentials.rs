//! GitHub tokens, kept next to (not inside) the settings file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Overrides any stored token when set
pub const TOKEN_ENV_VAR: &str = "MARKSYNC_GITHUB_TOKEN";

const SERVICE: &str = "marksync";

#[derive(Debug, Clone)]
pub struct CredentialStore {
    data_dir: PathBuf,
}

impl CredentialStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Path to file-based credential store
    fn credentials_file_path(&self, profile_id: Uuid) -> PathBuf {
        self.data_dir.join(".credentials").join(SERVICE).join(profile_id.to_string())
    }

    /// Token for a profile: environment first, then the stored file
    pub fn token(&self, profile_id: Uuid) -> Option<String> {
        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            if !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
        self.stored_token(profile_id)
    }

    pub fn stored_token(&self, profile_id: Uuid) -> Option<String> {
        let data = std::fs::read_to_string(self.credentials_file_path(profile_id)).ok()?;
        let token = data.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    pub fn store_token(&self, profile_id: Uuid, token: &str) -> std::io::Result<()> {
        let file_path = self.credentials_file_path(profile_id);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = open_private(&file_path)?;
        file.write_all(token.trim().as_bytes())?;
        Ok(())
    }

    pub fn delete_token(&self, profile_id: Uuid) {
        let _ = std::fs::remove_file(self.credentials_file_path(profile_id));
    }
}

/// Open for writing, created owner-only from the start. An existing file
/// is narrowed to 0600 as well.
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}
