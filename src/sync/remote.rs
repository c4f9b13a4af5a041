use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::BackupProfile;
use super::envelope::SyncData;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Remote document not found: {0}")]
    NotFound(String),
    #[error("Rate limited by the remote service")]
    RateLimited,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("No credentials for profile {0}")]
    MissingCredentials(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::InvalidPayload(e.to_string())
    }
}

/// Account the remote credentials belong to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// The single remote document a backup profile points at.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// `None` means nothing has been pushed yet.
    async fn read(&self) -> Result<Option<SyncData>, RemoteError>;

    async fn write(&self, data: &SyncData) -> Result<(), RemoteError>;

    /// `None` when the credentials are not accepted.
    async fn get_user_identity(&self) -> Result<Option<UserIdentity>, RemoteError>;
}

/// Hands out the remote for a backup profile.
pub trait RemoteProvider: Send + Sync {
    fn remote_for(&self, profile: &BackupProfile) -> Result<Arc<dyn RemoteStorage>, RemoteError>;
}

/// In-process remote. Clones share the same document.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    document: Arc<Mutex<Option<SyncData>>>,
    identity: Option<UserIdentity>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, display_name: &str) -> Self {
        self.identity = Some(UserIdentity {
            display_name: display_name.to_string(),
            avatar_url: None,
        });
        self
    }

    /// Current document, if any
    pub fn document(&self) -> Option<SyncData> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_document(&self, data: Option<SyncData>) {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = data;
    }
}

#[async_trait]
impl RemoteStorage for MemoryRemote {
    async fn read(&self) -> Result<Option<SyncData>, RemoteError> {
        Ok(self.document())
    }

    async fn write(&self, data: &SyncData) -> Result<(), RemoteError> {
        self.set_document(Some(data.clone()));
        Ok(())
    }

    async fn get_user_identity(&self) -> Result<Option<UserIdentity>, RemoteError> {
        Ok(self.identity.clone())
    }
}

/// Serves the same in-memory remote for every profile.
impl RemoteProvider for MemoryRemote {
    fn remote_for(&self, _profile: &BackupProfile) -> Result<Arc<dyn RemoteStorage>, RemoteError> {
        Ok(Arc::new(self.clone()))
    }
}
