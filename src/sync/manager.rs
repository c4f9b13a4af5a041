use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::bookmarks::{
    count_bookmarks, find_folder, parse_folder_path, BookmarkNode, BookmarkTreeStore, TreeStoreError,
};

use super::config::BackupProfile;
use super::diff::{calculate_diff, DiffOptions, DiffResult};
use super::envelope::SyncData;
use super::lock::{LockError, LockStatus, SyncLock};
use super::remote::{RemoteError, RemoteProvider, RemoteStorage, UserIdentity};
use super::writer::{desired_top_level, IncrementalWriter, WriteError, WriteScope};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Bookmark store error: {0}")]
    Store(#[from] TreeStoreError),
    #[error("Lock error: {0}")]
    Lock(LockError),
    #[error("No backup data on the remote yet")]
    NoData,
    #[error("Local folder not found: {0}")]
    LocalPathNotFound(String),
    #[error("Another sync is in progress ({0})")]
    SyncInProgress(String),
    #[error("Applied {applied} changes, {} operations failed", .errors.len())]
    PartialFailure { applied: usize, errors: Vec<WriteError> },
}

impl From<LockError> for SyncError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Busy { operation } => SyncError::SyncInProgress(operation),
            other => SyncError::Lock(other),
        }
    }
}

/// Error classes shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Network,
    Auth,
    NotFound,
    RateLimit,
    NoData,
    PermissionDenied,
    LocalPathNotFound,
    SyncInProgress,
    PartialFailure,
    Unknown,
}

impl ErrorCategory {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "Could not reach GitHub. Check your connection and try again.",
            ErrorCategory::Auth => "Authentication failed. Check the GitHub token for this backup.",
            ErrorCategory::NotFound => "The backup Gist was not found.",
            ErrorCategory::RateLimit => "GitHub rate limit reached. Try again later.",
            ErrorCategory::NoData => "The backup is empty. Push once to create it.",
            ErrorCategory::PermissionDenied => "The token is not allowed to access this Gist (it needs the gist scope).",
            ErrorCategory::LocalPathNotFound => "The configured local folder no longer exists.",
            ErrorCategory::SyncInProgress => {
                "Another sync is already in progress. Wait for it to finish or release the lock."
            }
            ErrorCategory::PartialFailure => "Some changes could not be applied to the local bookmarks.",
            ErrorCategory::Unknown => "Sync failed.",
        }
    }
}

impl SyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Remote(e) => match e {
                RemoteError::Network(_) => ErrorCategory::Network,
                RemoteError::Server { status, .. } if *status >= 500 => ErrorCategory::Network,
                RemoteError::AuthFailed | RemoteError::MissingCredentials(_) => ErrorCategory::Auth,
                RemoteError::NotFound(_) => ErrorCategory::NotFound,
                RemoteError::RateLimited => ErrorCategory::RateLimit,
                RemoteError::PermissionDenied(_) => ErrorCategory::PermissionDenied,
                RemoteError::Server { .. } | RemoteError::InvalidPayload(_) => ErrorCategory::Unknown,
            },
            SyncError::NoData => ErrorCategory::NoData,
            SyncError::LocalPathNotFound(_) => ErrorCategory::LocalPathNotFound,
            SyncError::SyncInProgress(_) => ErrorCategory::SyncInProgress,
            SyncError::PartialFailure { .. } => ErrorCategory::PartialFailure,
            SyncError::Store(_) | SyncError::Lock(_) => ErrorCategory::Unknown,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.category().user_message()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Push => write!(f, "push"),
            SyncDirection::Pull => write!(f, "pull"),
        }
    }
}

/// Outcome of one successful push or pull
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub profile: String,
    /// Remote writes count the changed bookmarks, pulls count applied operations
    pub changes: usize,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(direction: SyncDirection, profile: &BackupProfile, changes: usize, diff: &DiffResult, started: Instant) -> Self {
        Self {
            direction,
            profile: profile.name.clone(),
            changes,
            added: diff.added.len(),
            removed: diff.removed.len(),
            modified: diff.modified.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn message(&self) -> String {
        let verb = match self.direction {
            SyncDirection::Push => "Pushed to",
            SyncDirection::Pull => "Pulled from",
        };
        format!(
            "{} '{}': {} changes (+{} -{} ~{})",
            verb, self.profile, self.changes, self.added, self.removed, self.modified
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub profile: String,
    pub category: ErrorCategory,
    pub message: String,
}

/// Result of pushing or pulling several profiles
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<SyncReport>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn message(&self) -> String {
        let total = self.succeeded.len() + self.failed.len();
        match (self.succeeded.len(), self.failed.len()) {
            (_, 0) => format!("All {} backups synced", total),
            (0, _) => format!("All {} backups failed", total),
            (ok, failed) => format!("{} of {} backups synced, {} failed", ok, total, failed),
        }
    }
}

/// Diff shown before a push or pull is confirmed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPreview {
    pub direction: SyncDirection,
    pub profile: String,
    pub diff: DiffResult,
    pub remote_bookmarks: usize,
    pub local_bookmarks: usize,
}

enum PullMode {
    Incremental,
    FullReplace,
}

/// The local side of a profile: what gets uploaded and where pulls write.
struct LocalSide {
    scope: WriteScope,
    forest: Vec<BookmarkNode>,
}

fn diff_options(profile: &BackupProfile) -> DiffOptions {
    DiffOptions {
        skip_root_path: profile.is_folder_scoped(),
    }
}

/// What a pull should make the local scope look like.
fn desired_contents<'a>(profile: &BackupProfile, remote: &'a [BookmarkNode]) -> &'a [BookmarkNode] {
    if !profile.is_folder_scoped() {
        return remote;
    }
    match desired_top_level(remote) {
        [BookmarkNode::Folder(folder)] => &folder.children,
        other => other,
    }
}

/// Push/pull orchestration over a local store, a lock and remote storage.
pub struct SyncManager {
    local: Arc<dyn BookmarkTreeStore>,
    lock: SyncLock,
    remotes: Arc<dyn RemoteProvider>,
    lock_timeout: Duration,
}

impl SyncManager {
    pub fn new(local: Arc<dyn BookmarkTreeStore>, lock: SyncLock, remotes: Arc<dyn RemoteProvider>) -> Self {
        Self {
            local,
            lock,
            remotes,
            lock_timeout: Duration::from_secs(5),
        }
    }

    /// How long push and pull wait for a busy lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    async fn local_side(&self, profile: &BackupProfile) -> Result<LocalSide, SyncError> {
        let full = self.local.get_full_tree().await?;
        let Some(folder_path) = profile.local_folder.as_deref().filter(|_| profile.is_folder_scoped()) else {
            return Ok(LocalSide {
                scope: WriteScope::FullTree,
                forest: full,
            });
        };

        let path = parse_folder_path(folder_path);
        let folder = find_folder(&full, &path)
            .ok_or_else(|| SyncError::LocalPathNotFound(folder_path.to_string()))?;
        let id = folder
            .id
            .clone()
            .ok_or_else(|| SyncError::LocalPathNotFound(folder_path.to_string()))?;
        Ok(LocalSide {
            scope: WriteScope::Folder(id),
            forest: vec![BookmarkNode::Folder(folder.clone())],
        })
    }

    /// Overwrite the remote with the local tree.
    pub async fn push(&self, profile: &BackupProfile) -> Result<SyncReport, SyncError> {
        let remote = self.remotes.remote_for(profile)?;
        log::info!("Sync: push to '{}' starting", profile.name);
        self.lock
            .with_lock("push", self.lock_timeout, || self.push_locked(profile, remote))
            .await
    }

    async fn push_locked(&self, profile: &BackupProfile, remote: Arc<dyn RemoteStorage>) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let local = self.local_side(profile).await?;
        let previous = remote.read().await?.map(|d| d.bookmarks).unwrap_or_default();
        let diff = calculate_diff(&previous, &local.forest, diff_options(profile));

        let data = SyncData::new(local.forest);
        remote.write(&data).await?;

        log::info!(
            "Sync: pushed {} bookmarks to '{}' ({})",
            count_bookmarks(&data.bookmarks),
            profile.name,
            diff.summary()
        );
        Ok(SyncReport::new(SyncDirection::Push, profile, diff.total(), &diff, started))
    }

    /// Reconcile the local tree onto the remote one, keeping ids of
    /// bookmarks that survive.
    pub async fn pull(&self, profile: &BackupProfile) -> Result<SyncReport, SyncError> {
        self.pull_with(profile, PullMode::Incremental).await
    }

    /// Pull by clearing the local scope and recreating it. Recovery path.
    pub async fn pull_full_replace(&self, profile: &BackupProfile) -> Result<SyncReport, SyncError> {
        self.pull_with(profile, PullMode::FullReplace).await
    }

    async fn pull_with(&self, profile: &BackupProfile, mode: PullMode) -> Result<SyncReport, SyncError> {
        let remote = self.remotes.remote_for(profile)?;
        log::info!("Sync: pull from '{}' starting", profile.name);
        self.lock
            .with_lock("pull", self.lock_timeout, || self.pull_locked(profile, remote, mode))
            .await
    }

    async fn pull_locked(
        &self,
        profile: &BackupProfile,
        remote: Arc<dyn RemoteStorage>,
        mode: PullMode,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let data = remote.read().await?.ok_or(SyncError::NoData)?;
        if !data.verify_checksum() {
            log::warn!(
                "Sync: checksum mismatch in '{}' (stored {}), applying anyway",
                profile.name,
                data.checksum
            );
        }

        let local = self.local_side(profile).await?;
        let diff = calculate_diff(&local.forest, &data.bookmarks, diff_options(profile));
        let desired = desired_contents(profile, &data.bookmarks);

        let writer = IncrementalWriter::new(self.local.as_ref());
        let result = match mode {
            PullMode::Incremental => writer.reconcile(desired, &local.scope).await?,
            PullMode::FullReplace => writer.full_replace(desired, &local.scope).await?,
        };

        if !result.success {
            log::warn!(
                "Sync: pull from '{}' applied {} changes with {} failures",
                profile.name,
                result.change_count,
                result.errors.len()
            );
            return Err(SyncError::PartialFailure {
                applied: result.change_count,
                errors: result.errors,
            });
        }

        log::info!(
            "Sync: pulled '{}' ({} changes, {})",
            profile.name,
            result.change_count,
            diff.summary()
        );
        Ok(SyncReport::new(SyncDirection::Pull, profile, result.change_count, &diff, started))
    }

    /// What a push would change on the remote. Runs without the lock.
    pub async fn preview_push(&self, profile: &BackupProfile) -> Result<SyncPreview, SyncError> {
        let remote = self.remotes.remote_for(profile)?;
        let local = self.local_side(profile).await?;
        let previous = remote.read().await?.map(|d| d.bookmarks).unwrap_or_default();
        Ok(SyncPreview {
            direction: SyncDirection::Push,
            profile: profile.name.clone(),
            diff: calculate_diff(&previous, &local.forest, diff_options(profile)),
            remote_bookmarks: count_bookmarks(&previous),
            local_bookmarks: count_bookmarks(&local.forest),
        })
    }

    /// What a pull would change locally. Runs without the lock.
    pub async fn preview_pull(&self, profile: &BackupProfile) -> Result<SyncPreview, SyncError> {
        let remote = self.remotes.remote_for(profile)?;
        let data = remote.read().await?.ok_or(SyncError::NoData)?;
        let local = self.local_side(profile).await?;
        Ok(SyncPreview {
            direction: SyncDirection::Pull,
            profile: profile.name.clone(),
            diff: calculate_diff(&local.forest, &data.bookmarks, diff_options(profile)),
            remote_bookmarks: count_bookmarks(&data.bookmarks),
            local_bookmarks: count_bookmarks(&local.forest),
        })
    }

    pub async fn push_all(&self, profiles: &[BackupProfile]) -> BatchReport {
        let mut report = BatchReport::default();
        for profile in profiles {
            match self.push(profile).await {
                Ok(r) => report.succeeded.push(r),
                Err(e) => report.failed.push(Self::failure(profile, &e)),
            }
        }
        log::info!("Sync: push_all: {}", report.message());
        report
    }

    pub async fn pull_all(&self, profiles: &[BackupProfile]) -> BatchReport {
        let mut report = BatchReport::default();
        for profile in profiles {
            match self.pull(profile).await {
                Ok(r) => report.succeeded.push(r),
                Err(e) => report.failed.push(Self::failure(profile, &e)),
            }
        }
        log::info!("Sync: pull_all: {}", report.message());
        report
    }

    fn failure(profile: &BackupProfile, error: &SyncError) -> BatchFailure {
        log::error!("Sync: '{}' failed: {}", profile.name, error);
        BatchFailure {
            profile: profile.name.clone(),
            category: error.category(),
            message: error.to_string(),
        }
    }

    pub async fn lock_status(&self) -> Result<LockStatus, SyncError> {
        Ok(self.lock.status().await?)
    }

    pub async fn force_unlock(&self) -> Result<(), SyncError> {
        Ok(self.lock.force_release().await?)
    }

    /// Check that the profile's credentials are accepted.
    pub async fn verify_remote(&self, profile: &BackupProfile) -> Result<Option<UserIdentity>, SyncError> {
        let remote = self.remotes.remote_for(profile)?;
        Ok(remote.get_user_identity().await?)
    }
}
