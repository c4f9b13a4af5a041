pub mod config;
pub mod credentials;
pub mod diff;
pub mod envelope;
pub mod gist;
pub mod kv;
pub mod lock;
pub mod remote;
pub mod writer;

mod manager;

pub use config::{BackupProfile, LockSettings, SettingsError, SyncSettings};
pub use credentials::CredentialStore;
pub use diff::{calculate_diff, DiffItem, DiffKind, DiffOptions, DiffResult};
pub use envelope::SyncData;
pub use gist::{GistClient, GistProvider};
pub use kv::{JsonFileStore, KeyValueStore, KvError, MemoryKeyValueStore};
pub use lock::{LockConfig, LockError, LockStatus, SyncLock};
pub use manager::{
    BatchFailure, BatchReport, ErrorCategory, SyncDirection, SyncError, SyncManager, SyncPreview, SyncReport,
};
pub use remote::{MemoryRemote, RemoteError, RemoteProvider, RemoteStorage, UserIdentity};
pub use writer::{IncrementalWriter, ReconcileResult, ReconcileStats, WriteError, WriteOperation, WriteScope};
