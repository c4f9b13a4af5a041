use async_trait::async_trait;
use thiserror::Error;

use super::models::BookmarkNode;

#[derive(Error, Debug)]
pub enum TreeStoreError {
    #[error("Bookmark node not found: {0}")]
    NotFound(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Arguments for [`BookmarkTreeStore::create`]. A `url` makes a bookmark,
/// no `url` makes a folder.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDetails {
    pub parent_id: String,
    pub title: String,
    pub url: Option<String>,
    pub index: Option<usize>,
}

/// Arguments for [`BookmarkTreeStore::move_node`]. A missing parent keeps the
/// node in its current parent; a missing index appends.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MoveDestination {
    pub parent_id: Option<String>,
    pub index: Option<usize>,
}

/// The live, id-addressed bookmark tree (the browser's bookmark store).
///
/// Indices passed to `create` and `move_node` are the final position of the
/// node among its new siblings, counted after the node has been detached from
/// its old place. Out-of-range indices append.
#[async_trait]
pub trait BookmarkTreeStore: Send + Sync {
    /// The whole forest: a single untitled root whose children are the
    /// fixed top-level containers.
    async fn get_full_tree(&self) -> Result<Vec<BookmarkNode>, TreeStoreError>;

    /// The node with the given id, with all of its descendants.
    async fn get_subtree(&self, id: &str) -> Result<Vec<BookmarkNode>, TreeStoreError>;

    async fn create(&self, details: CreateDetails) -> Result<BookmarkNode, TreeStoreError>;

    async fn update(&self, id: &str, title: &str) -> Result<(), TreeStoreError>;

    async fn move_node(&self, id: &str, destination: MoveDestination) -> Result<(), TreeStoreError>;

    /// Remove a bookmark or an empty folder.
    async fn remove(&self, id: &str) -> Result<(), TreeStoreError>;

    /// Remove a folder and everything below it.
    async fn remove_subtree(&self, id: &str) -> Result<(), TreeStoreError>;
}
