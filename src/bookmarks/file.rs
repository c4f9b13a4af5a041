//! Bookmark tree kept in a JSON file, re-read on every call.
//!
//! Nothing is cached between calls: each read loads the file and each
//! mutation loads, applies and writes it back. Whoever holds the sync lock
//! therefore always works on what the previous holder saved.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::memory::MemoryTreeStore;
use super::models::BookmarkNode;
use super::store::{BookmarkTreeStore, CreateDetails, MoveDestination, TreeStoreError};

pub struct FileTreeStore {
    path: PathBuf,
    /// Serializes load-modify-save within this process
    guard: Mutex<()>,
}

impl FileTreeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current file contents as a forest
    pub fn snapshot(&self) -> Result<Vec<BookmarkNode>, TreeStoreError> {
        Ok(MemoryTreeStore::load(&self.path)?.snapshot())
    }

    fn load(&self) -> Result<MemoryTreeStore, TreeStoreError> {
        MemoryTreeStore::load(&self.path)
    }
}

#[async_trait]
impl BookmarkTreeStore for FileTreeStore {
    async fn get_full_tree(&self) -> Result<Vec<BookmarkNode>, TreeStoreError> {
        let _guard = self.guard.lock().await;
        self.load()?.get_full_tree().await
    }

    async fn get_subtree(&self, id: &str) -> Result<Vec<BookmarkNode>, TreeStoreError> {
        let _guard = self.guard.lock().await;
        self.load()?.get_subtree(id).await
    }

    async fn create(&self, details: CreateDetails) -> Result<BookmarkNode, TreeStoreError> {
        let _guard = self.guard.lock().await;
        let store = self.load()?;
        let created = store.create(details).await?;
        store.save(&self.path)?;
        Ok(created)
    }

    async fn update(&self, id: &str, title: &str) -> Result<(), TreeStoreError> {
        let _guard = self.guard.lock().await;
        let store = self.load()?;
        store.update(id, title).await?;
        store.save(&self.path)
    }

    async fn move_node(&self, id: &str, destination: MoveDestination) -> Result<(), TreeStoreError> {
        let _guard = self.guard.lock().await;
        let store = self.load()?;
        store.move_node(id, destination).await?;
        store.save(&self.path)
    }

    async fn remove(&self, id: &str) -> Result<(), TreeStoreError> {
        let _guard = self.guard.lock().await;
        let store = self.load()?;
        store.remove(id).await?;
        store.save(&self.path)
    }

    async fn remove_subtree(&self, id: &str) -> Result<(), TreeStoreError> {
        let _guard = self.guard.lock().await;
        let store = self.load()?;
        store.remove_subtree(id).await?;
        store.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::walk_leaves;
    use tempfile::TempDir;

    fn bar_id(store: &FileTreeStore) -> String {
        store.snapshot().unwrap()[0].children()[0].id().unwrap().to_string()
    }

    fn leaf(parent: &str, title: &str, url: &str) -> CreateDetails {
        CreateDetails {
            parent_id: parent.to_string(),
            title: title.to_string(),
            url: Some(url.to_string()),
            index: None,
        }
    }

    #[tokio::test]
    async fn test_missing_file_starts_with_containers() {
        let temp = TempDir::new().unwrap();
        let store = FileTreeStore::new(temp.path().join("bookmarks.json"));

        let tree = store.get_full_tree().await.unwrap();
        let containers: Vec<&str> = tree[0].children().iter().map(|c| c.title()).collect();
        assert_eq!(containers, vec!["Bookmarks Bar", "Other Bookmarks", "Mobile Bookmarks"]);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_mutations_persist_with_stable_ids() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bookmarks.json");
        let store = FileTreeStore::new(&path);
        let bar = bar_id(&store);

        let created = store.create(leaf(&bar, "A", "https://a.com")).await.unwrap();
        let id = created.id().unwrap().to_string();
        store.update(&id, "A renamed").await.unwrap();

        let reopened = FileTreeStore::new(&path);
        let subtree = reopened.get_subtree(&id).await.unwrap();
        assert_eq!(subtree[0].title(), "A renamed");
        assert_eq!(bar_id(&reopened), bar);
    }

    #[tokio::test]
    async fn test_two_handles_see_each_others_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bookmarks.json");
        let first = FileTreeStore::new(&path);
        let second = FileTreeStore::new(&path);

        // Both handles exist before either writes, as two CLI runs would.
        let bar = bar_id(&first);
        first.create(leaf(&bar, "A", "https://a.com")).await.unwrap();
        second.create(leaf(&bar, "B", "https://b.com")).await.unwrap();

        let urls: Vec<String> = walk_leaves(&first.snapshot().unwrap())
            .iter()
            .map(|v| v.bookmark.url.clone())
            .collect();
        assert_eq!(urls, vec!["https://a.com", "https://b.com"]);
    }
}
