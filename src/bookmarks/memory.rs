//! In-memory bookmark tree with browser semantics.
//!
//! Mirrors what a browser bookmark API allows: a fixed untitled root, fixed
//! top-level containers below it, and id-addressed create/move/update/remove.
//! Snapshots load from and save to JSON; `FileTreeStore` builds on that.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::models::{Bookmark, BookmarkNode, Folder};
use super::store::{BookmarkTreeStore, CreateDetails, MoveDestination, TreeStoreError};

pub const ROOT_ID: &str = "0";

pub const DEFAULT_CONTAINERS: [&str; 3] = ["Bookmarks Bar", "Other Bookmarks", "Mobile Bookmarks"];

#[derive(Debug, Clone)]
struct StoredNode {
    parent: Option<String>,
    title: String,
    url: Option<String>,
    children: Vec<String>,
    date_added: Option<i64>,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: HashMap<String, StoredNode>,
    next_id: u64,
}

pub struct MemoryTreeStore {
    arena: Mutex<Arena>,
}

impl Default for MemoryTreeStore {
    fn default() -> Self {
        Self::with_containers(&DEFAULT_CONTAINERS)
    }
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store whose root holds the given top-level containers.
    pub fn with_containers(titles: &[&str]) -> Self {
        let mut arena = Arena {
            nodes: HashMap::new(),
            next_id: 1,
        };
        arena.nodes.insert(
            ROOT_ID.to_string(),
            StoredNode {
                parent: None,
                title: String::new(),
                url: None,
                children: Vec::new(),
                date_added: None,
            },
        );
        for title in titles {
            let id = arena.allocate_id();
            arena.nodes.insert(
                id.clone(),
                StoredNode {
                    parent: Some(ROOT_ID.to_string()),
                    title: title.to_string(),
                    url: None,
                    children: Vec::new(),
                    date_added: None,
                },
            );
            if let Some(root) = arena.nodes.get_mut(ROOT_ID) {
                root.children.push(id);
            }
        }
        Self {
            arena: Mutex::new(arena),
        }
    }

    /// Build a store from a snapshot: a single untitled root folder. Ids
    /// already present in the snapshot are kept when they are unique.
    pub fn from_tree(roots: Vec<BookmarkNode>) -> Result<Self, TreeStoreError> {
        let root = match roots.as_slice() {
            [BookmarkNode::Folder(folder)] if folder.is_transparent() => folder,
            _ => {
                return Err(TreeStoreError::InvalidOperation(
                    "snapshot must be a single untitled root folder".to_string(),
                ))
            }
        };

        let mut arena = Arena {
            nodes: HashMap::new(),
            next_id: 1,
        };
        let mut reserved = Vec::new();
        collect_numeric_ids(&root.children, &mut reserved);
        arena.next_id = reserved.into_iter().max().map(|m| m + 1).unwrap_or(1);

        arena.nodes.insert(
            ROOT_ID.to_string(),
            StoredNode {
                parent: None,
                title: String::new(),
                url: None,
                children: Vec::new(),
                date_added: root.date_added,
            },
        );
        for child in &root.children {
            arena.insert_snapshot(ROOT_ID, child);
        }
        Ok(Self {
            arena: Mutex::new(arena),
        })
    }

    /// Load a JSON snapshot, or start with the default containers if the file
    /// does not exist yet.
    pub fn load(path: &Path) -> Result<Self, TreeStoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        let roots: Vec<BookmarkNode> = serde_json::from_str(&data)?;
        Self::from_tree(roots)
    }

    pub fn save(&self, path: &Path) -> Result<(), TreeStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// The full forest, same as `get_full_tree` but synchronous.
    pub fn snapshot(&self) -> Vec<BookmarkNode> {
        let arena = self.lock();
        arena.build(ROOT_ID).into_iter().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn collect_numeric_ids(nodes: &[BookmarkNode], out: &mut Vec<u64>) {
    for node in nodes {
        if let Some(n) = node.id().and_then(|id| id.parse::<u64>().ok()) {
            out.push(n);
        }
        collect_numeric_ids(node.children(), out);
    }
}

impl Arena {
    fn allocate_id(&mut self) -> String {
        loop {
            let id = self.next_id.to_string();
            self.next_id += 1;
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    fn insert_snapshot(&mut self, parent_id: &str, node: &BookmarkNode) {
        let id = match node.id() {
            Some(id) if id != ROOT_ID && !self.nodes.contains_key(id) => id.to_string(),
            _ => self.allocate_id(),
        };
        let (url, date_added) = match node {
            BookmarkNode::Leaf(b) => (Some(b.url.clone()), b.date_added),
            BookmarkNode::Folder(f) => (None, f.date_added),
        };
        self.nodes.insert(
            id.clone(),
            StoredNode {
                parent: Some(parent_id.to_string()),
                title: node.title().to_string(),
                url,
                children: Vec::new(),
                date_added,
            },
        );
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(id.clone());
        }
        for child in node.children() {
            self.insert_snapshot(&id, child);
        }
    }

    fn build(&self, id: &str) -> Option<BookmarkNode> {
        let node = self.nodes.get(id)?;
        Some(match &node.url {
            Some(url) => BookmarkNode::Leaf(Bookmark {
                id: Some(id.to_string()),
                title: node.title.clone(),
                url: url.clone(),
                date_added: node.date_added,
            }),
            None => BookmarkNode::Folder(Folder {
                id: Some(id.to_string()),
                title: node.title.clone(),
                children: node.children.iter().filter_map(|c| self.build(c)).collect(),
                date_added: node.date_added,
            }),
        })
    }

    fn get(&self, id: &str) -> Result<&StoredNode, TreeStoreError> {
        self.nodes
            .get(id)
            .ok_or_else(|| TreeStoreError::NotFound(id.to_string()))
    }

    /// The root and the top-level containers cannot be touched.
    fn ensure_mutable(&self, id: &str) -> Result<(), TreeStoreError> {
        let node = self.get(id)?;
        if id == ROOT_ID || node.parent.as_deref() == Some(ROOT_ID) {
            return Err(TreeStoreError::InvalidOperation(format!(
                "node {} is a fixed container",
                id
            )));
        }
        Ok(())
    }

    fn ensure_folder_target(&self, id: &str) -> Result<(), TreeStoreError> {
        let node = self.get(id)?;
        if node.url.is_some() {
            return Err(TreeStoreError::InvalidOperation(format!("node {} is not a folder", id)));
        }
        if id == ROOT_ID {
            return Err(TreeStoreError::InvalidOperation(
                "nothing can be added directly under the root".to_string(),
            ));
        }
        Ok(())
    }

    fn is_descendant_or_self(&self, candidate: &str, ancestor: &str) -> bool {
        let mut current = Some(candidate.to_string());
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent.clone());
        }
        false
    }

    fn detach(&mut self, id: &str) {
        let parent = self.nodes.get(id).and_then(|n| n.parent.clone());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| c != id);
        }
    }

    fn attach(&mut self, id: &str, parent_id: &str, index: Option<usize>) {
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            let position = index.unwrap_or(parent.children.len()).min(parent.children.len());
            parent.children.insert(position, id.to_string());
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(parent_id.to_string());
        }
    }

    fn drop_recursive(&mut self, id: &str) {
        if let Some(node) = self.nodes.remove(id) {
            for child in node.children {
                self.drop_recursive(&child);
            }
        }
    }
}

#[async_trait]
impl BookmarkTreeStore for MemoryTreeStore {
    async fn get_full_tree(&self) -> Result<Vec<BookmarkNode>, TreeStoreError> {
        Ok(self.snapshot())
    }

    async fn get_subtree(&self, id: &str) -> Result<Vec<BookmarkNode>, TreeStoreError> {
        let arena = self.lock();
        let node = arena
            .build(id)
            .ok_or_else(|| TreeStoreError::NotFound(id.to_string()))?;
        Ok(vec![node])
    }

    async fn create(&self, details: CreateDetails) -> Result<BookmarkNode, TreeStoreError> {
        let mut arena = self.lock();
        arena.ensure_folder_target(&details.parent_id)?;

        let id = arena.allocate_id();
        arena.nodes.insert(
            id.clone(),
            StoredNode {
                parent: None,
                title: details.title,
                url: details.url,
                children: Vec::new(),
                date_added: Some(Utc::now().timestamp_millis()),
            },
        );
        arena.attach(&id, &details.parent_id, details.index);
        arena
            .build(&id)
            .ok_or_else(|| TreeStoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &str, title: &str) -> Result<(), TreeStoreError> {
        let mut arena = self.lock();
        arena.ensure_mutable(id)?;
        if let Some(node) = arena.nodes.get_mut(id) {
            node.title = title.to_string();
        }
        Ok(())
    }

    async fn move_node(&self, id: &str, destination: MoveDestination) -> Result<(), TreeStoreError> {
        let mut arena = self.lock();
        arena.ensure_mutable(id)?;
        let parent_id = match destination.parent_id {
            Some(p) => p,
            None => arena
                .get(id)?
                .parent
                .clone()
                .ok_or_else(|| TreeStoreError::InvalidOperation(format!("node {} has no parent", id)))?,
        };
        arena.ensure_folder_target(&parent_id)?;
        if arena.is_descendant_or_self(&parent_id, id) {
            return Err(TreeStoreError::InvalidOperation(format!(
                "cannot move {} into its own subtree",
                id
            )));
        }
        arena.detach(id);
        arena.attach(id, &parent_id, destination.index);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), TreeStoreError> {
        let mut arena = self.lock();
        arena.ensure_mutable(id)?;
        if !arena.get(id)?.children.is_empty() {
            return Err(TreeStoreError::InvalidOperation(format!("folder {} is not empty", id)));
        }
        arena.detach(id);
        arena.nodes.remove(id);
        Ok(())
    }

    async fn remove_subtree(&self, id: &str) -> Result<(), TreeStoreError> {
        let mut arena = self.lock();
        arena.ensure_mutable(id)?;
        arena.detach(id);
        arena.drop_recursive(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn titles(store: &MemoryTreeStore, folder_id: &str) -> Vec<String> {
        let arena = store.lock();
        arena.nodes[folder_id]
            .children
            .iter()
            .map(|c| arena.nodes[c].title.clone())
            .collect()
    }

    fn leaf(parent: &str, title: &str, index: Option<usize>) -> CreateDetails {
        CreateDetails {
            parent_id: parent.to_string(),
            title: title.to_string(),
            url: Some(format!("https://{}.example", title.to_lowercase())),
            index,
        }
    }

    #[tokio::test]
    async fn test_default_containers() {
        let store = MemoryTreeStore::new();
        assert_eq!(titles(&store, ROOT_ID), DEFAULT_CONTAINERS.to_vec());
    }

    #[tokio::test]
    async fn test_create_at_index() {
        let store = MemoryTreeStore::new();
        store.create(leaf("1", "A", None)).await.unwrap();
        store.create(leaf("1", "C", None)).await.unwrap();
        store.create(leaf("1", "B", Some(1))).await.unwrap();
        store.create(leaf("1", "Z", Some(99))).await.unwrap();
        assert_eq!(titles(&store, "1"), vec!["A", "B", "C", "Z"]);
    }

    #[tokio::test]
    async fn test_root_and_containers_are_fixed() {
        let store = MemoryTreeStore::new();
        assert!(store.create(leaf(ROOT_ID, "A", None)).await.is_err());
        assert!(store.remove_subtree("1").await.is_err());
        assert!(store.update("2", "Renamed").await.is_err());
    }

    #[tokio::test]
    async fn test_move_index_counts_after_detach() {
        let store = MemoryTreeStore::new();
        let a = store.create(leaf("1", "A", None)).await.unwrap();
        store.create(leaf("1", "B", None)).await.unwrap();
        store.create(leaf("1", "C", None)).await.unwrap();

        let a_id = a.id().unwrap().to_string();
        store
            .move_node(&a_id, MoveDestination { parent_id: None, index: Some(2) })
            .await
            .unwrap();
        assert_eq!(titles(&store, "1"), vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_rejected() {
        let store = MemoryTreeStore::new();
        let outer = store
            .create(CreateDetails { parent_id: "1".into(), title: "Outer".into(), url: None, index: None })
            .await
            .unwrap();
        let outer_id = outer.id().unwrap().to_string();
        let inner = store
            .create(CreateDetails { parent_id: outer_id.clone(), title: "Inner".into(), url: None, index: None })
            .await
            .unwrap();
        let result = store
            .move_node(
                &outer_id,
                MoveDestination { parent_id: inner.id().map(str::to_string), index: None },
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_remove_refuses_non_empty_folder() {
        let store = MemoryTreeStore::new();
        let folder = store
            .create(CreateDetails { parent_id: "2".into(), title: "F".into(), url: None, index: None })
            .await
            .unwrap();
        let folder_id = folder.id().unwrap().to_string();
        store.create(leaf(&folder_id, "A", None)).await.unwrap();

        assert!(store.remove(&folder_id).await.is_err());
        store.remove_subtree(&folder_id).await.unwrap();
        assert!(titles(&store, "2").is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_keeps_ids() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bookmarks.json");

        let store = MemoryTreeStore::new();
        let a = store.create(leaf("1", "A", None)).await.unwrap();
        store.save(&path).unwrap();

        let loaded = MemoryTreeStore::load(&path).unwrap();
        let subtree = loaded.get_subtree(a.id().unwrap()).await.unwrap();
        assert_eq!(subtree[0].title(), "A");

        // New ids never collide with loaded ones
        let b = loaded.create(leaf("1", "B", None)).await.unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_from_tree_requires_single_root() {
        let result = MemoryTreeStore::from_tree(vec![BookmarkNode::folder("Named", vec![])]);
        assert!(result.is_err());
    }
}
