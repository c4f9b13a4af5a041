use std::collections::HashMap;

use crate::bookmarks::{BookmarkNode, TreeStoreError};

/// Which part of the live tree a reconciliation pass owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteScope {
    /// The whole forest. Paths start with the name of a fixed top-level
    /// container ("Bookmarks Bar", ...).
    FullTree,
    /// One folder, by id. Paths are relative to it; the empty path is the
    /// folder itself.
    Folder(String),
}

/// A live node as seen when the index was built.
#[derive(Debug, Clone)]
pub struct IndexedNode {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub parent_id: String,
    /// Titles of the ancestor folders, relative to the scope root
    pub parent_path: Vec<String>,
    /// Position among the parent's children
    pub index: usize,
    /// Child ids in order (folders only)
    pub children: Vec<String>,
}

impl IndexedNode {
    /// Full title path of a folder
    pub fn path(&self) -> Vec<String> {
        let mut path = self.parent_path.clone();
        path.push(self.title.clone());
        path
    }
}

/// Lookup tables over one snapshot of the live tree.
///
/// Positions become stale as soon as anything is written; the writer only
/// trusts them for classification and re-reads child lists before it
/// repositions anything.
#[derive(Debug)]
pub struct BrowserBookmarkIndex {
    root_id: String,
    root_children: Vec<String>,
    by_id: HashMap<String, IndexedNode>,
    /// URL -> leaf ids in pre-order
    by_url: HashMap<String, Vec<String>>,
    /// Folder path -> id of the first folder with that path
    by_path: HashMap<Vec<String>, String>,
    /// Non-fixed folders in pre-order
    folder_order: Vec<String>,
    /// Leaves in pre-order
    leaf_order: Vec<String>,
}

impl BrowserBookmarkIndex {
    /// Index the nodes below the scope root. `roots` is what the store
    /// returned for the scope: the full forest or the scope folder's subtree.
    pub fn build(roots: &[BookmarkNode], scope: &WriteScope) -> Result<Self, TreeStoreError> {
        let root = match (scope, roots) {
            (WriteScope::FullTree, [BookmarkNode::Folder(root)]) => root,
            (WriteScope::Folder(id), [BookmarkNode::Folder(folder)]) if folder.id.as_deref() == Some(id.as_str()) => folder,
            (WriteScope::Folder(id), _) => return Err(TreeStoreError::NotFound(id.clone())),
            (WriteScope::FullTree, _) => {
                return Err(TreeStoreError::InvalidOperation(
                    "live tree must have a single root".to_string(),
                ))
            }
        };
        let root_id = root
            .id
            .clone()
            .ok_or_else(|| TreeStoreError::InvalidOperation("live root has no id".to_string()))?;

        let mut index = Self {
            root_id: root_id.clone(),
            root_children: Vec::new(),
            by_id: HashMap::new(),
            by_url: HashMap::new(),
            by_path: HashMap::new(),
            folder_order: Vec::new(),
            leaf_order: Vec::new(),
        };

        let top_level_fixed = *scope == WriteScope::FullTree;
        index.root_children = index.insert_children(&root.children, &root_id, &[], top_level_fixed);
        Ok(index)
    }

    fn insert_children(
        &mut self,
        children: &[BookmarkNode],
        parent_id: &str,
        parent_path: &[String],
        fixed: bool,
    ) -> Vec<String> {
        let mut ids = Vec::with_capacity(children.len());
        for (position, child) in children.iter().enumerate() {
            // Nodes handed out by a store always carry ids
            let Some(id) = child.id().map(str::to_string) else {
                continue;
            };
            ids.push(id.clone());

            let mut node = IndexedNode {
                id: id.clone(),
                title: child.title().to_string(),
                url: child.url().map(str::to_string),
                parent_id: parent_id.to_string(),
                parent_path: parent_path.to_vec(),
                index: position,
                children: Vec::new(),
            };

            match child {
                BookmarkNode::Leaf(bookmark) => {
                    self.by_url.entry(bookmark.url.clone()).or_default().push(id.clone());
                    self.leaf_order.push(id.clone());
                }
                BookmarkNode::Folder(folder) => {
                    let path = node.path();
                    self.by_path.entry(path.clone()).or_insert_with(|| id.clone());
                    // Fixed top-level containers are never pruned
                    if !fixed {
                        self.folder_order.push(id.clone());
                    }
                    node.children = self.insert_children(&folder.children, &id, &path, false);
                }
            }
            self.by_id.insert(id, node);
        }
        ids
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn node(&self, id: &str) -> Option<&IndexedNode> {
        self.by_id.get(id)
    }

    /// Live leaf ids holding this URL, in pre-order
    pub fn leaf_ids(&self, url: &str) -> &[String] {
        self.by_url.get(url).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every live leaf id in pre-order
    pub fn leaves(&self) -> &[String] {
        &self.leaf_order
    }

    /// Id of the folder at `path`; the empty path is the scope root.
    pub fn folder_id(&self, path: &[String]) -> Option<&str> {
        if path.is_empty() {
            return Some(&self.root_id);
        }
        self.by_path.get(path).map(String::as_str)
    }

    /// Remember a folder created during the pass so later lookups reuse it.
    pub fn register_folder(&mut self, path: Vec<String>, id: String) {
        self.by_path.entry(path).or_insert(id);
    }

    /// Ordered child ids of a folder as they were when the index was built
    pub fn children_of(&self, id: &str) -> &[String] {
        if id == self.root_id {
            return &self.root_children;
        }
        self.by_id.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Non-fixed folders in pre-order
    pub fn folders(&self) -> &[String] {
        &self.folder_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::{Bookmark, Folder};

    fn with_id(mut node: BookmarkNode, id: &str) -> BookmarkNode {
        match &mut node {
            BookmarkNode::Leaf(Bookmark { id: slot, .. }) | BookmarkNode::Folder(Folder { id: slot, .. }) => {
                *slot = Some(id.to_string())
            }
        }
        node
    }

    fn live() -> Vec<BookmarkNode> {
        vec![with_id(
            BookmarkNode::folder(
                "",
                vec![
                    with_id(
                        BookmarkNode::folder(
                            "Bar",
                            vec![
                                with_id(BookmarkNode::leaf("A", "https://a.com"), "10"),
                                with_id(
                                    BookmarkNode::folder(
                                        "Dev",
                                        vec![with_id(BookmarkNode::leaf("A again", "https://a.com"), "12")],
                                    ),
                                    "11",
                                ),
                            ],
                        ),
                        "1",
                    ),
                    with_id(BookmarkNode::folder("Other", vec![]), "2"),
                ],
            ),
            "0",
        )]
    }

    #[test]
    fn test_full_tree_index() {
        let index = BrowserBookmarkIndex::build(&live(), &WriteScope::FullTree).unwrap();
        assert_eq!(index.root_id(), "0");
        assert_eq!(index.leaf_ids("https://a.com"), &["10".to_string(), "12".to_string()]);
        assert_eq!(index.folder_id(&["Bar".to_string(), "Dev".to_string()]), Some("11"));
        assert_eq!(index.folder_id(&[]), Some("0"));
        assert_eq!(index.folders(), &["11".to_string()]);

        let dev_leaf = index.node("12").unwrap();
        assert_eq!(dev_leaf.parent_path, vec!["Bar", "Dev"]);
        assert_eq!(dev_leaf.index, 0);
        assert_eq!(index.children_of("1"), &["10".to_string(), "11".to_string()]);
    }

    #[test]
    fn test_folder_scope_paths_are_relative() {
        let tree = live();
        let bar = tree[0].children()[0].clone();
        let index = BrowserBookmarkIndex::build(&[bar], &WriteScope::Folder("1".into())).unwrap();
        assert_eq!(index.folder_id(&["Dev".to_string()]), Some("11"));
        assert_eq!(index.node("10").unwrap().parent_path, Vec::<String>::new());
        assert!(index.folders().contains(&"11".to_string()));
    }

    #[test]
    fn test_register_folder_keeps_first() {
        let mut index = BrowserBookmarkIndex::build(&live(), &WriteScope::FullTree).unwrap();
        index.register_folder(vec!["Bar".into(), "New".into()], "99".into());
        index.register_folder(vec!["Bar".into(), "New".into()], "100".into());
        assert_eq!(index.folder_id(&["Bar".to_string(), "New".to_string()]), Some("99"));
    }
}
