//! Bookmark tree diff keyed by URL.
//!
//! Direction is a caller contract: `source` is the side about to be
//! overwritten, `target` is the side that survives. A push therefore diffs
//! `(remote, local)` and a pull diffs `(local, remote)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bookmarks::{walk_leaves, BookmarkNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
}

/// One changed bookmark. `path` holds the ancestor folder titles, not the
/// bookmark itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffItem {
    pub kind: DiffKind,
    pub path: Vec<String>,
    pub title: String,
    pub url: String,
    /// Previous title, only for `Modified` entries whose title changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_title: Option<String>,
    /// Previous folder path, only for `Modified` entries that moved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub added: Vec<DiffItem>,
    pub removed: Vec<DiffItem>,
    pub modified: Vec<DiffItem>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    /// One-line summary, e.g. `"+2 -1 ~3"`
    pub fn summary(&self) -> String {
        format!("+{} -{} ~{}", self.added.len(), self.removed.len(), self.modified.len())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Ignore the first path segment when comparing folder paths. Used for
    /// folder-scoped backups whose top folder is named differently per device.
    pub skip_root_path: bool,
}

struct FlatEntry<'a> {
    title: &'a str,
    path: Vec<String>,
}

/// URL-keyed map that remembers first-insertion order; later duplicates
/// overwrite the entry in place.
struct FlatTree<'a> {
    order: Vec<&'a str>,
    entries: HashMap<&'a str, FlatEntry<'a>>,
}

impl<'a> FlatTree<'a> {
    fn build(roots: &'a [BookmarkNode]) -> Self {
        let mut order = Vec::new();
        let mut entries = HashMap::new();
        for visit in walk_leaves(roots) {
            let url = visit.bookmark.url.as_str();
            let entry = FlatEntry {
                title: visit.bookmark.title.as_str(),
                path: visit.path,
            };
            if entries.insert(url, entry).is_none() {
                order.push(url);
            }
        }
        Self { order, entries }
    }

    fn iter(&self) -> impl Iterator<Item = (&'a str, &FlatEntry<'a>)> + '_ {
        self.order
            .iter()
            .filter_map(move |url| self.entries.get(url).map(|entry| (*url, entry)))
    }
}

fn comparable_path(path: &[String], skip_root_path: bool) -> &[String] {
    if skip_root_path && !path.is_empty() {
        &path[1..]
    } else {
        path
    }
}

/// Compute what changes when `target`'s state replaces `source`'s.
pub fn calculate_diff(source: &[BookmarkNode], target: &[BookmarkNode], options: DiffOptions) -> DiffResult {
    let source_map = FlatTree::build(source);
    let target_map = FlatTree::build(target);
    let mut result = DiffResult::default();

    for (url, target_entry) in target_map.iter() {
        let Some(source_entry) = source_map.entries.get(url) else {
            result.added.push(DiffItem {
                kind: DiffKind::Added,
                path: target_entry.path.clone(),
                title: target_entry.title.to_string(),
                url: url.to_string(),
                old_title: None,
                old_path: None,
            });
            continue;
        };

        let title_changed = source_entry.title != target_entry.title;
        let path_changed = comparable_path(&source_entry.path, options.skip_root_path)
            != comparable_path(&target_entry.path, options.skip_root_path);

        if title_changed || path_changed {
            result.modified.push(DiffItem {
                kind: DiffKind::Modified,
                path: target_entry.path.clone(),
                title: target_entry.title.to_string(),
                url: url.to_string(),
                old_title: title_changed.then(|| source_entry.title.to_string()),
                old_path: path_changed.then(|| source_entry.path.clone()),
            });
        }
    }

    for (url, source_entry) in source_map.iter() {
        if !target_map.entries.contains_key(url) {
            result.removed.push(DiffItem {
                kind: DiffKind::Removed,
                path: source_entry.path.clone(),
                title: source_entry.title.to_string(),
                url: url.to_string(),
                old_title: None,
                old_path: None,
            });
        }
    }

    log::debug!(
        "Diff: source {} urls, target {} urls -> {}",
        source_map.order.len(),
        target_map.order.len(),
        result.summary()
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn root(children: Vec<BookmarkNode>) -> Vec<BookmarkNode> {
        vec![BookmarkNode::folder("", children)]
    }

    fn remote_tree() -> Vec<BookmarkNode> {
        root(vec![
            BookmarkNode::folder(
                "Bookmarks Bar",
                vec![
                    BookmarkNode::leaf("A", "https://a.com"),
                    BookmarkNode::leaf("B", "https://b.com"),
                    BookmarkNode::folder("Dev", vec![BookmarkNode::leaf("C", "https://c.com")]),
                ],
            ),
            BookmarkNode::folder("Other Bookmarks", vec![BookmarkNode::folder("Empty", vec![])]),
        ])
    }

    fn urls(items: &[DiffItem]) -> HashSet<String> {
        items.iter().map(|i| i.url.clone()).collect()
    }

    #[test]
    fn test_identical_trees_have_no_changes() {
        let tree = remote_tree();
        let diff = calculate_diff(&tree, &tree, DiffOptions::default());
        assert!(!diff.has_changes());
        assert_eq!(diff.total(), 0);
    }

    #[test]
    fn test_one_added_one_removed() {
        let remote = remote_tree();
        let local = root(vec![
            BookmarkNode::folder(
                "Bookmarks Bar",
                vec![
                    BookmarkNode::leaf("A", "https://a.com"),
                    BookmarkNode::leaf("D", "https://d.com"),
                    BookmarkNode::folder("Dev", vec![BookmarkNode::leaf("C", "https://c.com")]),
                ],
            ),
            BookmarkNode::folder("Other Bookmarks", vec![]),
        ]);

        let diff = calculate_diff(&remote, &local, DiffOptions::default());
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].url, "https://d.com");
        assert_eq!(diff.added[0].path, vec!["Bookmarks Bar"]);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].url, "https://b.com");
        assert_eq!(diff.modified.len(), 0);
        assert!(diff.has_changes());
    }

    #[test]
    fn test_title_and_path_change_is_one_modification() {
        let source = root(vec![BookmarkNode::folder("Foo", vec![BookmarkNode::leaf("Old", "https://a.com")])]);
        let target = root(vec![BookmarkNode::folder("Bar", vec![BookmarkNode::leaf("New", "https://a.com")])]);

        let diff = calculate_diff(&source, &target, DiffOptions::default());
        assert_eq!(diff.modified.len(), 1);
        let item = &diff.modified[0];
        assert_eq!(item.old_title.as_deref(), Some("Old"));
        assert_eq!(item.title, "New");
        assert_eq!(item.path, vec!["Bar"]);
        assert_eq!(item.old_path, Some(vec!["Foo".to_string()]));
    }

    #[test]
    fn test_path_only_change_has_no_old_title() {
        let source = root(vec![BookmarkNode::folder("Foo", vec![BookmarkNode::leaf("A", "https://a.com")])]);
        let target = root(vec![BookmarkNode::folder("Bar", vec![BookmarkNode::leaf("A", "https://a.com")])]);

        let diff = calculate_diff(&source, &target, DiffOptions::default());
        assert_eq!(diff.modified.len(), 1);
        assert!(diff.modified[0].old_title.is_none());
    }

    #[test]
    fn test_skip_root_path_ignores_top_folder_name() {
        let laptop = vec![BookmarkNode::folder(
            "Work (laptop)",
            vec![BookmarkNode::folder("Docs", vec![BookmarkNode::leaf("A", "https://a.com")])],
        )];
        let desktop = vec![BookmarkNode::folder(
            "Work",
            vec![BookmarkNode::folder("Docs", vec![BookmarkNode::leaf("A", "https://a.com")])],
        )];

        let strict = calculate_diff(&laptop, &desktop, DiffOptions::default());
        assert_eq!(strict.modified.len(), 1);

        let scoped = calculate_diff(&laptop, &desktop, DiffOptions { skip_root_path: true });
        assert!(!scoped.has_changes());
    }

    #[test]
    fn test_diff_is_symmetric() {
        let a = remote_tree();
        let b = root(vec![
            BookmarkNode::folder(
                "Bookmarks Bar",
                vec![
                    BookmarkNode::leaf("A renamed", "https://a.com"),
                    BookmarkNode::leaf("E", "https://e.com"),
                ],
            ),
            BookmarkNode::folder("Other Bookmarks", vec![BookmarkNode::leaf("C", "https://c.com")]),
        ]);

        let forward = calculate_diff(&a, &b, DiffOptions::default());
        let backward = calculate_diff(&b, &a, DiffOptions::default());
        assert_eq!(urls(&forward.added), urls(&backward.removed));
        assert_eq!(urls(&forward.removed), urls(&backward.added));
        assert_eq!(urls(&forward.modified), urls(&backward.modified));
        assert_eq!(urls(&forward.modified).len(), 2);
    }

    #[test]
    fn test_order_follows_traversal() {
        let source = root(vec![]);
        let target = root(vec![
            BookmarkNode::folder(
                "Bar",
                vec![
                    BookmarkNode::leaf("1", "https://1.com"),
                    BookmarkNode::folder("Sub", vec![BookmarkNode::leaf("2", "https://2.com")]),
                    BookmarkNode::leaf("3", "https://3.com"),
                ],
            ),
        ]);

        let diff = calculate_diff(&source, &target, DiffOptions::default());
        let order: Vec<&str> = diff.added.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_nested_empty_folders_are_not_diffed() {
        let source = root(vec![BookmarkNode::folder("A", vec![BookmarkNode::folder("B", vec![])])]);
        let target = root(vec![BookmarkNode::folder("C", vec![])]);
        assert!(!calculate_diff(&source, &target, DiffOptions::default()).has_changes());
    }
}
