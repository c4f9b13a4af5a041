use std::collections::{HashMap, HashSet};

use crate::bookmarks::BookmarkNode;

use super::index::BrowserBookmarkIndex;

/// A child of a desired folder, in desired order.
#[derive(Debug, Clone, PartialEq)]
pub enum DesiredChild {
    Bookmark {
        url: String,
        title: String,
        /// Live leaf this entry was matched to, if any
        matched: Option<String>,
    },
    Folder {
        title: String,
    },
}

/// A desired folder and its children. The empty path is the scope root.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredParent {
    pub path: Vec<String>,
    pub children: Vec<DesiredChild>,
}

impl DesiredParent {
    pub fn child_path(&self, title: &str) -> Vec<String> {
        let mut path = self.path.clone();
        path.push(title.to_string());
        path
    }
}

/// A bookmark with no live counterpart
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCreate {
    pub parent_path: Vec<String>,
    pub title: String,
    pub url: String,
}

/// A cross-folder relocation
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMove {
    pub id: String,
    pub title: String,
    pub parent_path: Vec<String>,
    pub index: usize,
}

/// A canonical live folder sitting inside a duplicate of its desired
/// parent. It is moved into the canonical parent.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFolderMove {
    pub id: String,
    pub path: Vec<String>,
    pub parent_path: Vec<String>,
}

/// A same-folder repositioning
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedReorder {
    pub id: String,
    pub parent_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub id: String,
    pub old_title: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDelete {
    pub id: String,
    pub title: String,
}

/// Everything one reconciliation pass intends to do, computed from a single
/// index snapshot before any write happens.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Desired folders in pre-order, starting with the scope root
    pub parents: Vec<DesiredParent>,
    pub creates: Vec<PlannedCreate>,
    pub moves: Vec<PlannedMove>,
    /// Folder relocations, parents before children
    pub folder_moves: Vec<PlannedFolderMove>,
    pub reorders: Vec<PlannedReorder>,
    pub updates: Vec<PlannedUpdate>,
    pub deletes: Vec<PlannedDelete>,
    /// Live leaf ids that survive the pass
    pub kept: HashSet<String>,
    /// Existing parents whose live child order disagrees with the desired one
    pub out_of_order: HashSet<Vec<String>>,
}

impl ReconcilePlan {
    /// Paths of every desired folder, the scope root included
    pub fn desired_folder_paths(&self) -> HashSet<&[String]> {
        self.parents.iter().map(|p| p.path.as_slice()).collect()
    }
}

/// Skip single untitled wrapper folders so the desired forest starts at the
/// same level as the scope's children.
pub fn desired_top_level(mut nodes: &[BookmarkNode]) -> &[BookmarkNode] {
    while let [BookmarkNode::Folder(folder)] = nodes {
        if !folder.is_transparent() {
            break;
        }
        nodes = &folder.children;
    }
    nodes
}

/// Group desired folders by path. Sibling folders sharing a title are merged
/// into the first one.
fn collect_parents(nodes: Vec<&BookmarkNode>, path: Vec<String>, out: &mut Vec<DesiredParent>) {
    let mut children = Vec::new();
    let mut folder_slots: HashMap<&str, usize> = HashMap::new();
    let mut folder_contents: Vec<(String, Vec<&BookmarkNode>)> = Vec::new();

    for node in nodes {
        match node {
            BookmarkNode::Leaf(bookmark) => children.push(DesiredChild::Bookmark {
                url: bookmark.url.clone(),
                title: bookmark.title.clone(),
                matched: None,
            }),
            BookmarkNode::Folder(folder) => match folder_slots.get(folder.title.as_str()) {
                Some(&slot) => folder_contents[slot].1.extend(folder.children.iter()),
                None => {
                    folder_slots.insert(folder.title.as_str(), folder_contents.len());
                    folder_contents.push((folder.title.clone(), folder.children.iter().collect()));
                    children.push(DesiredChild::Folder {
                        title: folder.title.clone(),
                    });
                }
            },
        }
    }

    out.push(DesiredParent {
        path: path.clone(),
        children,
    });

    for (title, contents) in folder_contents {
        let mut child_path = path.clone();
        child_path.push(title);
        collect_parents(contents, child_path, out);
    }
}

/// Classify every desired entry against the live index.
pub fn build_plan(desired: &[BookmarkNode], index: &BrowserBookmarkIndex) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    collect_parents(desired_top_level(desired).iter().collect(), Vec::new(), &mut plan.parents);

    let mut occurrences: HashMap<String, usize> = HashMap::new();

    for parent in plan.parents.iter_mut() {
        let parent_id = index.folder_id(&parent.path).map(str::to_string);

        for (position, child) in parent.children.iter_mut().enumerate() {
            let DesiredChild::Bookmark { url, title, matched } = child else {
                continue;
            };

            let seen = occurrences.entry(url.clone()).or_insert(0);
            let live_id = index.leaf_ids(url).get(*seen).cloned();
            *seen += 1;

            let Some(live) = live_id.as_deref().and_then(|id| index.node(id)) else {
                plan.creates.push(PlannedCreate {
                    parent_path: parent.path.clone(),
                    title: title.clone(),
                    url: url.clone(),
                });
                continue;
            };

            let same_parent =
                live.parent_path == parent.path && parent_id.as_deref() == Some(live.parent_id.as_str());
            if !same_parent {
                plan.moves.push(PlannedMove {
                    id: live.id.clone(),
                    title: title.clone(),
                    parent_path: parent.path.clone(),
                    index: position,
                });
            } else if live.index != position {
                plan.reorders.push(PlannedReorder {
                    id: live.id.clone(),
                    parent_path: parent.path.clone(),
                });
            }

            if live.title != *title {
                plan.updates.push(PlannedUpdate {
                    id: live.id.clone(),
                    old_title: live.title.clone(),
                    title: title.clone(),
                });
            }

            plan.kept.insert(live.id.clone());
            *matched = Some(live.id.clone());
        }
    }

    for id in index.leaves() {
        if !plan.kept.contains(id) {
            let title = index.node(id).map(|n| n.title.clone()).unwrap_or_default();
            plan.deletes.push(PlannedDelete { id: id.clone(), title });
        }
    }

    // The index maps each path to the first live folder with it, so a
    // folder that only exists inside a later duplicate still has to be
    // brought under the canonical parent.
    for parent in &plan.parents {
        let Some(parent_id) = index.folder_id(&parent.path) else {
            continue;
        };
        for child in &parent.children {
            let DesiredChild::Folder { title } = child else {
                continue;
            };
            let path = parent.child_path(title);
            let Some(node) = index.folder_id(&path).and_then(|id| index.node(id)) else {
                continue;
            };
            if node.parent_id != parent_id {
                plan.folder_moves.push(PlannedFolderMove {
                    id: node.id.clone(),
                    path,
                    parent_path: parent.path.clone(),
                });
            }
        }
    }

    for parent in &plan.parents {
        let Some(parent_id) = index.folder_id(&parent.path) else {
            continue;
        };
        let expected: Vec<&str> = parent
            .children
            .iter()
            .filter_map(|child| match child {
                DesiredChild::Bookmark { matched, .. } => matched
                    .as_deref()
                    .filter(|id| index.node(id).map(|n| n.parent_id.as_str()) == Some(parent_id)),
                DesiredChild::Folder { title } => index.folder_id(&parent.child_path(title)),
            })
            .collect();
        let expected_set: HashSet<&str> = expected.iter().copied().collect();
        let live_order: Vec<&str> = index
            .children_of(parent_id)
            .iter()
            .map(String::as_str)
            .filter(|id| expected_set.contains(id))
            .collect();
        if live_order != expected {
            plan.out_of_order.insert(parent.path.clone());
        }
    }

    log::debug!(
        "Writer plan: {} creates, {} deletes, {} moves, {} folder moves, {} reorders, {} updates, {} out-of-order folders",
        plan.creates.len(),
        plan.deletes.len(),
        plan.moves.len(),
        plan.folder_moves.len(),
        plan.reorders.len(),
        plan.updates.len(),
        plan.out_of_order.len()
    );

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::MemoryTreeStore;
    use crate::sync::writer::index::WriteScope;

    fn store_with(children: Vec<BookmarkNode>) -> MemoryTreeStore {
        MemoryTreeStore::from_tree(vec![BookmarkNode::folder(
            "",
            vec![BookmarkNode::folder("Bar", children), BookmarkNode::folder("Other", vec![])],
        )])
        .unwrap()
    }

    fn plan_for(store: &MemoryTreeStore, desired: Vec<BookmarkNode>) -> ReconcilePlan {
        let index = BrowserBookmarkIndex::build(&store.snapshot(), &WriteScope::FullTree).unwrap();
        build_plan(&[BookmarkNode::folder("", desired)], &index)
    }

    #[test]
    fn test_move_and_update_classified_together() {
        let store = store_with(vec![BookmarkNode::folder("Foo", vec![BookmarkNode::leaf("A", "https://a.com")])]);
        let plan = plan_for(
            &store,
            vec![
                BookmarkNode::folder(
                    "Bar",
                    vec![
                        BookmarkNode::folder("Foo", vec![]),
                        BookmarkNode::folder("Baz", vec![BookmarkNode::leaf("A2", "https://a.com")]),
                    ],
                ),
                BookmarkNode::folder("Other", vec![]),
            ],
        );
        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].parent_path, vec!["Bar", "Baz"]);
        assert_eq!(plan.updates.len(), 1);
        assert!(plan.reorders.is_empty());
        assert!(plan.creates.is_empty());
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_reorder_within_parent() {
        let store = store_with(vec![
            BookmarkNode::leaf("X", "https://x.com"),
            BookmarkNode::leaf("Y", "https://y.com"),
            BookmarkNode::leaf("Z", "https://z.com"),
        ]);
        let plan = plan_for(
            &store,
            vec![
                BookmarkNode::folder(
                    "Bar",
                    vec![
                        BookmarkNode::leaf("Z", "https://z.com"),
                        BookmarkNode::leaf("X", "https://x.com"),
                        BookmarkNode::leaf("Y", "https://y.com"),
                    ],
                ),
                BookmarkNode::folder("Other", vec![]),
            ],
        );
        assert_eq!(plan.reorders.len(), 3);
        assert!(plan.moves.is_empty());
        assert!(plan.out_of_order.contains(&vec!["Bar".to_string()]));
    }

    #[test]
    fn test_duplicate_urls_match_by_occurrence() {
        let store = store_with(vec![
            BookmarkNode::leaf("one", "https://dup.com"),
            BookmarkNode::leaf("two", "https://dup.com"),
            BookmarkNode::leaf("three", "https://dup.com"),
        ]);
        let plan = plan_for(
            &store,
            vec![BookmarkNode::folder(
                "Bar",
                vec![
                    BookmarkNode::leaf("one", "https://dup.com"),
                    BookmarkNode::leaf("two", "https://dup.com"),
                ],
            )],
        );
        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].title, "three");
        assert!(plan.updates.is_empty());
    }

    #[test]
    fn test_sibling_folders_with_same_title_merge() {
        let store = store_with(vec![]);
        let plan = plan_for(
            &store,
            vec![BookmarkNode::folder(
                "Bar",
                vec![
                    BookmarkNode::folder("Dup", vec![BookmarkNode::leaf("A", "https://a.com")]),
                    BookmarkNode::folder("Dup", vec![BookmarkNode::leaf("B", "https://b.com")]),
                ],
            )],
        );
        let dup = plan
            .parents
            .iter()
            .find(|p| p.path == vec!["Bar".to_string(), "Dup".to_string()])
            .unwrap();
        assert_eq!(dup.children.len(), 2);
        let bar = plan.parents.iter().find(|p| p.path == vec!["Bar".to_string()]).unwrap();
        assert_eq!(bar.children.len(), 1);
    }

    #[test]
    fn test_folder_inside_live_duplicate_is_relocated() {
        let store = store_with(vec![
            BookmarkNode::folder("Dup", vec![BookmarkNode::leaf("A", "https://a.com")]),
            BookmarkNode::folder("Dup", vec![BookmarkNode::folder("Sub", vec![BookmarkNode::leaf("B", "https://b.com")])]),
        ]);
        let plan = plan_for(
            &store,
            vec![BookmarkNode::folder(
                "Bar",
                vec![BookmarkNode::folder(
                    "Dup",
                    vec![
                        BookmarkNode::leaf("A", "https://a.com"),
                        BookmarkNode::folder("Sub", vec![BookmarkNode::leaf("B", "https://b.com")]),
                    ],
                )],
            )],
        );
        assert_eq!(plan.folder_moves.len(), 1);
        assert_eq!(plan.folder_moves[0].path, vec!["Bar", "Dup", "Sub"]);
        assert_eq!(plan.folder_moves[0].parent_path, vec!["Bar", "Dup"]);
        assert!(plan.moves.is_empty());
    }

    #[test]
    fn test_desired_top_level_unwraps_untitled_roots() {
        let nested = vec![BookmarkNode::folder("", vec![BookmarkNode::folder("", vec![BookmarkNode::folder("Bar", vec![])])])];
        let top = desired_top_level(&nested);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].title(), "Bar");
    }
}
