use serde::{Deserialize, Serialize};

/// A node of a bookmark tree.
///
/// Leaves carry a URL, folders carry ordered children. On the wire the two are
/// told apart only by the presence of `url`, which is what [`RawNode`] handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNode", into = "RawNode")]
pub enum BookmarkNode {
    Leaf(Bookmark),
    Folder(Folder),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub id: Option<String>,
    pub title: String,
    pub url: String,
    pub date_added: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Folder {
    pub id: Option<String>,
    pub title: String,
    pub children: Vec<BookmarkNode>,
    pub date_added: Option<i64>,
}

/// Browser-shaped JSON node: `{id?, title, url?, children?, dateAdded?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<BookmarkNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_added: Option<i64>,
}

impl From<RawNode> for BookmarkNode {
    fn from(raw: RawNode) -> Self {
        match raw.url {
            Some(url) => BookmarkNode::Leaf(Bookmark {
                id: raw.id,
                title: raw.title,
                url,
                date_added: raw.date_added,
            }),
            None => BookmarkNode::Folder(Folder {
                id: raw.id,
                title: raw.title,
                children: raw.children.unwrap_or_default(),
                date_added: raw.date_added,
            }),
        }
    }
}

impl From<BookmarkNode> for RawNode {
    fn from(node: BookmarkNode) -> Self {
        match node {
            BookmarkNode::Leaf(b) => RawNode {
                id: b.id,
                title: b.title,
                url: Some(b.url),
                children: None,
                date_added: b.date_added,
            },
            BookmarkNode::Folder(f) => RawNode {
                id: f.id,
                title: f.title,
                url: None,
                children: Some(f.children),
                date_added: f.date_added,
            },
        }
    }
}

impl Bookmark {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            url: url.into(),
            date_added: None,
        }
    }
}

impl Folder {
    pub fn new(title: impl Into<String>, children: Vec<BookmarkNode>) -> Self {
        Self {
            id: None,
            title: title.into(),
            children,
            date_added: None,
        }
    }

    /// Folders with an empty title are synthetic containers (the forest root).
    /// Their title never shows up in a descendant's folder path.
    pub fn is_transparent(&self) -> bool {
        self.title.is_empty()
    }
}

impl BookmarkNode {
    pub fn leaf(title: impl Into<String>, url: impl Into<String>) -> Self {
        BookmarkNode::Leaf(Bookmark::new(title, url))
    }

    pub fn folder(title: impl Into<String>, children: Vec<BookmarkNode>) -> Self {
        BookmarkNode::Folder(Folder::new(title, children))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            BookmarkNode::Leaf(b) => b.id.as_deref(),
            BookmarkNode::Folder(f) => f.id.as_deref(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            BookmarkNode::Leaf(b) => &b.title,
            BookmarkNode::Folder(f) => &f.title,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            BookmarkNode::Leaf(b) => Some(&b.url),
            BookmarkNode::Folder(_) => None,
        }
    }

    pub fn children(&self) -> &[BookmarkNode] {
        match self {
            BookmarkNode::Leaf(_) => &[],
            BookmarkNode::Folder(f) => &f.children,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            BookmarkNode::Folder(f) => Some(f),
            BookmarkNode::Leaf(_) => None,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, BookmarkNode::Folder(_))
    }
}

/// A leaf seen during a pre-order walk, with the titles of its ancestor folders.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafVisit<'a> {
    pub bookmark: &'a Bookmark,
    pub path: Vec<String>,
}

/// Walk every leaf of a forest in pre-order, siblings in order.
pub fn walk_leaves(roots: &[BookmarkNode]) -> Vec<LeafVisit<'_>> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    collect_leaves(roots, &mut path, &mut out);
    out
}

fn collect_leaves<'a>(nodes: &'a [BookmarkNode], path: &mut Vec<String>, out: &mut Vec<LeafVisit<'a>>) {
    for node in nodes {
        match node {
            BookmarkNode::Leaf(bookmark) => out.push(LeafVisit {
                bookmark,
                path: path.clone(),
            }),
            BookmarkNode::Folder(folder) => {
                if folder.is_transparent() {
                    collect_leaves(&folder.children, path, out);
                } else {
                    path.push(folder.title.clone());
                    collect_leaves(&folder.children, path, out);
                    path.pop();
                }
            }
        }
    }
}

/// Number of URL-bearing nodes in a forest.
pub fn count_bookmarks(roots: &[BookmarkNode]) -> usize {
    roots
        .iter()
        .map(|node| match node {
            BookmarkNode::Leaf(_) => 1,
            BookmarkNode::Folder(f) => count_bookmarks(&f.children),
        })
        .sum()
}

/// Find a folder by its title path, looking through transparent containers.
pub fn find_folder<'a>(roots: &'a [BookmarkNode], path: &[String]) -> Option<&'a Folder> {
    let (first, rest) = path.split_first()?;
    for node in roots {
        let BookmarkNode::Folder(folder) = node else {
            continue;
        };
        if folder.is_transparent() {
            if let Some(found) = find_folder(&folder.children, path) {
                return Some(found);
            }
        } else if &folder.title == first {
            if rest.is_empty() {
                return Some(folder);
            }
            if let Some(found) = find_folder(&folder.children, rest) {
                return Some(found);
            }
        }
    }
    None
}

/// Split a user-facing folder path such as `"Bookmarks Bar/Work"`.
pub fn parse_folder_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
