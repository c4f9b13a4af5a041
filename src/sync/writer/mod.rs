//! Incremental writer: converges a live bookmark tree onto a desired one.
//!
//! A pass indexes the live tree once, classifies every desired entry, then
//! applies the work in strict phases: delete, update, move, reorder, create,
//! and finally prune of folders that no longer exist in the desired tree.
//! Each primitive is attempted on its own; failures are collected and the
//! pass keeps going.

mod index;
mod plan;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::bookmarks::{walk_leaves, BookmarkNode, BookmarkTreeStore, CreateDetails, MoveDestination, TreeStoreError};

pub use index::{BrowserBookmarkIndex, IndexedNode, WriteScope};
pub use plan::{build_plan, desired_top_level, DesiredChild, DesiredParent, ReconcilePlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteOperation {
    Create,
    Delete,
    Update,
    Move,
    Reorder,
    CreateFolder,
    RemoveFolder,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteError {
    pub operation: WriteOperation,
    /// Title, path or id of the node the operation was about
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    pub created: usize,
    pub deleted: usize,
    pub updated: usize,
    pub moved: usize,
    pub reordered: usize,
    pub folders_created: usize,
    pub folders_removed: usize,
}

impl ReconcileStats {
    pub fn total(&self) -> usize {
        self.created
            + self.deleted
            + self.updated
            + self.moved
            + self.reordered
            + self.folders_created
            + self.folders_removed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    pub success: bool,
    /// Number of primitive operations actually applied
    pub change_count: usize,
    pub errors: Vec<WriteError>,
    pub stats: ReconcileStats,
}

impl ReconcileResult {
    fn record_error(&mut self, operation: WriteOperation, target: impl Into<String>, error: impl Display) {
        let target = target.into();
        log::warn!("Writer: {:?} '{}' failed: {}", operation, target, error);
        self.errors.push(WriteError {
            operation,
            target,
            message: error.to_string(),
        });
    }

    fn finish(mut self) -> Self {
        self.change_count = self.stats.total();
        self.success = self.errors.is_empty();
        self
    }
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.join("/")
    }
}

fn created_id(node: &BookmarkNode) -> Result<String, TreeStoreError> {
    node.id()
        .map(str::to_string)
        .ok_or_else(|| TreeStoreError::InvalidOperation("store returned a node without id".to_string()))
}

/// Applies a desired tree to a [`BookmarkTreeStore`].
pub struct IncrementalWriter<'a> {
    store: &'a dyn BookmarkTreeStore,
}

impl<'a> IncrementalWriter<'a> {
    pub fn new(store: &'a dyn BookmarkTreeStore) -> Self {
        Self { store }
    }

    async fn read_scope(&self, scope: &WriteScope) -> Result<Vec<BookmarkNode>, TreeStoreError> {
        match scope {
            WriteScope::FullTree => self.store.get_full_tree().await,
            WriteScope::Folder(id) => self.store.get_subtree(id).await,
        }
    }

    /// Current child ids of a folder, straight from the store
    async fn child_ids(&self, parent_id: &str) -> Result<Vec<String>, TreeStoreError> {
        let subtree = self.store.get_subtree(parent_id).await?;
        Ok(subtree
            .first()
            .map(|node| node.children().iter().filter_map(|c| c.id().map(str::to_string)).collect())
            .unwrap_or_default())
    }

    /// Converge the live tree under `scope` onto `desired`.
    ///
    /// Only a failure to read the live tree is returned as `Err`; everything
    /// else ends up in [`ReconcileResult::errors`].
    pub async fn reconcile(
        &self,
        desired: &[BookmarkNode],
        scope: &WriteScope,
    ) -> Result<ReconcileResult, TreeStoreError> {
        let live = self.read_scope(scope).await?;
        let mut index = BrowserBookmarkIndex::build(&live, scope)?;
        let plan = build_plan(desired, &index);
        let mut result = ReconcileResult::default();

        let mut dirty: HashSet<Vec<String>> = plan.out_of_order.clone();
        dirty.extend(plan.reorders.iter().map(|r| r.parent_path.clone()));
        dirty.extend(plan.moves.iter().map(|m| m.parent_path.clone()));
        dirty.extend(plan.folder_moves.iter().map(|m| m.parent_path.clone()));

        self.apply_deletes(&plan, &mut result).await;
        self.apply_updates(&plan, &mut result).await;
        self.apply_folder_moves(&plan, &index, &mut result).await;
        self.apply_moves(&plan, &mut index, &mut dirty, &mut result).await;
        self.apply_reorders(&plan, &index, &dirty, &mut result).await;
        self.apply_creates(&plan, &mut index, &mut result).await;
        self.prune_folders(&plan, &index, &mut result).await;

        let result = result.finish();
        log::info!(
            "Writer: reconciled {} changes ({} created, {} deleted, {} moved, {} reordered, {} updated), {} errors",
            result.change_count,
            result.stats.created,
            result.stats.deleted,
            result.stats.moved,
            result.stats.reordered,
            result.stats.updated,
            result.errors.len()
        );
        Ok(result)
    }

    async fn apply_deletes(&self, plan: &ReconcilePlan, result: &mut ReconcileResult) {
        for delete in &plan.deletes {
            match self.store.remove(&delete.id).await {
                Ok(()) => {
                    log::debug!("Writer: deleted '{}' ({})", delete.title, delete.id);
                    result.stats.deleted += 1;
                }
                Err(e) => result.record_error(WriteOperation::Delete, &delete.title, e),
            }
        }
    }

    async fn apply_updates(&self, plan: &ReconcilePlan, result: &mut ReconcileResult) {
        for update in &plan.updates {
            match self.store.update(&update.id, &update.title).await {
                Ok(()) => {
                    log::debug!("Writer: renamed '{}' -> '{}'", update.old_title, update.title);
                    result.stats.updated += 1;
                }
                Err(e) => result.record_error(WriteOperation::Update, &update.title, e),
            }
        }
    }

    /// Pull canonical folders out of duplicates of their parent. Appended at
    /// the end; the reorder phase puts them in place.
    async fn apply_folder_moves(&self, plan: &ReconcilePlan, index: &BrowserBookmarkIndex, result: &mut ReconcileResult) {
        for planned in &plan.folder_moves {
            let Some(parent_id) = index.folder_id(&planned.parent_path) else {
                continue;
            };
            let destination = MoveDestination {
                parent_id: Some(parent_id.to_string()),
                index: None,
            };
            match self.store.move_node(&planned.id, destination).await {
                Ok(()) => {
                    log::debug!("Writer: merged folder {} into its canonical parent", display_path(&planned.path));
                    result.stats.moved += 1;
                }
                Err(e) => result.record_error(WriteOperation::Move, display_path(&planned.path), e),
            }
        }
    }

    async fn apply_moves(
        &self,
        plan: &ReconcilePlan,
        index: &mut BrowserBookmarkIndex,
        dirty: &mut HashSet<Vec<String>>,
        result: &mut ReconcileResult,
    ) {
        for planned in &plan.moves {
            let parent_id = match self.ensure_folder(index, &planned.parent_path, dirty, result).await {
                Ok(id) => id,
                Err(e) => {
                    result.record_error(WriteOperation::CreateFolder, display_path(&planned.parent_path), e);
                    continue;
                }
            };
            let destination = MoveDestination {
                parent_id: Some(parent_id),
                index: Some(planned.index),
            };
            match self.store.move_node(&planned.id, destination).await {
                Ok(()) => {
                    log::debug!(
                        "Writer: moved '{}' to {}",
                        planned.title,
                        display_path(&planned.parent_path)
                    );
                    result.stats.moved += 1;
                }
                Err(e) => result.record_error(WriteOperation::Move, &planned.title, e),
            }
        }
    }

    /// Resolve a folder path to a live id, creating missing folders from the
    /// deepest existing ancestor down. New folders are appended and their
    /// parent is marked for reordering.
    async fn ensure_folder(
        &self,
        index: &mut BrowserBookmarkIndex,
        path: &[String],
        dirty: &mut HashSet<Vec<String>>,
        result: &mut ReconcileResult,
    ) -> Result<String, TreeStoreError> {
        if let Some(id) = index.folder_id(path) {
            return Ok(id.to_string());
        }

        let mut depth = path.len();
        while depth > 0 && index.folder_id(&path[..depth]).is_none() {
            depth -= 1;
        }
        let mut parent_id = index
            .folder_id(&path[..depth])
            .map(str::to_string)
            .ok_or_else(|| TreeStoreError::NotFound(display_path(&path[..depth])))?;

        for end in depth + 1..=path.len() {
            let created = self
                .store
                .create(CreateDetails {
                    parent_id: parent_id.clone(),
                    title: path[end - 1].clone(),
                    url: None,
                    index: None,
                })
                .await?;
            let id = created_id(&created)?;
            log::debug!("Writer: created folder {}", display_path(&path[..end]));
            index.register_folder(path[..end].to_vec(), id.clone());
            dirty.insert(path[..end - 1].to_vec());
            result.stats.folders_created += 1;
            parent_id = id;
        }
        Ok(parent_id)
    }

    /// Live id of an existing desired child of `parent`
    fn existing_child_id<'p>(
        index: &'p BrowserBookmarkIndex,
        parent: &'p DesiredParent,
        child: &'p DesiredChild,
    ) -> Option<&'p str> {
        match child {
            DesiredChild::Bookmark { matched, .. } => matched.as_deref(),
            DesiredChild::Folder { title } => index.folder_id(&parent.child_path(title)),
        }
    }

    async fn apply_reorders(
        &self,
        plan: &ReconcilePlan,
        index: &BrowserBookmarkIndex,
        dirty: &HashSet<Vec<String>>,
        result: &mut ReconcileResult,
    ) {
        for parent in plan.parents.iter().filter(|p| dirty.contains(&p.path)) {
            let Some(parent_id) = index.folder_id(&parent.path) else {
                continue;
            };
            let mut mirror = match self.child_ids(parent_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    result.record_error(WriteOperation::Read, display_path(&parent.path), e);
                    continue;
                }
            };

            // Walk the desired order, placing each child right after the
            // previous one and replaying every physical move on the mirror.
            let mut previous: Option<usize> = None;
            for child in &parent.children {
                let Some(id) = Self::existing_child_id(index, parent, child) else {
                    continue;
                };
                let Some(position) = mirror.iter().position(|m| m == id) else {
                    continue;
                };
                let target = previous.map_or(0, |p| p + 1);
                if position == target {
                    previous = Some(position);
                    continue;
                }

                let final_index = if position < target { target - 1 } else { target };
                let destination = MoveDestination {
                    parent_id: Some(parent_id.to_string()),
                    index: Some(final_index),
                };
                match self.store.move_node(id, destination).await {
                    Ok(()) => {
                        let moved = mirror.remove(position);
                        mirror.insert(final_index, moved);
                        previous = Some(final_index);
                        result.stats.reordered += 1;
                    }
                    Err(e) => {
                        result.record_error(WriteOperation::Reorder, id, e);
                        previous = Some(position);
                    }
                }
            }
        }
    }

    async fn apply_creates(&self, plan: &ReconcilePlan, index: &mut BrowserBookmarkIndex, result: &mut ReconcileResult) {
        let mut failed: Vec<Vec<String>> = Vec::new();
        let mut unused_dirty = HashSet::new();
        let pending: HashSet<&[String]> = plan.creates.iter().map(|c| c.parent_path.as_slice()).collect();

        for parent in &plan.parents {
            if failed.iter().any(|f| parent.path.starts_with(f)) {
                continue;
            }

            let parent_id = match index.folder_id(&parent.path) {
                Some(id) => id.to_string(),
                None => match self.ensure_folder(index, &parent.path, &mut unused_dirty, result).await {
                    Ok(id) => id,
                    Err(e) => {
                        result.record_error(WriteOperation::CreateFolder, display_path(&parent.path), e);
                        failed.push(parent.path.clone());
                        continue;
                    }
                },
            };

            let missing = pending.contains(parent.path.as_slice())
                || parent.children.iter().any(|child| match child {
                    DesiredChild::Folder { .. } => Self::existing_child_id(index, parent, child).is_none(),
                    DesiredChild::Bookmark { .. } => false,
                });
            if !missing {
                continue;
            }

            let mut mirror = match self.child_ids(&parent_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    result.record_error(WriteOperation::Read, display_path(&parent.path), e);
                    continue;
                }
            };

            let mut previous: Option<usize> = None;
            for child in &parent.children {
                if let Some(id) = Self::existing_child_id(index, parent, child) {
                    if let Some(position) = mirror.iter().position(|m| m == id) {
                        previous = Some(position);
                    }
                    continue;
                }

                let at = previous.map_or(0, |p| p + 1);
                let (details, operation) = match child {
                    DesiredChild::Bookmark { url, title, .. } => (
                        CreateDetails {
                            parent_id: parent_id.clone(),
                            title: title.clone(),
                            url: Some(url.clone()),
                            index: Some(at),
                        },
                        WriteOperation::Create,
                    ),
                    DesiredChild::Folder { title } => (
                        CreateDetails {
                            parent_id: parent_id.clone(),
                            title: title.clone(),
                            url: None,
                            index: Some(at),
                        },
                        WriteOperation::CreateFolder,
                    ),
                };
                let title = details.title.clone();

                let created = match self.store.create(details).await {
                    Ok(node) => created_id(&node),
                    Err(e) => Err(e),
                };
                match created {
                    Ok(id) => {
                        let at = at.min(mirror.len());
                        mirror.insert(at, id.clone());
                        previous = Some(at);
                        if let DesiredChild::Folder { title } = child {
                            index.register_folder(parent.child_path(title), id);
                            result.stats.folders_created += 1;
                        } else {
                            result.stats.created += 1;
                        }
                        log::debug!("Writer: created '{}' in {}", title, display_path(&parent.path));
                    }
                    Err(e) => {
                        result.record_error(operation, &title, e);
                        if let DesiredChild::Folder { title } = child {
                            failed.push(parent.child_path(title));
                        }
                    }
                }
            }
        }
    }

    /// Remove live folders that have no place in the desired tree, along with
    /// duplicates of folders that do.
    async fn prune_folders(&self, plan: &ReconcilePlan, index: &BrowserBookmarkIndex, result: &mut ReconcileResult) {
        let desired_paths = plan.desired_folder_paths();
        let canonical: HashSet<&str> = desired_paths.iter().filter_map(|p| index.folder_id(p)).collect();
        let mut removed: Vec<&str> = Vec::new();

        for id in index.folders() {
            let Some(node) = index.node(id) else {
                continue;
            };
            if canonical.contains(id.as_str()) {
                continue;
            }
            if removed.iter().any(|r| *r == node.parent_id) {
                removed.push(id);
                continue;
            }

            let path = node.path();
            let subtree = match self.store.get_subtree(id).await {
                Ok(subtree) => subtree,
                Err(e) => {
                    result.record_error(WriteOperation::Read, display_path(&path), e);
                    continue;
                }
            };
            if holds_kept_nodes(&subtree, &plan.kept, &canonical) {
                result.record_error(
                    WriteOperation::RemoveFolder,
                    display_path(&path),
                    "folder still holds bookmarks that belong to the desired tree",
                );
                continue;
            }

            match self.store.remove_subtree(id).await {
                Ok(()) => {
                    log::debug!("Writer: removed folder {}", display_path(&path));
                    result.stats.folders_removed += 1;
                    removed.push(id);
                }
                Err(e) => result.record_error(WriteOperation::RemoveFolder, display_path(&path), e),
            }
        }
    }

    /// Throw away everything under the scope and rebuild it from `desired`.
    /// Every id changes; meant as a recovery path only.
    pub async fn full_replace(
        &self,
        desired: &[BookmarkNode],
        scope: &WriteScope,
    ) -> Result<ReconcileResult, TreeStoreError> {
        let live = self.read_scope(scope).await?;
        let index = BrowserBookmarkIndex::build(&live, scope)?;
        let desired = desired_top_level(desired);
        let mut result = ReconcileResult::default();

        let containers: Vec<String> = match scope {
            WriteScope::FullTree => index.children_of(index.root_id()).to_vec(),
            WriteScope::Folder(_) => vec![index.root_id().to_string()],
        };
        for container in &containers {
            self.clear_children(container, &index, &mut result).await;
        }

        let mut queue: VecDeque<(String, &[BookmarkNode])> = VecDeque::new();
        match scope {
            WriteScope::Folder(_) => queue.push_back((index.root_id().to_string(), desired)),
            WriteScope::FullTree => {
                let by_title: HashMap<&str, &str> = containers
                    .iter()
                    .filter_map(|id| index.node(id).map(|n| (n.title.as_str(), id.as_str())))
                    .collect();
                for node in desired {
                    match (node, by_title.get(node.title())) {
                        (BookmarkNode::Folder(folder), Some(id)) => {
                            queue.push_back((id.to_string(), folder.children.as_slice()))
                        }
                        _ => result.record_error(
                            WriteOperation::Create,
                            node.title(),
                            "no matching top-level container",
                        ),
                    }
                }
            }
        }

        while let Some((parent_id, children)) = queue.pop_front() {
            for child in children {
                let details = CreateDetails {
                    parent_id: parent_id.clone(),
                    title: child.title().to_string(),
                    url: child.url().map(str::to_string),
                    index: None,
                };
                let created = match self.store.create(details).await {
                    Ok(node) => created_id(&node),
                    Err(e) => Err(e),
                };
                match (created, child) {
                    (Ok(_), BookmarkNode::Leaf(_)) => result.stats.created += 1,
                    (Ok(id), BookmarkNode::Folder(folder)) => {
                        result.stats.folders_created += 1;
                        queue.push_back((id, folder.children.as_slice()));
                    }
                    (Err(e), BookmarkNode::Leaf(_)) => result.record_error(WriteOperation::Create, child.title(), e),
                    (Err(e), BookmarkNode::Folder(_)) => {
                        result.record_error(WriteOperation::CreateFolder, child.title(), e)
                    }
                }
            }
        }

        let result = result.finish();
        log::info!(
            "Writer: full replace applied {} changes, {} errors",
            result.change_count,
            result.errors.len()
        );
        Ok(result)
    }

    async fn clear_children(&self, container: &str, index: &BrowserBookmarkIndex, result: &mut ReconcileResult) {
        for id in index.children_of(container) {
            let Some(node) = index.node(id) else {
                continue;
            };
            if node.url.is_some() {
                match self.store.remove(id).await {
                    Ok(()) => result.stats.deleted += 1,
                    Err(e) => result.record_error(WriteOperation::Delete, &node.title, e),
                }
            } else {
                match self.store.remove_subtree(id).await {
                    Ok(()) => result.stats.folders_removed += 1,
                    Err(e) => result.record_error(WriteOperation::RemoveFolder, node.path().join("/"), e),
                }
            }
        }
    }
}

/// Whether a live subtree still contains a kept leaf or a folder that the
/// desired tree maps onto.
fn holds_kept_nodes(subtree: &[BookmarkNode], kept: &HashSet<String>, canonical: &HashSet<&str>) -> bool {
    let leaf_kept = walk_leaves(subtree)
        .iter()
        .any(|visit| visit.bookmark.id.as_ref().is_some_and(|id| kept.contains(id)));
    leaf_kept || subtree.iter().any(|node| holds_canonical_folder(node.children(), canonical))
}

fn holds_canonical_folder(nodes: &[BookmarkNode], canonical: &HashSet<&str>) -> bool {
    nodes.iter().any(|node| match node {
        BookmarkNode::Folder(folder) => {
            folder.id.as_deref().is_some_and(|id| canonical.contains(id))
                || holds_canonical_folder(&folder.children, canonical)
        }
        BookmarkNode::Leaf(_) => false,
    })
}
