//! This module provides a virtual filesystem (VFS) provider that keeps everything in memory.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

use crate::core::{
    Capabilities, DirEntry, FsBackend, Metadata, MkdirOptions, Mtime, RemoveOptions, Result,
    VfsError, VirtualPath, WriteOptions, path,
};
use crate::vfs::entry::Node;

/// A storage provider that keeps a hierarchical tree of nodes in memory.
///
/// `MapFS` never touches the host filesystem. Its content lives as long as the
/// provider and is not persisted anywhere.
///
/// ### Internal state
///
/// * `root`: the root `Directory` node, created on construction. Every other
///   node is owned by exactly one parent directory; there are no back
///   references.
///
/// ### Invariants
///
/// 1. **Root existence**: the root is always a directory and cannot be removed.
/// 2. **Ordering**: `read_dir()` yields children in insertion order.
/// 3. **No implicit parents**: `write_file()` into a missing directory fails
///    with `NotFound` unless `create_parents` is requested.
/// 4. **Atomic rename**: `rename()` validates both ends first and then moves
///    the node while holding the tree lock, so no other operation can observe
///    the intermediate state.
///
/// Every operation yields to the scheduler once before touching the tree,
/// so callers cannot depend on it completing synchronously.
///
/// ### Example
///
/// ```no_run
/// # async fn demo() -> vfs_hooks::Result<()> {
/// use vfs_hooks::{FsBackend, MapFS, MkdirOptions, VirtualPath, WriteOptions};
///
/// let fs = MapFS::new();
/// let docs = VirtualPath::parse("/docs")?;
/// fs.mkdir(&docs, MkdirOptions::default()).await?;
///
/// let note = docs.join("note.txt")?;
/// fs.write_file(&note, b"Hello", WriteOptions::default()).await?;
/// assert_eq!(fs.read_file(&note).await?, b"Hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MapFS {
    root: Mutex<Node>,
}

impl Default for MapFS {
    fn default() -> Self {
        Self::new()
    }
}

impl MapFS {
    /// Creates an empty provider holding only the root directory.
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Node::new_dir()),
        }
    }

    fn tree(&self) -> MutexGuard<'_, Node> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Finds the node at `path`.
fn lookup<'a>(root: &'a Node, path: &VirtualPath) -> Result<&'a Node> {
    let mut node = root;
    for name in path.components() {
        let children = node
            .children()
            .ok_or_else(|| VfsError::NotADirectory(path.to_string()))?;
        node = children
            .get(name)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
    }
    Ok(node)
}

/// Finds the directory at `dir`, creating missing directories when `create` is set.
fn dir_mut<'a>(root: &'a mut Node, dir: &VirtualPath, create: bool) -> Result<&'a mut Node> {
    let mut node = root;
    for name in dir.components() {
        node = match node {
            Node::Directory { children, .. } => {
                if create && !children.contains_key(name) {
                    children.insert(name.to_string(), Node::new_dir());
                }
                children
                    .get_mut(name)
                    .ok_or_else(|| VfsError::NotFound(dir.to_string()))?
            }
            Node::File { .. } => return Err(VfsError::NotADirectory(dir.to_string())),
        };
    }
    if !node.is_dir() {
        return Err(VfsError::NotADirectory(dir.to_string()));
    }
    Ok(node)
}

fn children_of<'a>(node: &'a mut Node, dir: &VirtualPath) -> Result<&'a mut IndexMap<String, Node>> {
    node.children_mut()
        .ok_or_else(|| VfsError::NotADirectory(dir.to_string()))
}

#[async_trait]
impl FsBackend for MapFS {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE | Capabilities::LIST | Capabilities::RENAME
    }

    async fn stat(&self, path: &VirtualPath) -> Result<Metadata> {
        tokio::task::yield_now().await;
        let tree = self.tree();
        let node = lookup(&tree, path)?;
        Ok(Metadata {
            kind: node.entry_type(),
            size: node.size(),
            mtime: Mtime::Known(node.mtime()),
        })
    }

    /// Reads the entire contents of a file.
    ///
    /// Fails with `NotFound` if the file does not exist and `IsADirectory`
    /// if `path` is a directory.
    async fn read_file(&self, path: &VirtualPath) -> Result<Vec<u8>> {
        tokio::task::yield_now().await;
        let tree = self.tree();
        match lookup(&tree, path)? {
            Node::File { bytes, .. } => Ok(bytes.clone()),
            Node::Directory { .. } => Err(VfsError::IsADirectory(path.to_string())),
        }
    }

    async fn write_file(
        &self,
        path: &VirtualPath,
        data: &[u8],
        options: WriteOptions,
    ) -> Result<()> {
        tokio::task::yield_now().await;
        if path.is_root() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }

        let mut tree = self.tree();
        let parent = dir_mut(&mut tree, &path.parent(), options.create_parents)
            .map_err(|err| match err {
                VfsError::NotFound(_) => VfsError::NotFound(path.to_string()),
                other => other,
            })?;
        let children = children_of(parent, path)?;
        let name = path.file_name();

        match children.get_mut(name) {
            Some(Node::Directory { .. }) => {
                return Err(VfsError::IsADirectory(path.to_string()));
            }
            Some(Node::File { bytes, mtime }) => {
                if options.append {
                    bytes.extend_from_slice(data);
                } else if options.truncate {
                    *bytes = data.to_vec();
                } else {
                    return Err(VfsError::AlreadyExists(path.to_string()));
                }
                *mtime = SystemTime::now();
            }
            None => {
                if !options.create {
                    return Err(VfsError::NotFound(path.to_string()));
                }
                children.insert(name.to_string(), Node::new_file(data));
                parent.touch();
            }
        }
        debug!(path = %path, len = data.len(), "memory write");
        Ok(())
    }

    /// Lists the immediate children of a directory in insertion order.
    async fn read_dir(&self, path: &VirtualPath) -> Result<Vec<DirEntry>> {
        tokio::task::yield_now().await;
        let tree = self.tree();
        let children = lookup(&tree, path)?
            .children()
            .ok_or_else(|| VfsError::NotADirectory(path.to_string()))?;
        Ok(children
            .iter()
            .map(|(name, node)| DirEntry {
                name: name.clone(),
                kind: node.entry_type(),
            })
            .collect())
    }

    async fn mkdir(&self, path: &VirtualPath, options: MkdirOptions) -> Result<()> {
        tokio::task::yield_now().await;
        let mut tree = self.tree();

        if options.recursive {
            if let Ok(existing) = lookup(&tree, path) {
                return if existing.is_dir() {
                    Ok(())
                } else {
                    Err(VfsError::AlreadyExists(path.to_string()))
                };
            }
            dir_mut(&mut tree, path, true)?;
            debug!(path = %path, "memory mkdir -p");
            return Ok(());
        }

        if path.is_root() {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        let parent = dir_mut(&mut tree, &path.parent(), false)?;
        let children = children_of(parent, path)?;
        if children.contains_key(path.file_name()) {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        children.insert(path.file_name().to_string(), Node::new_dir());
        parent.touch();
        debug!(path = %path, "memory mkdir");
        Ok(())
    }

    /// Removes a file or directory.
    ///
    /// A non-empty directory requires `recursive`, otherwise `NotEmpty` is
    /// returned. The root cannot be removed.
    async fn remove(&self, path: &VirtualPath, options: RemoveOptions) -> Result<()> {
        tokio::task::yield_now().await;
        if path.is_root() {
            return Err(VfsError::InvalidPath("the root cannot be removed".into()));
        }

        let mut tree = self.tree();
        let parent = dir_mut(&mut tree, &path.parent(), false)?;
        let children = children_of(parent, path)?;
        let name = path.file_name();

        let node = children
            .get(name)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        if node.is_dir() && !node.is_empty_dir() && !options.recursive {
            return Err(VfsError::NotEmpty(path.to_string()));
        }
        children.shift_remove(name);
        parent.touch();
        debug!(path = %path, recursive = options.recursive, "memory remove");
        Ok(())
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<()> {
        tokio::task::yield_now().await;
        if from.is_root() || to.is_root() {
            return Err(VfsError::InvalidPath("the root cannot be renamed".into()));
        }

        let mut tree = self.tree();
        let source_is_dir = lookup(&tree, from)?.is_dir();
        if from == to {
            return Ok(());
        }
        if path::is_ancestor(from, to) {
            return Err(VfsError::InvalidPath(format!(
                "cannot move {from} into its own subtree {to}"
            )));
        }

        match lookup(&tree, to) {
            Ok(existing) if existing.is_dir() && !source_is_dir => {
                return Err(VfsError::IsADirectory(to.to_string()));
            }
            Ok(existing) if !existing.is_dir() && source_is_dir => {
                return Err(VfsError::NotADirectory(to.to_string()));
            }
            Ok(existing) if !existing.is_empty_dir() && existing.is_dir() => {
                return Err(VfsError::NotEmpty(to.to_string()));
            }
            Ok(_) => {}
            Err(VfsError::NotFound(_)) => {
                lookup(&tree, &to.parent())?
                    .children()
                    .ok_or_else(|| VfsError::NotADirectory(to.to_string()))?;
            }
            Err(err) => return Err(err),
        }

        // Both ends are validated; the moves below cannot fail.
        let source_parent = dir_mut(&mut tree, &from.parent(), false)?;
        let node = children_of(source_parent, from)?
            .shift_remove(from.file_name())
            .ok_or_else(|| VfsError::NotFound(from.to_string()))?;
        source_parent.touch();

        let target_parent = dir_mut(&mut tree, &to.parent(), false)?;
        children_of(target_parent, to)?.insert(to.file_name().to_string(), node);
        target_parent.touch();

        debug!(from = %from, to = %to, "memory rename");
        Ok(())
    }
}
