//! Provider capability interface shared by every storage backend.

pub mod error;
pub mod path;

use std::any::Any;
use std::time::SystemTime;

use async_trait::async_trait;
use bitflags::bitflags;
use tokio::sync::mpsc;

use crate::EntryType;
pub use error::{ErrorKind, Result, VfsError};
pub use path::VirtualPath;

bitflags! {
    /// Operations a provider supports. Fixed for the provider's lifetime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const READ = 0b0000_0001;
        const WRITE = 0b0000_0010;
        const LIST = 0b0000_0100;
        const RENAME = 0b0000_1000;
        const SYMLINK = 0b0001_0000;
        const WATCH = 0b0010_0000;
        /// Bare specifiers (`lodash`, `@scope/pkg`) can be resolved.
        const PACKAGE_RESOLUTION = 0b0100_0000;
    }
}

/// Modification time as reported by a provider.
///
/// Providers that cannot track modification times report `Unsupported`
/// instead of inventing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mtime {
    Known(SystemTime),
    Unsupported,
}

impl Mtime {
    pub fn known(&self) -> Option<SystemTime> {
        match self {
            Mtime::Known(time) => Some(*time),
            Mtime::Unsupported => None,
        }
    }
}

/// Result of `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: EntryType,
    /// Size in bytes, 0 for directories.
    pub size: u64,
    pub mtime: Mtime,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.kind == EntryType::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryType::Directory
    }
}

/// A single child returned by `read_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry (not the full path).
    pub name: String,
    pub kind: EntryType,
}

/// How `write_file` treats existing and missing targets.
///
/// - missing target, `create == false` → `NotFound`;
/// - existing target, neither `truncate` nor `append` → `AlreadyExists`;
/// - `create_parents` creates missing parent directories first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
    pub create_parents: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            create: true,
            truncate: true,
            append: false,
            create_parents: false,
        }
    }
}

impl WriteOptions {
    /// Creates the file, failing if it already exists.
    pub fn create_new() -> Self {
        Self {
            create: true,
            truncate: false,
            append: false,
            create_parents: false,
        }
    }

    /// Appends to the file, creating it if missing.
    pub fn append() -> Self {
        Self {
            create: true,
            truncate: false,
            append: true,
            create_parents: false,
        }
    }

    pub fn with_parents(mut self) -> Self {
        self.create_parents = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MkdirOptions {
    pub recursive: bool,
}

impl MkdirOptions {
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub recursive: bool,
}

impl RemoveOptions {
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Modify,
    Remove,
    Other,
}

/// A change observed below a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: VirtualPath,
}

/// Stream of [`WatchEvent`]s. Watching stops when the value is dropped.
pub struct Watcher {
    events: mpsc::UnboundedReceiver<WatchEvent>,
    _backend: Box<dyn Any + Send>,
}

impl Watcher {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<WatchEvent>,
        backend: Box<dyn Any + Send>,
    ) -> Self {
        Self {
            events,
            _backend: backend,
        }
    }

    /// Waits for the next event. Returns `None` once the backend has stopped.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

/// Contract implemented by every storage backend.
///
/// Paths are always canonical [`VirtualPath`]s; raw strings are resolved by
/// the facade before reaching a provider. Failures use the shared
/// [`VfsError`] taxonomy only.
#[async_trait]
pub trait FsBackend: Send + Sync {
    /// Operations this provider supports. Must not change over its lifetime.
    fn capabilities(&self) -> Capabilities;

    /// Directory the provider is mounted at. Every path it serves lies below it.
    fn virtual_root(&self) -> VirtualPath {
        VirtualPath::root()
    }

    async fn stat(&self, path: &VirtualPath) -> Result<Metadata>;

    async fn read_file(&self, path: &VirtualPath) -> Result<Vec<u8>>;

    async fn write_file(&self, path: &VirtualPath, data: &[u8], options: WriteOptions)
    -> Result<()>;

    async fn read_dir(&self, path: &VirtualPath) -> Result<Vec<DirEntry>>;

    async fn mkdir(&self, path: &VirtualPath, options: MkdirOptions) -> Result<()>;

    async fn remove(&self, path: &VirtualPath, options: RemoveOptions) -> Result<()>;

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<()>;

    async fn exists(&self, path: &VirtualPath) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(VfsError::NotFound(_)) | Err(VfsError::NotADirectory(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Creates `link` pointing at `target`.
    async fn symlink(&self, target: &VirtualPath, link: &VirtualPath) -> Result<()> {
        let _ = target;
        Err(VfsError::NotSupported(format!("symlink: {link}")))
    }

    async fn read_link(&self, path: &VirtualPath) -> Result<VirtualPath> {
        Err(VfsError::NotSupported(format!("read_link: {path}")))
    }

    async fn watch(&self, path: &VirtualPath) -> Result<Watcher> {
        Err(VfsError::NotSupported(format!("watch: {path}")))
    }

    /// Resolves a bare specifier (`pkg/sub`) seen from `from_dir`.
    async fn resolve_package(&self, specifier: &str, from_dir: &VirtualPath) -> Result<VirtualPath> {
        let _ = from_dir;
        Err(VfsError::NotSupported(format!(
            "bare specifier '{specifier}' needs package resolution"
        )))
    }
}
