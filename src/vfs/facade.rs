//! The public file-system surface.
//!
//! [`VirtualFileSystem`] owns one provider and a virtual working directory.
//! Raw path strings are normalized against the cwd before they reach the
//! provider, capabilities are checked up front, and operations on the same
//! path are served in the order they were issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::EntryType;
use crate::config::VfsOptions;
use crate::core::{
    Capabilities, DirEntry, FsBackend, Metadata, MkdirOptions, RemoveOptions, Result, VfsError,
    VirtualPath, Watcher, WriteOptions, path,
};
use crate::hooks::{ModuleHookController, ModuleSystem};

use super::Provider;
use super::file::{OpenOptions, VirtualFile};
use super::queue::PathQueue;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A virtual file system: one provider, one working directory.
///
/// All operations are asynchronous regardless of the provider.
///
/// ### Example
///
/// ```no_run
/// # async fn demo() -> vfs_hooks::Result<()> {
/// use vfs_hooks::{MapFS, VfsOptions, VirtualFileSystem};
///
/// let vfs = VirtualFileSystem::new(MapFS::new(), VfsOptions::default());
/// vfs.mkdir("/docs", Default::default()).await?;
/// vfs.set_cwd("/docs").await?;
/// vfs.write_file("note.txt", "Hello").await?;
/// assert_eq!(vfs.read_to_string("/docs/note.txt").await?, "Hello");
/// # Ok(())
/// # }
/// ```
pub struct VirtualFileSystem {
    id: u64,
    provider: Provider,
    capabilities: Capabilities,
    options: VfsOptions,
    cwd: Mutex<VirtualPath>,
    // Serializes cwd changes against removals and renames.
    cwd_gate: AsyncMutex<()>,
    queue: PathQueue,
    hooks: Mutex<Option<ModuleHookController>>,
}

impl VirtualFileSystem {
    pub fn new(provider: impl Into<Provider>, options: VfsOptions) -> Self {
        let provider = provider.into();
        let capabilities = provider.capabilities();
        let root = provider.virtual_root();
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(id, ?capabilities, "new virtual file system");
        Self {
            id,
            provider,
            capabilities,
            options,
            cwd: Mutex::new(root),
            cwd_gate: AsyncMutex::new(()),
            queue: PathQueue::new(),
            hooks: Mutex::new(None),
        }
    }

    /// Process-unique identity of this instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn options(&self) -> &VfsOptions {
        &self.options
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn cwd(&self) -> VirtualPath {
        self.cwd_slot().clone()
    }

    /// Changes the working directory.
    ///
    /// Fails with `NotFound` if `path` does not exist and `NotADirectory` if
    /// it is not a directory. The cwd is unchanged on failure.
    pub async fn set_cwd(&self, path: impl AsRef<str>) -> Result<()> {
        if !self.options.virtual_cwd {
            return Err(VfsError::NotSupported("virtual cwd is disabled".into()));
        }
        let path = self.path(path.as_ref())?;
        let _gate = self.cwd_gate.lock().await;
        let meta = self.stat_at(&path).await?;
        if !meta.is_dir() {
            return Err(VfsError::NotADirectory(path.to_string()));
        }
        debug!(cwd = %path, "set cwd");
        *self.cwd_slot() = path;
        Ok(())
    }

    /// `{scheme}:{path}`, the URL handed out by the module hooks.
    pub fn to_url(&self, path: &VirtualPath) -> String {
        format!("{}:{}", self.options.scheme, path)
    }

    /// True for strings starting with `{scheme}:`.
    pub fn is_url(&self, s: &str) -> bool {
        s.strip_prefix(self.options.scheme.as_str())
            .is_some_and(|rest| rest.starts_with(':'))
    }

    pub async fn exists(&self, path: impl AsRef<str>) -> Result<bool> {
        let path = self.path(path.as_ref())?;
        self.require(Capabilities::READ, "exists", &path)?;
        let _guard = self.queue.lock(&path).await;
        self.provider.exists(&path).await
    }

    pub async fn stat(&self, path: impl AsRef<str>) -> Result<Metadata> {
        let path = self.path(path.as_ref())?;
        self.stat_at(&path).await
    }

    pub async fn read_file(&self, path: impl AsRef<str>) -> Result<Vec<u8>> {
        let path = self.path(path.as_ref())?;
        self.require(Capabilities::READ, "read_file", &path)?;
        let _guard = self.queue.lock(&path).await;
        self.provider.read_file(&path).await
    }

    /// Reads a file as UTF-8. Invalid UTF-8 fails with `Io`.
    pub async fn read_to_string(&self, path: impl AsRef<str>) -> Result<String> {
        let raw = path.as_ref();
        let bytes = self.read_file(raw).await?;
        String::from_utf8(bytes).map_err(|err| VfsError::Io(format!("{raw}: {err}")))
    }

    /// Creates or truncates `path` and writes `data` into it.
    pub async fn write_file(&self, path: impl AsRef<str>, data: impl AsRef<[u8]>) -> Result<()> {
        self.write_file_with(path, data, WriteOptions::default()).await
    }

    pub async fn append_file(&self, path: impl AsRef<str>, data: impl AsRef<[u8]>) -> Result<()> {
        self.write_file_with(path, data, WriteOptions::append()).await
    }

    pub async fn write_file_with(
        &self,
        path: impl AsRef<str>,
        data: impl AsRef<[u8]>,
        options: WriteOptions,
    ) -> Result<()> {
        let path = self.path(path.as_ref())?;
        self.require(Capabilities::WRITE, "write_file", &path)?;
        let _guard = self.queue.lock(&path).await;
        self.provider.write_file(&path, data.as_ref(), options).await
    }

    pub async fn read_dir(&self, path: impl AsRef<str>) -> Result<Vec<DirEntry>> {
        let path = self.path(path.as_ref())?;
        self.require(Capabilities::LIST, "read_dir", &path)?;
        let _guard = self.queue.lock(&path).await;
        self.provider.read_dir(&path).await
    }

    pub async fn mkdir(&self, path: impl AsRef<str>, options: MkdirOptions) -> Result<()> {
        let path = self.path(path.as_ref())?;
        self.require(Capabilities::WRITE, "mkdir", &path)?;
        let _guard = self.queue.lock(&path).await;
        self.provider.mkdir(&path, options).await
    }

    /// Removes a file or directory.
    ///
    /// Removing the cwd or one of its ancestors fails with `InvalidPath`
    /// before anything is touched.
    pub async fn remove(&self, path: impl AsRef<str>, options: RemoveOptions) -> Result<()> {
        let path = self.path(path.as_ref())?;
        self.require(Capabilities::WRITE, "remove", &path)?;
        let _gate = self.cwd_gate.lock().await;
        self.check_not_cwd(&path, "remove")?;
        let _guard = self.queue.lock(&path).await;
        self.provider.remove(&path, options).await
    }

    /// Moves `from` to `to`. Moving the cwd or one of its ancestors fails
    /// with `InvalidPath`.
    pub async fn rename(&self, from: impl AsRef<str>, to: impl AsRef<str>) -> Result<()> {
        let from = self.path(from.as_ref())?;
        let to = self.path(to.as_ref())?;
        self.require(Capabilities::RENAME, "rename", &from)?;
        let _gate = self.cwd_gate.lock().await;
        self.check_not_cwd(&from, "rename")?;
        let _guards = self.queue.lock_pair(&from, &to).await;
        self.provider.rename(&from, &to).await
    }

    pub async fn symlink(&self, target: impl AsRef<str>, link: impl AsRef<str>) -> Result<()> {
        let target = self.path(target.as_ref())?;
        let link = self.path(link.as_ref())?;
        self.require(Capabilities::SYMLINK, "symlink", &link)?;
        let _guard = self.queue.lock(&link).await;
        self.provider.symlink(&target, &link).await
    }

    pub async fn read_link(&self, path: impl AsRef<str>) -> Result<VirtualPath> {
        let path = self.path(path.as_ref())?;
        self.require(Capabilities::SYMLINK, "read_link", &path)?;
        let _guard = self.queue.lock(&path).await;
        self.provider.read_link(&path).await
    }

    pub async fn watch(&self, path: impl AsRef<str>) -> Result<Watcher> {
        let path = self.path(path.as_ref())?;
        self.require(Capabilities::WATCH, "watch", &path)?;
        self.provider.watch(&path).await
    }

    /// Every entry below `path`, directories before their content.
    /// Siblings come in the provider's `read_dir` order.
    pub async fn tree(&self, path: impl AsRef<str>) -> Result<Vec<VirtualPath>> {
        let root = self.path(path.as_ref())?;
        self.require(Capabilities::LIST, "tree", &root)?;

        let mut result = Vec::new();
        let mut pending: Vec<(VirtualPath, EntryType)> = Vec::new();
        self.push_children(&root, &mut pending).await?;

        while let Some((path, kind)) = pending.pop() {
            if kind == EntryType::Directory {
                self.push_children(&path, &mut pending).await?;
            }
            result.push(path);
        }
        Ok(result)
    }

    async fn push_children(
        &self,
        dir: &VirtualPath,
        pending: &mut Vec<(VirtualPath, EntryType)>,
    ) -> Result<()> {
        let entries = {
            let _guard = self.queue.lock(dir).await;
            self.provider.read_dir(dir).await?
        };
        for entry in entries.into_iter().rev() {
            pending.push((dir.join(&entry.name)?, entry.kind));
        }
        Ok(())
    }

    /// Resolves a module specifier to a virtual path.
    ///
    /// - a `{scheme}:` prefix is stripped first;
    /// - absolute specifiers are normalized as is;
    /// - `.`, `..`, `./x` and `../x` resolve against `from_dir` (cwd if `None`);
    /// - bare specifiers need the `PACKAGE_RESOLUTION` capability, otherwise
    ///   they fail with `NotSupported`.
    pub async fn resolve(
        &self,
        specifier: &str,
        from_dir: Option<&VirtualPath>,
    ) -> Result<VirtualPath> {
        let specifier = self.strip_scheme(specifier);
        if specifier.is_empty() {
            return Err(VfsError::InvalidPath("empty specifier".into()));
        }
        if specifier.starts_with('/') {
            return VirtualPath::parse(specifier);
        }

        let base = match from_dir {
            Some(dir) => dir.clone(),
            None => self.cwd(),
        };
        if is_relative_specifier(specifier) {
            return path::normalize(specifier, &base);
        }
        if self.capabilities.contains(Capabilities::PACKAGE_RESOLUTION) {
            return self.provider.resolve_package(specifier, &base).await;
        }
        Err(VfsError::NotSupported(format!(
            "bare specifier '{specifier}' cannot be resolved"
        )))
    }

    /// Opens a buffered handle on `path`.
    pub async fn open(&self, path: impl AsRef<str>, options: &OpenOptions) -> Result<VirtualFile<'_>> {
        let path = self.path(path.as_ref())?;
        VirtualFile::open(self, path, options).await
    }

    /// Installs module hooks on `host` routed through this file system.
    ///
    /// Replaces hooks previously enabled on another host. Fails with
    /// `AlreadyInstalled` if a different file system owns `host`'s hooks.
    pub fn enable_module_hooks(self: &Arc<Self>, host: Arc<ModuleSystem>) -> Result<()> {
        let mut slot = self.hooks_slot();
        if let Some(current) = slot.as_ref() {
            if Arc::ptr_eq(current.host(), &host) {
                return current.install(self);
            }
        }
        let controller = ModuleHookController::new(host);
        controller.install(self)?;
        if let Some(previous) = slot.replace(controller) {
            previous.uninstall();
        }
        Ok(())
    }

    pub fn hooks_installed(&self) -> bool {
        self.hooks_slot()
            .as_ref()
            .is_some_and(|controller| controller.is_installed())
    }

    /// Uninstalls the module hooks, if any. Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(controller) = self.hooks_slot().take() {
            controller.uninstall();
        }
    }

    pub(crate) async fn stat_at(&self, path: &VirtualPath) -> Result<Metadata> {
        self.require(Capabilities::READ, "stat", path)?;
        let _guard = self.queue.lock(path).await;
        self.provider.stat(path).await
    }

    fn path(&self, raw: &str) -> Result<VirtualPath> {
        path::normalize(raw, &self.cwd())
    }

    fn strip_scheme<'s>(&self, specifier: &'s str) -> &'s str {
        specifier
            .strip_prefix(self.options.scheme.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(specifier)
    }

    fn require(&self, capability: Capabilities, op: &str, path: &VirtualPath) -> Result<()> {
        if self.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(VfsError::NotSupported(format!("{op} on {path}")))
        }
    }

    fn check_not_cwd(&self, path: &VirtualPath, op: &str) -> Result<()> {
        let cwd = self.cwd();
        if path.is_ancestor_of(&cwd) {
            return Err(VfsError::InvalidPath(format!(
                "cannot {op} {path}: it contains the working directory {cwd}"
            )));
        }
        Ok(())
    }

    fn cwd_slot(&self) -> MutexGuard<'_, VirtualPath> {
        self.cwd.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hooks_slot(&self) -> MutexGuard<'_, Option<ModuleHookController>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for VirtualFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFileSystem")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("cwd", &self.cwd())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Drop for VirtualFileSystem {
    fn drop(&mut self) {
        let controller = self
            .hooks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(controller) = controller {
            if controller.is_installed() {
                warn!(id = self.id, "module hooks were not disposed, uninstalling on drop");
            }
            controller.uninstall();
        }
    }
}

/// `.`, `..`, `./x` or `../x`.
pub(crate) fn is_relative_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}
