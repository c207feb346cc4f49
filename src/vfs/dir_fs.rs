//! This module provides a virtual filesystem (VFS) provider that maps to a real directory
//! on the host system. Every operation is confined to a designated root.
//!
//! ### Key Features:
//! - **Isolated root**: virtual paths are translated to `host_root + path`; nothing outside
//!   the root is ever read or written.
//! - **Double containment check**: the virtual path is checked against the virtual root,
//!   then the host path is re-resolved (following host symlinks) and checked against the
//!   canonical host root. Symlinks planted inside the root after construction cannot be
//!   used to escape it.
//! - **Error mapping**: host `io::Error`s are mapped into the shared taxonomy.
//! - **Optional capabilities**: symlinks (unix only) and change watching.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use notify::{EventKind, RecursiveMode, Watcher as _};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::EntryType;
use crate::core::{
    Capabilities, DirEntry, FsBackend, Metadata, MkdirOptions, Mtime, RemoveOptions, Result,
    VfsError, VirtualPath, WatchEvent, WatchEventKind, Watcher, WriteOptions,
};

/// Whether the last path component may be a symlink that gets followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Follow {
    Yes,
    No,
}

/// A storage provider that maps a virtual subtree onto a real host directory.
///
/// ### Usage notes:
/// - Paths outside the virtual root, or host paths that resolve outside the host root,
///   fail with `InvalidPath` before any host I/O that could have side effects.
/// - Permission failures surface as `PermissionDenied`.
/// - Two `DirFS` instances over the same host root are legal but not synchronized with
///   each other.
///
/// ### Example:
/// ```no_run
/// # async fn demo() -> vfs_hooks::Result<()> {
/// use vfs_hooks::{DirFS, FsBackend, VirtualPath, WriteOptions};
///
/// let fs = DirFS::new(std::env::temp_dir().join("my_vfs"))?;
/// let note = VirtualPath::parse("/note.txt")?;
/// fs.write_file(&note, b"Hello", WriteOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DirFS {
    virtual_root: VirtualPath, // inner absolute normalized path
    host_root: PathBuf,        // host-related absolute canonical path
    read_only: bool,
}

impl DirFS {
    /// Creates a provider mapping the virtual root `/` onto `host_root`.
    ///
    /// * `host_root` must be an absolute host path. If it does not exist it is created.
    ///   If it exists and is not a directory, `NotADirectory` is returned.
    pub fn new<P: AsRef<Path>>(host_root: P) -> Result<Self> {
        Self::mounted(VirtualPath::root(), host_root)
    }

    /// Creates a provider mapping `virtual_root` onto `host_root`.
    /// Virtual paths outside `virtual_root` are rejected with `InvalidPath`.
    pub fn mounted<P: AsRef<Path>>(virtual_root: VirtualPath, host_root: P) -> Result<Self> {
        let host_root = host_root.as_ref();

        if host_root.as_os_str().is_empty() {
            return Err(VfsError::InvalidPath("root path is empty".into()));
        }
        if host_root.is_relative() {
            return Err(VfsError::InvalidPath(format!(
                "root path must be absolute: {}",
                host_root.display()
            )));
        }
        if host_root.exists() && !host_root.is_dir() {
            return Err(VfsError::NotADirectory(host_root.display().to_string()));
        }

        std::fs::create_dir_all(host_root)
            .map_err(|err| VfsError::from_io(err, host_root.display()))?;
        let host_root = host_root
            .canonicalize()
            .map_err(|err| VfsError::from_io(err, host_root.display()))?;

        debug!(virtual_root = %virtual_root, host_root = %host_root.display(), "dir provider");
        Ok(Self {
            virtual_root,
            host_root,
            read_only: false,
        })
    }

    /// Same as [`DirFS::new`], but every mutation fails with `PermissionDenied`
    /// and the `WRITE`/`RENAME` capabilities are not advertised.
    pub fn read_only<P: AsRef<Path>>(host_root: P) -> Result<Self> {
        let mut fs = Self::new(host_root)?;
        fs.read_only = true;
        Ok(fs)
    }

    /// Returns the canonical host root.
    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Lexical translation of a virtual path to its host path.
    /// Fails with `InvalidPath` if `path` is outside the virtual root.
    pub fn to_host(&self, path: &VirtualPath) -> Result<PathBuf> {
        let relative = path.strip_ancestor(&self.virtual_root).ok_or_else(|| {
            VfsError::InvalidPath(format!("{path} is outside {}", self.virtual_root))
        })?;
        let mut host = self.host_root.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            host.push(segment);
        }
        Ok(host)
    }

    /// Translates a host path under the host root back to a virtual path.
    fn to_inner(&self, host: &Path) -> Option<VirtualPath> {
        let relative = host.strip_prefix(&self.host_root).ok()?;
        let mut inner = self.virtual_root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(name) => inner = inner.join(name.to_str()?).ok()?,
                _ => return None,
            }
        }
        Some(inner)
    }

    /// Translates `path` and verifies that the host path stays inside the host root
    /// once host symlinks are resolved.
    async fn contain(&self, path: &VirtualPath, follow: Follow) -> Result<PathBuf> {
        let host = self.to_host(path)?;
        if host == self.host_root {
            return Ok(host);
        }

        let resolved = match (follow, host.parent(), host.file_name()) {
            (Follow::No, Some(parent), Some(name)) => {
                resolve_existing(parent).await?.join(name)
            }
            _ => resolve_existing(&host).await?,
        };

        if !resolved.starts_with(&self.host_root) {
            warn!(path = %path, resolved = %resolved.display(), "host path escapes root");
            return Err(VfsError::InvalidPath(format!("{path} escapes the provider root")));
        }
        Ok(resolved)
    }

    fn check_writable(&self, path: &VirtualPath) -> Result<()> {
        if self.read_only {
            Err(VfsError::PermissionDenied(format!("{path}: provider is read-only")))
        } else {
            Ok(())
        }
    }
}

/// Canonicalizes the deepest existing ancestor of `host` and re-appends the missing tail.
///
/// A dangling symlink in the path is rejected: its target cannot be checked.
async fn resolve_existing(host: &Path) -> Result<PathBuf> {
    let mut probe = host.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match fs::canonicalize(&probe).await {
            Ok(mut resolved) => {
                for name in tail.iter().rev() {
                    resolved.push(name);
                }
                return Ok(resolved);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if fs::symlink_metadata(&probe).await.is_ok() {
                    return Err(VfsError::InvalidPath(format!(
                        "dangling symlink at {}",
                        probe.display()
                    )));
                }
                let Some(name) = probe.file_name().map(|n| n.to_os_string()) else {
                    return Err(VfsError::from_io(err, host.display()));
                };
                tail.push(name);
                probe.pop();
            }
            Err(err) => return Err(VfsError::from_io(err, host.display())),
        }
    }
}

fn metadata_of(meta: &std::fs::Metadata) -> Metadata {
    let kind = if meta.is_dir() {
        EntryType::Directory
    } else if meta.file_type().is_symlink() {
        EntryType::Symlink
    } else {
        EntryType::File
    };
    Metadata {
        kind,
        size: if meta.is_dir() { 0 } else { meta.len() },
        mtime: meta.modified().map(Mtime::Known).unwrap_or(Mtime::Unsupported),
    }
}

#[async_trait]
impl FsBackend for DirFS {
    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::READ | Capabilities::LIST | Capabilities::WATCH;
        if !self.read_only {
            caps |= Capabilities::WRITE | Capabilities::RENAME;
            if cfg!(unix) {
                caps |= Capabilities::SYMLINK;
            }
        }
        caps
    }

    fn virtual_root(&self) -> VirtualPath {
        self.virtual_root.clone()
    }

    async fn stat(&self, path: &VirtualPath) -> Result<Metadata> {
        let host = self.contain(path, Follow::Yes).await?;
        let meta = fs::metadata(&host)
            .await
            .map_err(|err| VfsError::from_io(err, path))?;
        Ok(metadata_of(&meta))
    }

    async fn read_file(&self, path: &VirtualPath) -> Result<Vec<u8>> {
        let host = self.contain(path, Follow::Yes).await?;
        fs::read(&host).await.map_err(|err| VfsError::from_io(err, path))
    }

    async fn write_file(
        &self,
        path: &VirtualPath,
        data: &[u8],
        options: WriteOptions,
    ) -> Result<()> {
        self.check_writable(path)?;
        let host = self.contain(path, Follow::Yes).await?;

        if options.create_parents {
            if let Some(parent) = host.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|err| VfsError::from_io(err, path))?;
            }
        }

        let mut open = fs::OpenOptions::new();
        if options.append {
            open.append(true).create(options.create);
        } else if options.truncate {
            open.write(true).truncate(true).create(options.create);
        } else if options.create {
            open.write(true).create_new(true);
        } else {
            return Err(match fs::metadata(&host).await {
                Ok(_) => VfsError::AlreadyExists(path.to_string()),
                Err(err) => VfsError::from_io(err, path),
            });
        }

        let mut file = open
            .open(&host)
            .await
            .map_err(|err| VfsError::from_io(err, path))?;
        file.write_all(data)
            .await
            .map_err(|err| VfsError::from_io(err, path))?;
        file.flush().await.map_err(|err| VfsError::from_io(err, path))?;

        debug!(path = %path, len = data.len(), "host write");
        Ok(())
    }

    /// Lists the immediate children of a directory, sorted by name.
    async fn read_dir(&self, path: &VirtualPath) -> Result<Vec<DirEntry>> {
        let host = self.contain(path, Follow::Yes).await?;
        let mut dir = fs::read_dir(&host)
            .await
            .map_err(|err| VfsError::from_io(err, path))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|err| VfsError::from_io(err, path))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| VfsError::from_io(err, path))?;
            let kind = if file_type.is_symlink() {
                EntryType::Symlink
            } else if file_type.is_dir() {
                EntryType::Directory
            } else {
                EntryType::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &VirtualPath, options: MkdirOptions) -> Result<()> {
        self.check_writable(path)?;
        let host = self.contain(path, Follow::Yes).await?;
        let result = if options.recursive {
            fs::create_dir_all(&host).await
        } else {
            fs::create_dir(&host).await
        };
        result.map_err(|err| VfsError::from_io(err, path))?;
        debug!(path = %path, recursive = options.recursive, "host mkdir");
        Ok(())
    }

    async fn remove(&self, path: &VirtualPath, options: RemoveOptions) -> Result<()> {
        self.check_writable(path)?;
        if path == &self.virtual_root {
            return Err(VfsError::InvalidPath("the root cannot be removed".into()));
        }
        let host = self.contain(path, Follow::No).await?;
        let meta = fs::symlink_metadata(&host)
            .await
            .map_err(|err| VfsError::from_io(err, path))?;

        let result = if meta.is_dir() {
            if options.recursive {
                fs::remove_dir_all(&host).await
            } else {
                fs::remove_dir(&host).await
            }
        } else {
            fs::remove_file(&host).await
        };
        result.map_err(|err| VfsError::from_io(err, path))?;
        debug!(path = %path, recursive = options.recursive, "host remove");
        Ok(())
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<()> {
        self.check_writable(from)?;
        if from == &self.virtual_root || to == &self.virtual_root {
            return Err(VfsError::InvalidPath("the root cannot be renamed".into()));
        }
        if from != to && from.is_ancestor_of(to) {
            return Err(VfsError::InvalidPath(format!(
                "cannot move {from} into its own subtree {to}"
            )));
        }
        let host_from = self.contain(from, Follow::No).await?;
        let host_to = self.contain(to, Follow::No).await?;
        fs::rename(&host_from, &host_to)
            .await
            .map_err(|err| VfsError::from_io(err, from))?;
        debug!(from = %from, to = %to, "host rename");
        Ok(())
    }

    #[cfg(unix)]
    async fn symlink(&self, target: &VirtualPath, link: &VirtualPath) -> Result<()> {
        self.check_writable(link)?;
        let host_target = self.to_host(target)?;
        let host_link = self.contain(link, Follow::No).await?;
        fs::symlink(&host_target, &host_link)
            .await
            .map_err(|err| VfsError::from_io(err, link))?;
        debug!(target = %target, link = %link, "host symlink");
        Ok(())
    }

    async fn read_link(&self, path: &VirtualPath) -> Result<VirtualPath> {
        let host = self.contain(path, Follow::No).await?;
        let target = fs::read_link(&host)
            .await
            .map_err(|err| VfsError::from_io(err, path))?;
        let absolute = match host.parent() {
            Some(parent) if target.is_relative() => parent.join(&target),
            _ => target,
        };
        // Lexical cleanup only; `to_inner` rejects anything left outside the root.
        let mut cleaned = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::ParentDir => {
                    cleaned.pop();
                }
                Component::CurDir => {}
                other => cleaned.push(other),
            }
        }
        self.to_inner(&cleaned).ok_or_else(|| {
            VfsError::InvalidPath(format!("{path} points outside the provider root"))
        })
    }

    async fn watch(&self, path: &VirtualPath) -> Result<Watcher> {
        let host = self.contain(path, Follow::Yes).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mapper = self.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "watch error");
                    return;
                }
            };
            let kind = match event.kind {
                EventKind::Create(_) => WatchEventKind::Create,
                EventKind::Modify(_) => WatchEventKind::Modify,
                EventKind::Remove(_) => WatchEventKind::Remove,
                _ => WatchEventKind::Other,
            };
            for host_path in &event.paths {
                if let Some(path) = mapper.to_inner(host_path) {
                    let _ = tx.send(WatchEvent { kind, path });
                }
            }
        })
        .map_err(|err| VfsError::Io(format!("{path}: {err}")))?;

        watcher
            .watch(&host, RecursiveMode::Recursive)
            .map_err(|err| VfsError::Io(format!("{path}: {err}")))?;
        debug!(path = %path, "host watch");
        Ok(Watcher::new(rx, Box::new(watcher)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempdir::TempDir;

    fn vp(raw: &str) -> VirtualPath {
        VirtualPath::parse(raw).unwrap()
    }

    fn setup_test_env() -> TempDir {
        TempDir::new("dir_fs").expect("Failed to create temp dir")
    }

    mod creations {
        use super::*;

        #[test]
        fn test_new_absolute_path_existing() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            assert_eq!(fs.host_root(), temp_dir.path().canonicalize().unwrap());
            assert_eq!(fs.virtual_root(), VirtualPath::root());
        }

        #[test]
        fn test_new_nonexistent_path_created() {
            let temp_dir = setup_test_env();
            let nested = temp_dir.path().join("a/b/c");
            DirFS::new(&nested).unwrap();
            assert!(nested.is_dir());
        }

        #[test]
        fn test_new_root_is_file() {
            let temp_dir = setup_test_env();
            let file_path = temp_dir.path().join("file.txt");
            std::fs::write(&file_path, "content").unwrap();

            let err = DirFS::new(&file_path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotADirectory);
        }

        #[test]
        fn test_new_empty_or_relative_path() {
            assert_eq!(DirFS::new("").unwrap_err().kind(), ErrorKind::InvalidPath);
            assert_eq!(DirFS::new("relative/root").unwrap_err().kind(), ErrorKind::InvalidPath);
        }

        #[test]
        fn test_capabilities() {
            let temp_dir = setup_test_env();
            let caps = DirFS::new(temp_dir.path()).unwrap().capabilities();
            assert!(caps.contains(Capabilities::WRITE | Capabilities::WATCH));
            assert_eq!(caps.contains(Capabilities::SYMLINK), cfg!(unix));

            let ro = DirFS::read_only(temp_dir.path()).unwrap().capabilities();
            assert!(!ro.contains(Capabilities::WRITE));
            assert!(ro.contains(Capabilities::READ));
        }

        #[test]
        fn test_to_host_and_back() {
            let temp_dir = setup_test_env();
            let fs = DirFS::mounted(vp("/mnt/data"), temp_dir.path()).unwrap();
            let host = fs.to_host(&vp("/mnt/data/a/b.txt")).unwrap();
            assert_eq!(host, fs.host_root().join("a").join("b.txt"));
            assert_eq!(fs.to_inner(&host), Some(vp("/mnt/data/a/b.txt")));

            let err = fs.to_host(&vp("/mnt/other")).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath);
        }
    }

    mod operations {
        use super::*;

        #[tokio::test]
        async fn test_write_and_read() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();

            fs.write_file(&vp("/test.txt"), b"hello", WriteOptions::default())
                .await
                .unwrap();
            assert_eq!(fs.read_file(&vp("/test.txt")).await.unwrap(), b"hello");
            assert_eq!(
                std::fs::read(temp_dir.path().join("test.txt")).unwrap(),
                b"hello"
            );
        }

        #[tokio::test]
        async fn test_write_missing_parent() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();

            let err = fs
                .write_file(&vp("/a/b/c.txt"), b"nested", WriteOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);

            fs.write_file(&vp("/a/b/c.txt"), b"nested", WriteOptions::default().with_parents())
                .await
                .unwrap();
            assert_eq!(fs.read_file(&vp("/a/b/c.txt")).await.unwrap(), b"nested");
        }

        #[tokio::test]
        async fn test_write_create_new_over_existing() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            fs.write_file(&vp("/f"), b"one", WriteOptions::default()).await.unwrap();

            let err = fs
                .write_file(&vp("/f"), b"two", WriteOptions::create_new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AlreadyExists);

            fs.write_file(&vp("/f"), b"+", WriteOptions::append()).await.unwrap();
            assert_eq!(fs.read_file(&vp("/f")).await.unwrap(), b"one+");
        }

        #[tokio::test]
        async fn test_read_directory_as_file() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            fs.mkdir(&vp("/dir"), MkdirOptions::default()).await.unwrap();

            let err = fs.read_file(&vp("/dir")).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::IsADirectory);
        }

        #[tokio::test]
        async fn test_read_dir_sorted() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            fs.write_file(&vp("/b.txt"), b"b", WriteOptions::default()).await.unwrap();
            fs.write_file(&vp("/a.txt"), b"a", WriteOptions::default()).await.unwrap();
            fs.mkdir(&vp("/sub"), MkdirOptions::default()).await.unwrap();

            let entries = fs.read_dir(&VirtualPath::root()).await.unwrap();
            let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
            assert_eq!(entries[2].kind, EntryType::Directory);
        }

        #[tokio::test]
        async fn test_mkdir_existing() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            fs.mkdir(&vp("/data"), MkdirOptions::default()).await.unwrap();

            let err = fs.mkdir(&vp("/data"), MkdirOptions::default()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AlreadyExists);
            fs.mkdir(&vp("/data"), MkdirOptions::recursive()).await.unwrap();
        }

        #[tokio::test]
        async fn test_stat() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            fs.write_file(&vp("/file.txt"), b"content", WriteOptions::default())
                .await
                .unwrap();

            let meta = fs.stat(&vp("/file.txt")).await.unwrap();
            assert!(meta.is_file());
            assert_eq!(meta.size, 7);
            assert!(fs.stat(&VirtualPath::root()).await.unwrap().is_dir());
        }

        #[tokio::test]
        async fn test_remove() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            fs.write_file(&vp("/dir/f.txt"), b"x", WriteOptions::default().with_parents())
                .await
                .unwrap();

            let err = fs.remove(&vp("/dir"), RemoveOptions::default()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotEmpty);

            fs.remove(&vp("/dir"), RemoveOptions::recursive()).await.unwrap();
            assert!(!fs.exists(&vp("/dir")).await.unwrap());

            let err = fs
                .remove(&VirtualPath::root(), RemoveOptions::recursive())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath);
        }

        #[tokio::test]
        async fn test_rename() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            fs.write_file(&vp("/old.txt"), b"data", WriteOptions::default())
                .await
                .unwrap();

            fs.rename(&vp("/old.txt"), &vp("/new.txt")).await.unwrap();
            assert!(!fs.exists(&vp("/old.txt")).await.unwrap());
            assert_eq!(fs.read_file(&vp("/new.txt")).await.unwrap(), b"data");
        }

        #[tokio::test]
        async fn test_read_only_rejects_writes() {
            let temp_dir = setup_test_env();
            let fs = DirFS::read_only(temp_dir.path()).unwrap();
            let err = fs
                .write_file(&vp("/x"), b"x", WriteOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        }
    }

    mod containment {
        use super::*;

        #[tokio::test]
        async fn test_outside_mount_rejected() {
            let temp_dir = setup_test_env();
            let fs = DirFS::mounted(vp("/mnt"), temp_dir.path()).unwrap();
            let err = fs.read_file(&vp("/etc/passwd")).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath);
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn test_host_symlink_escape_blocked() {
            let outside = setup_test_env();
            std::fs::write(outside.path().join("secret.txt"), b"secret").unwrap();

            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("escape")).unwrap();

            let err = fs.read_file(&vp("/escape/secret.txt")).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath);

            let err = fs
                .write_file(&vp("/escape/new.txt"), b"x", WriteOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath);
            assert!(!outside.path().join("new.txt").exists());
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn test_dangling_symlink_write_blocked() {
            let outside = setup_test_env();
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            std::os::unix::fs::symlink(
                outside.path().join("planted.txt"),
                temp_dir.path().join("link.txt"),
            )
            .unwrap();

            let err = fs
                .write_file(&vp("/link.txt"), b"x", WriteOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath);
            assert!(!outside.path().join("planted.txt").exists());
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn test_remove_escaping_symlink_removes_link_only() {
            let outside = setup_test_env();
            std::fs::write(outside.path().join("keep.txt"), b"keep").unwrap();
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("escape")).unwrap();

            fs.remove(&vp("/escape"), RemoveOptions::recursive()).await.unwrap();
            assert!(outside.path().join("keep.txt").exists());
        }
    }

    #[cfg(unix)]
    mod symlinks {
        use super::*;

        #[tokio::test]
        async fn test_symlink_and_read_link() {
            let temp_dir = setup_test_env();
            let fs = DirFS::new(temp_dir.path()).unwrap();
            fs.write_file(&vp("/target.txt"), b"t", WriteOptions::default())
                .await
                .unwrap();

            fs.symlink(&vp("/target.txt"), &vp("/link.txt")).await.unwrap();
            assert_eq!(fs.read_link(&vp("/link.txt")).await.unwrap(), vp("/target.txt"));
            assert_eq!(fs.read_file(&vp("/link.txt")).await.unwrap(), b"t");

            let entries = fs.read_dir(&VirtualPath::root()).await.unwrap();
            let link = entries.iter().find(|e| e.name == "link.txt").unwrap();
            assert_eq!(link.kind, EntryType::Symlink);
        }
    }
}
