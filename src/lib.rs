//! A virtual file system with pluggable storage providers and module-resolution hooks.
//!
//! ### Overview
//!
//! `vfs-hooks` lets you work with a filesystem-shaped API that is backed either by memory
//! ([`MapFS`]) or by a directory on the host ([`DirFS`]), and optionally redirects a host
//! module system's specifier resolution and source loading through that file system.
//!
//! **Key ideas**:
//! - **Abstraction**: every provider implements the [`FsBackend`] trait; the
//!   [`VirtualFileSystem`] facade adds a working directory, capability checks and
//!   per-path ordering on top.
//! - **Safety**: virtual paths are normalized lexically and can never climb above `/`.
//!   `DirFS` re-checks every host path against its canonical root.
//! - **Transparency**: installed module hooks only touch specifiers they claim
//!   (`vfs:` by default). Uninstalling restores the exact original entry points.
//!
//! ### Example
//!
//! ```no_run
//! # async fn demo() -> vfs_hooks::Result<()> {
//! let vfs = vfs_hooks::create(())?;
//! vfs.mkdir("/pkg", Default::default()).await?;
//! vfs.write_file("/pkg/index.txt", "v1").await?;
//! vfs.write_file("/pkg/index.txt", "v2").await?;
//! assert_eq!(vfs.read_to_string("/pkg/index.txt").await?, "v2");
//! vfs.dispose();
//! # Ok(())
//! # }
//! ```

mod config;
mod core;
mod hooks;
mod vfs;

use std::sync::Arc;

pub use config::{CreateArgs, VfsOptions};
pub use crate::core::path::{basename, dirname, is_ancestor, join, normalize};
pub use crate::core::{
    Capabilities, DirEntry, ErrorKind, FsBackend, Metadata, MkdirOptions, Mtime, RemoveOptions,
    Result, VfsError, VirtualPath, WatchEvent, WatchEventKind, Watcher, WriteOptions,
};
pub use hooks::{
    ClaimPredicate, HookRegistration, HookState, HostLoader, HostResolver, ModuleHookController,
    ModuleLoader, ModuleResolver, ModuleSource, ModuleSystem, scheme_predicate,
};
pub use vfs::{DirFS, EntryType, MapFS, OpenOptions, Provider, VirtualFile, VirtualFileSystem};

/// Builds a [`VirtualFileSystem`] bound to [`ModuleSystem::global`].
///
/// `args` may be `()`, a provider, a [`VfsOptions`] or a `(provider, options)`
/// pair. Without a provider a fresh [`MapFS`] is used. With
/// `module_hooks` enabled (the default) the hooks are installed before
/// returning; call [`VirtualFileSystem::dispose`] to remove them.
pub fn create(args: impl Into<CreateArgs>) -> Result<Arc<VirtualFileSystem>> {
    create_with(args, ModuleSystem::global())
}

/// Same as [`create`], with hooks installed on `module_system`.
///
/// Fails with `AlreadyInstalled` if another file system already routes
/// `module_system`.
pub fn create_with(
    args: impl Into<CreateArgs>,
    module_system: Arc<ModuleSystem>,
) -> Result<Arc<VirtualFileSystem>> {
    let CreateArgs { provider, options } = args.into();
    let module_hooks = options.module_hooks;
    let vfs = Arc::new(VirtualFileSystem::new(provider.unwrap_or_default(), options));
    if module_hooks {
        vfs.enable_module_hooks(module_system)?;
    }
    Ok(vfs)
}
