//! Interception of a host module system.
//!
//! A [`ModuleSystem`] has two replaceable entry points: a
//! [`ModuleResolver`] turning specifiers into URLs and a [`ModuleLoader`]
//! turning URLs into source bytes. A [`ModuleHookController`] swaps both for
//! wrappers that route claimed specifiers through a
//! [`VirtualFileSystem`](crate::VirtualFileSystem) and hand everything else to
//! the original entry points unchanged.

mod controller;
mod host;

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use async_trait::async_trait;

use crate::core::Result;
use crate::vfs::VirtualFileSystem;

pub use controller::{ClaimPredicate, HookState, ModuleHookController, scheme_predicate};
pub use host::{HostLoader, HostResolver};

/// Source bytes of a loaded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub url: String,
    pub source: Vec<u8>,
}

#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// Resolves `specifier`, as seen from the module at `referrer`, to a URL.
    async fn resolve(&self, specifier: &str, referrer: Option<&str>) -> Result<String>;
}

#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<ModuleSource>;
}

/// Saved host state while hooks are installed.
pub struct HookRegistration {
    original_resolver: Arc<dyn ModuleResolver>,
    original_loader: Arc<dyn ModuleLoader>,
    owner: Weak<VirtualFileSystem>,
    owner_id: u64,
}

impl HookRegistration {
    pub fn owner_id(&self) -> u64 {
        self.owner_id
    }

    /// The routing target, if it is still alive.
    pub fn owner(&self) -> Option<Arc<VirtualFileSystem>> {
        self.owner.upgrade()
    }
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}

struct HostState {
    resolver: Arc<dyn ModuleResolver>,
    loader: Arc<dyn ModuleLoader>,
    registration: Option<HookRegistration>,
}

/// A host module system with replaceable resolution and loading steps.
///
/// At most one set of hooks is installed at a time; installing and
/// uninstalling are the only ways the two slots change.
pub struct ModuleSystem {
    state: Mutex<HostState>,
}

static GLOBAL: OnceLock<Arc<ModuleSystem>> = OnceLock::new();

impl ModuleSystem {
    pub fn new(resolver: Arc<dyn ModuleResolver>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            state: Mutex::new(HostState {
                resolver,
                loader,
                registration: None,
            }),
        }
    }

    /// A module system backed by the real filesystem.
    pub fn host() -> Self {
        Self::new(Arc::new(HostResolver), Arc::new(HostLoader))
    }

    /// The process-wide module system used by [`create`](crate::create).
    pub fn global() -> Arc<ModuleSystem> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ModuleSystem::host())))
    }

    /// Current resolution step.
    pub fn resolver(&self) -> Arc<dyn ModuleResolver> {
        Arc::clone(&self.lock().resolver)
    }

    /// Current loading step.
    pub fn loader(&self) -> Arc<dyn ModuleLoader> {
        Arc::clone(&self.lock().loader)
    }

    pub async fn resolve(&self, specifier: &str, referrer: Option<&str>) -> Result<String> {
        let resolver = self.resolver();
        resolver.resolve(specifier, referrer).await
    }

    pub async fn load(&self, url: &str) -> Result<ModuleSource> {
        let loader = self.loader();
        loader.load(url).await
    }

    /// Resolves `specifier` and loads the result.
    pub async fn import(&self, specifier: &str, referrer: Option<&str>) -> Result<ModuleSource> {
        let url = self.resolve(specifier, referrer).await?;
        self.load(&url).await
    }

    pub fn is_hooked(&self) -> bool {
        self.lock().registration.is_some()
    }

    /// Id of the file system the hooks route through, if installed.
    pub fn installed_owner(&self) -> Option<u64> {
        self.lock().registration.as_ref().map(HookRegistration::owner_id)
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ModuleSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSystem")
            .field("registration", &self.lock().registration)
            .finish_non_exhaustive()
    }
}
