use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::{Result, VfsError, VirtualPath};
use crate::vfs::{VirtualFileSystem, is_relative_specifier};

use super::{HookRegistration, ModuleLoader, ModuleResolver, ModuleSource, ModuleSystem};

/// Decides whether a specifier or URL belongs to the virtual namespace.
pub type ClaimPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Claims everything starting with `{scheme}:`.
pub fn scheme_predicate(scheme: &str) -> ClaimPredicate {
    let prefix = format!("{scheme}:");
    Arc::new(move |specifier: &str| specifier.starts_with(&prefix))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Uninstalled,
    Installed,
}

/// Installs and removes the module hooks of one host [`ModuleSystem`].
///
/// `install` on a host already hooked by the same file system is a no-op;
/// by a different one it fails with `AlreadyInstalled` and changes nothing.
/// `uninstall` puts back the exact resolver and loader that were replaced.
/// The controller can be installed again afterwards.
pub struct ModuleHookController {
    host: Arc<ModuleSystem>,
    claims: Option<ClaimPredicate>,
    bound: Mutex<Option<u64>>,
}

impl ModuleHookController {
    /// Claims specifiers with the file system's own scheme.
    pub fn new(host: Arc<ModuleSystem>) -> Self {
        Self {
            host,
            claims: None,
            bound: Mutex::new(None),
        }
    }

    pub fn with_predicate(host: Arc<ModuleSystem>, claims: ClaimPredicate) -> Self {
        Self {
            host,
            claims: Some(claims),
            bound: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &Arc<ModuleSystem> {
        &self.host
    }

    pub fn state(&self) -> HookState {
        if self.is_installed() {
            HookState::Installed
        } else {
            HookState::Uninstalled
        }
    }

    pub fn is_installed(&self) -> bool {
        let Some(bound) = *self.bound() else {
            return false;
        };
        self.host.installed_owner() == Some(bound)
    }

    pub fn install(&self, vfs: &Arc<VirtualFileSystem>) -> Result<()> {
        let mut bound = self.bound();
        let mut state = self.host.lock();

        if let Some(registration) = &state.registration {
            if registration.owner_id == vfs.id() {
                debug!(owner = vfs.id(), "module hooks already installed");
                *bound = Some(vfs.id());
                return Ok(());
            }
            if registration.owner.strong_count() > 0 {
                return Err(VfsError::AlreadyInstalled(format!(
                    "host is routed through file system #{}",
                    registration.owner_id
                )));
            }
        }
        // The previous owner is gone: put the host back before wrapping it again.
        if let Some(stale) = state.registration.take() {
            debug!(owner = stale.owner_id, "reclaiming hooks of a dropped file system");
            state.resolver = stale.original_resolver;
            state.loader = stale.original_loader;
        }

        let claims = self
            .claims
            .clone()
            .unwrap_or_else(|| scheme_predicate(&vfs.options().scheme));
        let original_resolver = Arc::clone(&state.resolver);
        let original_loader = Arc::clone(&state.loader);

        state.resolver = Arc::new(VfsResolver {
            vfs: Arc::downgrade(vfs),
            original: Arc::clone(&original_resolver),
            claims: Arc::clone(&claims),
        });
        state.loader = Arc::new(VfsLoader {
            vfs: Arc::downgrade(vfs),
            original: Arc::clone(&original_loader),
            claims,
        });
        state.registration = Some(HookRegistration {
            original_resolver,
            original_loader,
            owner: Arc::downgrade(vfs),
            owner_id: vfs.id(),
        });
        *bound = Some(vfs.id());

        info!(owner = vfs.id(), "module hooks installed");
        Ok(())
    }

    /// No-op unless this controller's file system owns the host's hooks.
    pub fn uninstall(&self) {
        let Some(owner_id) = self.bound().take() else {
            return;
        };
        let mut state = self.host.lock();
        if let Some(registration) = state
            .registration
            .take_if(|registration| registration.owner_id == owner_id)
        {
            state.resolver = registration.original_resolver;
            state.loader = registration.original_loader;
            info!(owner = owner_id, "module hooks uninstalled");
        }
    }

    fn bound(&self) -> MutexGuard<'_, Option<u64>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ModuleHookController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHookController")
            .field("bound", &*self.bound())
            .finish_non_exhaustive()
    }
}

/// URLs minted by `vfs` are always routed back to it.
fn owns(claims: &ClaimPredicate, vfs: &VirtualFileSystem, specifier: &str) -> bool {
    claims(specifier) || vfs.is_url(specifier)
}

struct VfsResolver {
    vfs: Weak<VirtualFileSystem>,
    original: Arc<dyn ModuleResolver>,
    claims: ClaimPredicate,
}

#[async_trait]
impl ModuleResolver for VfsResolver {
    async fn resolve(&self, specifier: &str, referrer: Option<&str>) -> Result<String> {
        let Some(vfs) = self.vfs.upgrade() else {
            return self.original.resolve(specifier, referrer).await;
        };
        let owned_referrer = referrer.filter(|r| owns(&self.claims, &vfs, r));
        let claimed = owns(&self.claims, &vfs, specifier)
            || (is_relative_specifier(specifier) && owned_referrer.is_some());
        if !claimed {
            drop(vfs);
            return self.original.resolve(specifier, referrer).await;
        }

        let from_dir: Option<VirtualPath> = match owned_referrer {
            Some(referrer) => Some(vfs.resolve(referrer, None).await?.parent()),
            None => None,
        };
        let path = vfs.resolve(specifier, from_dir.as_ref()).await?;
        vfs.stat(path.as_str()).await?;
        debug!(specifier, path = %path, "resolved through vfs");
        Ok(vfs.to_url(&path))
    }
}

struct VfsLoader {
    vfs: Weak<VirtualFileSystem>,
    original: Arc<dyn ModuleLoader>,
    claims: ClaimPredicate,
}

#[async_trait]
impl ModuleLoader for VfsLoader {
    async fn load(&self, url: &str) -> Result<ModuleSource> {
        let vfs = match self.vfs.upgrade() {
            Some(vfs) if owns(&self.claims, &vfs, url) => vfs,
            _ => return self.original.load(url).await,
        };

        let path = vfs.resolve(url, None).await?;
        let source = vfs.read_file(path.as_str()).await?;
        debug!(url, len = source.len(), "loaded through vfs");
        Ok(ModuleSource {
            url: url.to_string(),
            source,
        })
    }
}
