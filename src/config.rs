//! Factory inputs: the options record and the accepted argument shapes.

use serde::Deserialize;

use crate::core::{Result, VfsError};
use crate::vfs::{DirFS, MapFS, Provider};

/// Options recognized by [`create`](crate::create).
///
/// Deserializes from both `snake_case` and `camelCase` keys. Missing fields
/// take their defaults and unrecognized keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VfsOptions {
    /// Install module hooks bound to the new file system.
    #[serde(alias = "moduleHooks")]
    pub module_hooks: bool,
    /// Track a virtual working directory. When off, the cwd is pinned to `/`.
    #[serde(alias = "virtualCwd")]
    pub virtual_cwd: bool,
    /// URL scheme claimed by the module hooks (`vfs` → `vfs:/path`).
    pub scheme: String,
}

impl Default for VfsOptions {
    fn default() -> Self {
        Self {
            module_hooks: true,
            virtual_cwd: true,
            scheme: String::from("vfs"),
        }
    }
}

impl VfsOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| VfsError::Io(format!("invalid options: {err}")))
    }

    pub fn without_module_hooks(mut self) -> Self {
        self.module_hooks = false;
        self
    }

    pub fn without_virtual_cwd(mut self) -> Self {
        self.virtual_cwd = false;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }
}

/// Arguments accepted by [`create`](crate::create).
///
/// The shape is decided by the Rust type of the argument: a provider, an
/// options record, both, or nothing. A missing provider means a fresh
/// [`MapFS`].
#[derive(Debug, Default)]
pub struct CreateArgs {
    pub provider: Option<Provider>,
    pub options: VfsOptions,
}

impl From<()> for CreateArgs {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Provider> for CreateArgs {
    fn from(provider: Provider) -> Self {
        Self {
            provider: Some(provider),
            options: VfsOptions::default(),
        }
    }
}

impl From<MapFS> for CreateArgs {
    fn from(fs: MapFS) -> Self {
        Provider::from(fs).into()
    }
}

impl From<DirFS> for CreateArgs {
    fn from(fs: DirFS) -> Self {
        Provider::from(fs).into()
    }
}

impl From<VfsOptions> for CreateArgs {
    fn from(options: VfsOptions) -> Self {
        Self {
            provider: None,
            options,
        }
    }
}

impl<P: Into<Provider>> From<(P, VfsOptions)> for CreateArgs {
    fn from((provider, options): (P, VfsOptions)) -> Self {
        Self {
            provider: Some(provider.into()),
            options,
        }
    }
}
