//! Default resolution and loading steps, backed by the real filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::core::{Result, VfsError};
use crate::vfs::is_relative_specifier;

use super::{ModuleLoader, ModuleResolver, ModuleSource};

const FILE_SCHEME: &str = "file://";

/// Resolves absolute and relative specifiers to canonical host paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostResolver;

/// Reads module source from the host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLoader;

fn strip_file_scheme(url: &str) -> &str {
    url.strip_prefix(FILE_SCHEME).unwrap_or(url)
}

#[async_trait]
impl ModuleResolver for HostResolver {
    async fn resolve(&self, specifier: &str, referrer: Option<&str>) -> Result<String> {
        let specifier = strip_file_scheme(specifier);
        let candidate = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else if is_relative_specifier(specifier) {
            match referrer.map(|r| Path::new(strip_file_scheme(r))) {
                Some(referrer) => referrer
                    .parent()
                    .map(|dir| dir.join(specifier))
                    .unwrap_or_else(|| PathBuf::from(specifier)),
                None => PathBuf::from(specifier),
            }
        } else {
            return Err(VfsError::NotSupported(format!(
                "bare specifier '{specifier}' cannot be resolved by the host"
            )));
        };

        let resolved = fs::canonicalize(&candidate)
            .await
            .map_err(|err| VfsError::from_io(err, candidate.display()))?;
        Ok(resolved.display().to_string())
    }
}

#[async_trait]
impl ModuleLoader for HostLoader {
    async fn load(&self, url: &str) -> Result<ModuleSource> {
        let path = strip_file_scheme(url);
        let source = fs::read(path)
            .await
            .map_err(|err| VfsError::from_io(err, path))?;
        Ok(ModuleSource {
            url: url.to_string(),
            source,
        })
    }
}
