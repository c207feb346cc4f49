use async_trait::async_trait;

use crate::core::{
    Capabilities, DirEntry, FsBackend, Metadata, MkdirOptions, RemoveOptions, Result, VirtualPath,
    Watcher, WriteOptions,
};

use super::{DirFS, MapFS};

/// The storage backends a [`VirtualFileSystem`](crate::VirtualFileSystem) can own.
#[derive(Debug)]
pub enum Provider {
    Memory(MapFS),
    Dir(DirFS),
}

impl Default for Provider {
    fn default() -> Self {
        Provider::Memory(MapFS::new())
    }
}

impl From<MapFS> for Provider {
    fn from(fs: MapFS) -> Self {
        Provider::Memory(fs)
    }
}

impl From<DirFS> for Provider {
    fn from(fs: DirFS) -> Self {
        Provider::Dir(fs)
    }
}

impl Provider {
    fn backend(&self) -> &dyn FsBackend {
        match self {
            Provider::Memory(fs) => fs,
            Provider::Dir(fs) => fs,
        }
    }
}

#[async_trait]
impl FsBackend for Provider {
    fn capabilities(&self) -> Capabilities {
        self.backend().capabilities()
    }

    fn virtual_root(&self) -> VirtualPath {
        self.backend().virtual_root()
    }

    async fn stat(&self, path: &VirtualPath) -> Result<Metadata> {
        self.backend().stat(path).await
    }

    async fn read_file(&self, path: &VirtualPath) -> Result<Vec<u8>> {
        self.backend().read_file(path).await
    }

    async fn write_file(
        &self,
        path: &VirtualPath,
        data: &[u8],
        options: WriteOptions,
    ) -> Result<()> {
        self.backend().write_file(path, data, options).await
    }

    async fn read_dir(&self, path: &VirtualPath) -> Result<Vec<DirEntry>> {
        self.backend().read_dir(path).await
    }

    async fn mkdir(&self, path: &VirtualPath, options: MkdirOptions) -> Result<()> {
        self.backend().mkdir(path, options).await
    }

    async fn remove(&self, path: &VirtualPath, options: RemoveOptions) -> Result<()> {
        self.backend().remove(path, options).await
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> Result<()> {
        self.backend().rename(from, to).await
    }

    async fn exists(&self, path: &VirtualPath) -> Result<bool> {
        self.backend().exists(path).await
    }

    async fn symlink(&self, target: &VirtualPath, link: &VirtualPath) -> Result<()> {
        self.backend().symlink(target, link).await
    }

    async fn read_link(&self, path: &VirtualPath) -> Result<VirtualPath> {
        self.backend().read_link(path).await
    }

    async fn watch(&self, path: &VirtualPath) -> Result<Watcher> {
        self.backend().watch(path).await
    }

    async fn resolve_package(&self, specifier: &str, from_dir: &VirtualPath) -> Result<VirtualPath> {
        self.backend().resolve_package(specifier, from_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_provider_delegates() {
        let provider = Provider::default();
        let path = VirtualPath::parse("/a.txt").unwrap();
        provider
            .write_file(&path, b"abc", WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(provider.read_file(&path).await.unwrap(), b"abc");
        assert!(!provider.capabilities().contains(Capabilities::SYMLINK));
    }

    #[tokio::test]
    async fn test_dir_provider_from() {
        let temp_dir = tempdir::TempDir::new("provider").unwrap();
        let provider = Provider::from(DirFS::new(temp_dir.path()).unwrap());
        assert!(matches!(provider, Provider::Dir(_)));
        assert!(provider.capabilities().contains(Capabilities::WATCH));
    }
}
