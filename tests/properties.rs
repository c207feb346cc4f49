use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempdir::TempDir;
use vfs_hooks::{
    DirFS, EntryType, ErrorKind, MapFS, MkdirOptions, ModuleLoader, ModuleResolver, ModuleSource,
    ModuleSystem, Provider, RemoveOptions, VfsOptions, VirtualFileSystem, create_with,
};

fn no_hooks() -> VfsOptions {
    VfsOptions::default().without_module_hooks()
}

fn memory_vfs() -> Arc<VirtualFileSystem> {
    create_with((MapFS::new(), no_hooks()), Arc::new(ModuleSystem::host())).unwrap()
}

fn dir_vfs(temp_dir: &TempDir) -> Arc<VirtualFileSystem> {
    let fs = DirFS::new(temp_dir.path()).unwrap();
    create_with((fs, no_hooks()), Arc::new(ModuleSystem::host())).unwrap()
}

/// Knows nothing about `vfs:` specifiers and loads nothing.
struct FakeResolver;

#[async_trait]
impl ModuleResolver for FakeResolver {
    async fn resolve(&self, specifier: &str, _referrer: Option<&str>) -> vfs_hooks::Result<String> {
        if specifier.starts_with("vfs:") {
            return Err(vfs_hooks::VfsError::NotFound(specifier.to_string()));
        }
        Ok(format!("host:{specifier}"))
    }
}

struct FakeLoader;

#[async_trait]
impl ModuleLoader for FakeLoader {
    async fn load(&self, url: &str) -> vfs_hooks::Result<ModuleSource> {
        Err(vfs_hooks::VfsError::NotFound(url.to_string()))
    }
}

fn fake_host() -> Arc<ModuleSystem> {
    Arc::new(ModuleSystem::new(Arc::new(FakeResolver), Arc::new(FakeLoader)))
}

mod round_trip {
    use super::*;

    const CONTENTS: [&[u8]; 4] = [b"", b"hello", &[0, 159, 146, 150, 255], b"line\nbreak\r\n"];

    async fn check(vfs: &VirtualFileSystem) -> Result<()> {
        vfs.mkdir("/nested/deeper", MkdirOptions::recursive()).await?;
        for (i, content) in CONTENTS.iter().enumerate() {
            let path = format!("/nested/deeper/file-{i}.bin");
            vfs.write_file(&path, content).await?;
            assert_eq!(vfs.read_file(&path).await?, *content);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_provider() -> Result<()> {
        check(&memory_vfs()).await
    }

    #[tokio::test]
    async fn test_dir_provider() -> Result<()> {
        let temp_dir = TempDir::new("round_trip")?;
        check(&dir_vfs(&temp_dir)).await
    }
}

mod visibility {
    use super::*;

    async fn check(vfs: &VirtualFileSystem) -> Result<()> {
        vfs.mkdir("/d", MkdirOptions::default()).await?;
        vfs.write_file("/d/a", "a").await?;
        let names: Vec<_> = vfs.read_dir("/d").await?.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a"]);

        vfs.rename("/d/a", "/d/b").await?;
        let names: Vec<_> = vfs.read_dir("/d").await?.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b"]);

        vfs.remove("/d/b", RemoveOptions::default()).await?;
        assert!(vfs.read_dir("/d").await?.is_empty());
        assert!(!vfs.exists("/d/b").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_provider() -> Result<()> {
        check(&memory_vfs()).await
    }

    #[tokio::test]
    async fn test_dir_provider() -> Result<()> {
        let temp_dir = TempDir::new("visibility")?;
        check(&dir_vfs(&temp_dir)).await
    }

    #[tokio::test]
    async fn test_memory_read_dir_insertion_order() -> Result<()> {
        let vfs = memory_vfs();
        for name in ["zeta", "alpha", "mid"] {
            vfs.write_file(format!("/{name}"), name).await?;
        }
        let names: Vec<_> = vfs.read_dir("/").await?.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        Ok(())
    }
}

mod cwd {
    use super::*;

    #[tokio::test]
    async fn test_cwd_always_a_directory() -> Result<()> {
        let vfs = memory_vfs();
        vfs.mkdir("/work/sub", MkdirOptions::recursive()).await?;
        vfs.write_file("/work/file", "f").await?;
        vfs.set_cwd("/work/sub").await?;

        for attempt in ["/work/file", "/nope", "file"] {
            assert!(vfs.set_cwd(attempt).await.is_err());
            assert!(vfs.stat(vfs.cwd().as_str()).await?.is_dir());
        }

        for victim in ["/work/sub", "/work", "/"] {
            let err = vfs.remove(victim, RemoveOptions::recursive()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath);
        }
        let err = vfs.rename("/work", "/moved").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);

        assert_eq!(vfs.cwd().as_str(), "/work/sub");
        assert!(vfs.stat("/work/sub").await?.is_dir());

        vfs.set_cwd("/").await?;
        vfs.remove("/work", RemoveOptions::recursive()).await?;
        Ok(())
    }
}

mod containment {
    use super::*;

    #[tokio::test]
    async fn test_escape_attempts_rejected() -> Result<()> {
        let outer = TempDir::new("containment")?;
        let root = outer.path().join("root");
        let vfs = create_with(
            (DirFS::new(&root)?, no_hooks()),
            Arc::new(ModuleSystem::host()),
        )?;

        for attempt in ["../outside.txt", "/../outside.txt", "/a/../../outside.txt"] {
            let err = vfs.write_file(attempt, "x").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPath);
        }
        assert!(!outer.path().join("outside.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_mounted_root_rejects_foreign_paths() -> Result<()> {
        let temp_dir = TempDir::new("mounted")?;
        let fs = DirFS::mounted(vfs_hooks::VirtualPath::parse("/mnt")?, temp_dir.path())?;
        let vfs = create_with((fs, no_hooks()), Arc::new(ModuleSystem::host()))?;

        vfs.write_file("/mnt/inside.txt", "in").await?;
        assert!(temp_dir.path().join("inside.txt").exists());

        let err = vfs.write_file("/elsewhere.txt", "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_planted_after_construction() -> Result<()> {
        let outside = TempDir::new("outside")?;
        let temp_dir = TempDir::new("planted")?;
        let vfs = dir_vfs(&temp_dir);

        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("trap"))?;
        let err = vfs.write_file("/trap/pwned.txt", "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPath);
        assert!(!outside.path().join("pwned.txt").exists());
        Ok(())
    }
}

mod hooks {
    use super::*;

    #[tokio::test]
    async fn test_unclaimed_specifiers_unchanged() -> Result<()> {
        let host = fake_host();
        let before = host.resolve("lodash", Some("/app/main.js")).await?;

        let vfs = create_with(MapFS::new(), Arc::clone(&host))?;
        assert!(host.is_hooked());
        let during = host.resolve("lodash", Some("/app/main.js")).await?;
        assert_eq!(before, during);

        vfs.dispose();
        Ok(())
    }

    #[tokio::test]
    async fn test_claimed_falls_back_after_uninstall() -> Result<()> {
        let host = fake_host();
        let vfs = create_with(MapFS::new(), Arc::clone(&host))?;
        vfs.write_file("/mod.js", "export default 1").await?;

        let module = host.import("vfs:/mod.js", None).await?;
        assert_eq!(module.source, b"export default 1");

        vfs.dispose();
        let err = host.resolve("vfs:/mod.js", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn test_idempotent_install() -> Result<()> {
        let host = fake_host();
        let original = host.resolver();

        let vfs = create_with(MapFS::new(), Arc::clone(&host))?;
        let wrapped = host.resolver();
        vfs.enable_module_hooks(Arc::clone(&host))?;
        assert!(Arc::ptr_eq(&host.resolver(), &wrapped));

        vfs.dispose();
        assert!(Arc::ptr_eq(&host.resolver(), &original));
        vfs.dispose();
        assert!(Arc::ptr_eq(&host.resolver(), &original));
        Ok(())
    }

    #[tokio::test]
    async fn test_second_vfs_already_installed() -> Result<()> {
        let host = fake_host();
        let first = create_with((), Arc::clone(&host))?;
        let err = create_with((), Arc::clone(&host)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInstalled);
        assert_eq!(host.installed_owner(), Some(first.id()));

        first.dispose();
        let second = create_with((), Arc::clone(&host))?;
        assert_eq!(host.installed_owner(), Some(second.id()));
        Ok(())
    }

    #[tokio::test]
    async fn test_drop_uninstalls() -> Result<()> {
        let host = fake_host();
        let original = host.loader();
        let vfs = create_with(Provider::default(), Arc::clone(&host))?;
        assert!(vfs.hooks_installed());

        drop(vfs);
        assert!(!host.is_hooked());
        assert!(Arc::ptr_eq(&host.loader(), &original));
        Ok(())
    }
}

mod ordering {
    use super::*;

    #[tokio::test]
    async fn test_same_path_in_issue_order() -> Result<()> {
        let vfs = memory_vfs();
        vfs.write_file("/counter", "").await?;

        let results = tokio::join!(
            vfs.append_file("/counter", "0"),
            vfs.append_file("/counter", "1"),
            vfs.read_to_string("/counter"),
            vfs.append_file("/counter", "2"),
            vfs.append_file("/counter", "3"),
        );
        results.0?;
        results.1?;
        assert_eq!(results.2?, "01");
        results.3?;
        results.4?;
        assert_eq!(vfs.read_to_string("/counter").await?, "0123");
        Ok(())
    }

    #[tokio::test]
    async fn test_rename_waits_for_pending_write() -> Result<()> {
        let vfs = memory_vfs();
        let write = vfs.write_file("/a", "payload");
        let rename = vfs.rename("/a", "/b");
        let (write, rename) = tokio::join!(write, rename);
        write?;
        rename?;
        assert_eq!(vfs.read_to_string("/b").await?, "payload");
        assert_eq!(vfs.stat("/b").await?.kind, EntryType::File);
        Ok(())
    }
}
