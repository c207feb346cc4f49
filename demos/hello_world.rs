use anyhow::Result;
use tracing_subscriber::EnvFilter;
use vfs_hooks::{DirFS, MkdirOptions, ModuleSystem, RemoveOptions, VfsOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // in-memory file system with hooks on the global module system
    let vfs = vfs_hooks::create(())?;
    vfs.mkdir("/docs", MkdirOptions::default()).await?;

    // relative paths resolve against the virtual cwd
    vfs.set_cwd("/docs").await?;
    vfs.write_file("first.txt", "Hello").await?;
    vfs.write_file("/second.txt", "World").await?;
    vfs.set_cwd("..").await?;

    let first = vfs.read_to_string("/docs/first.txt").await?;
    let second = vfs.read_to_string("/second.txt").await?;
    println!("{first}, {second}!");

    // the module system now sees `vfs:` specifiers
    let host = ModuleSystem::global();
    let module = host.import("vfs:/docs/first.txt", None).await?;
    println!("{} -> {} bytes", module.url, module.source.len());

    vfs.dispose();
    assert!(!host.is_hooked());

    // same API over a host directory, without hooks
    let root = std::env::temp_dir().join("my_vfs");
    let disk = vfs_hooks::create((
        DirFS::new(&root)?,
        VfsOptions::default().without_module_hooks(),
    ))?;
    disk.write_file("/note.txt", "on disk").await?;
    for path in disk.tree("/").await? {
        println!("{path}");
    }
    disk.remove("/note.txt", RemoveOptions::default()).await?;

    Ok(())
}
