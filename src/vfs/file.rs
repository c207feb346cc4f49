use std::io::SeekFrom;

use tracing::warn;

use crate::core::{Result, VfsError, VirtualPath, WriteOptions};

use super::VirtualFileSystem;

/// Largest zero-filled gap a write may open past the end of the buffer.
const MAX_HOLE: usize = 16 * 1024 * 1024;

/// Options for [`VirtualFileSystem::open`], in the style of
/// [`std::fs::OpenOptions`].
///
/// `create`, `create_new` and `truncate` require `write` or `append`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
    create_new: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, read: bool) -> &mut Self {
        self.read = read;
        self
    }

    pub fn write(&mut self, write: bool) -> &mut Self {
        self.write = write;
        self
    }

    pub fn append(&mut self, append: bool) -> &mut Self {
        self.append = append;
        self
    }

    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.truncate = truncate;
        self
    }

    pub fn create(&mut self, create: bool) -> &mut Self {
        self.create = create;
        self
    }

    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.create_new = create_new;
        self
    }

    fn writable(&self) -> bool {
        self.write || self.append
    }
}

/// A buffered handle on a file of a [`VirtualFileSystem`].
///
/// The whole content is loaded on open. Writes stay in memory until
/// [`flush`](VirtualFile::flush) or [`close`](VirtualFile::close) writes the
/// buffer back through the file system. Dropping a handle with unflushed
/// writes loses them.
pub struct VirtualFile<'a> {
    vfs: &'a VirtualFileSystem,
    path: VirtualPath,
    buffer: Vec<u8>,
    pos: usize,
    options: OpenOptions,
    dirty: bool,
}

impl<'a> VirtualFile<'a> {
    pub(crate) async fn open(
        vfs: &'a VirtualFileSystem,
        path: VirtualPath,
        options: &OpenOptions,
    ) -> Result<VirtualFile<'a>> {
        let options = *options;
        if !options.read && !options.writable() {
            return Err(VfsError::InvalidPath(format!(
                "{path}: open needs read, write or append access"
            )));
        }
        if (options.create || options.create_new || options.truncate) && !options.writable() {
            return Err(VfsError::NotSupported(format!(
                "{path}: create and truncate need write access"
            )));
        }

        let existing = match vfs.stat_at(&path).await {
            Ok(meta) if meta.is_dir() => return Err(VfsError::IsADirectory(path.to_string())),
            Ok(_) if options.create_new => return Err(VfsError::AlreadyExists(path.to_string())),
            Ok(_) => true,
            Err(VfsError::NotFound(_)) if options.create || options.create_new => false,
            Err(err) => return Err(err),
        };

        let buffer = if !existing {
            vfs.write_file_with(path.as_str(), b"", WriteOptions::create_new())
                .await?;
            Vec::new()
        } else if options.truncate {
            Vec::new()
        } else {
            vfs.read_file(path.as_str()).await?
        };

        let pos = if options.append { buffer.len() } else { 0 };
        Ok(VirtualFile {
            vfs,
            path,
            buffer,
            pos,
            options,
            dirty: existing && options.truncate,
        })
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// Length of the buffered content.
    pub fn len(&self) -> u64 {
        self.buffer.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Reads up to `buf.len()` bytes from the current position.
    /// Returns 0 at the end of the file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_readable()?;
        let available = &self.buffer[self.pos.min(self.buffer.len())..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }

    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        self.check_readable()?;
        let start = self.pos.min(self.buffer.len());
        out.extend_from_slice(&self.buffer[start..]);
        self.pos = self.buffer.len();
        Ok(self.buffer.len() - start)
    }

    /// Writes `data` at the current position, or at the end in append mode.
    /// Seeking past the end and writing fills the gap with zeros.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if !self.options.writable() {
            return Err(VfsError::PermissionDenied(format!(
                "{}: not opened for writing",
                self.path
            )));
        }
        if self.options.append {
            self.pos = self.buffer.len();
        }
        if self.pos > self.buffer.len().saturating_add(MAX_HOLE) {
            return Err(VfsError::Io(format!(
                "{}: write at offset {} would leave a hole past {} bytes",
                self.path,
                self.pos,
                self.buffer.len()
            )));
        }
        let end = self.pos.checked_add(data.len()).ok_or_else(|| {
            VfsError::Io(format!("{}: write past offset {} overflows", self.path, self.pos))
        })?;
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[self.pos..end].copy_from_slice(data);
        self.pos = end;
        self.dirty = true;
        Ok(())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.buffer.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => (self.pos as u64).checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            VfsError::Io(format!("{}: seek before the start of the file", self.path))
        })?;
        self.pos = usize::try_from(target)
            .map_err(|_| VfsError::Io(format!("{}: seek offset too large", self.path)))?;
        Ok(target)
    }

    /// Writes the buffer back if it was modified.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.vfs
            .write_file_with(self.path.as_str(), &self.buffer, WriteOptions::default())
            .await?;
        self.dirty = false;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        self.flush().await
    }

    fn check_readable(&self) -> Result<()> {
        if self.options.read {
            Ok(())
        } else {
            Err(VfsError::PermissionDenied(format!(
                "{}: not opened for reading",
                self.path
            )))
        }
    }
}

impl std::fmt::Debug for VirtualFile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFile")
            .field("path", &self.path)
            .field("len", &self.buffer.len())
            .field("pos", &self.pos)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Drop for VirtualFile<'_> {
    fn drop(&mut self) {
        if self.dirty {
            warn!(path = %self.path, "file handle dropped with unflushed writes");
        }
    }
}
