mod dir_fs;
mod entry;
mod facade;
mod file;
mod map_fs;
mod provider;
mod queue;

pub use dir_fs::DirFS;
pub use entry::EntryType;
pub use facade::VirtualFileSystem;
pub(crate) use facade::is_relative_specifier;
pub use file::{OpenOptions, VirtualFile};
pub use map_fs::MapFS;
pub use provider::Provider;
