use std::time::SystemTime;

use indexmap::IndexMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntryType {
    File,
    Directory,
    /// Only reported by providers with the `SYMLINK` capability.
    Symlink,
}

/// Node of the in-memory tree owned by [`MapFS`](crate::MapFS).
///
/// Directory children keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    File {
        bytes: Vec<u8>,
        mtime: SystemTime,
    },
    Directory {
        children: IndexMap<String, Node>,
        mtime: SystemTime,
    },
}

impl Node {
    pub fn new_dir() -> Node {
        Node::Directory {
            children: IndexMap::new(),
            mtime: SystemTime::now(),
        }
    }

    pub fn new_file(bytes: &[u8]) -> Node {
        Node::File {
            bytes: bytes.to_vec(),
            mtime: SystemTime::now(),
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            Node::File { .. } => EntryType::File,
            Node::Directory { .. } => EntryType::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    pub fn size(&self) -> u64 {
        match self {
            Node::File { bytes, .. } => bytes.len() as u64,
            Node::Directory { .. } => 0,
        }
    }

    pub fn mtime(&self) -> SystemTime {
        match self {
            Node::File { mtime, .. } | Node::Directory { mtime, .. } => *mtime,
        }
    }

    pub fn touch(&mut self) {
        match self {
            Node::File { mtime, .. } | Node::Directory { mtime, .. } => {
                *mtime = SystemTime::now()
            }
        }
    }

    pub fn children(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Directory { children, .. } => Some(children),
            Node::File { .. } => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut IndexMap<String, Node>> {
        match self {
            Node::Directory { children, .. } => Some(children),
            Node::File { .. } => None,
        }
    }

    pub fn is_empty_dir(&self) -> bool {
        self.children().is_some_and(|children| children.is_empty())
    }
}
