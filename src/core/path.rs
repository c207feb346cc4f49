//! Virtual path model.
//!
//! Virtual paths are independent of the host's path conventions: they are
//! always absolute, `/`-separated and lexically normalized. Nothing here
//! touches a filesystem.

use std::fmt;

use super::error::{Result, VfsError};

const SEPARATOR: char = '/';

/// Canonical absolute path inside a virtual file system.
///
/// Invariants:
/// - starts with `/`;
/// - has no `.` or `..` segments, no empty segments and no NUL bytes;
/// - has no trailing `/`, except for the root itself.
///
/// Two paths are equal iff their canonical strings are byte-equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualPath(String);

impl VirtualPath {
    pub fn root() -> Self {
        VirtualPath(String::from("/"))
    }

    /// Parses an absolute path, normalizing it.
    /// Relative input is rejected with `InvalidPath`.
    pub fn parse(raw: &str) -> Result<Self> {
        if !raw.starts_with(SEPARATOR) {
            return Err(VfsError::InvalidPath(format!(
                "'{raw}' is not an absolute path"
            )));
        }
        normalize(raw, &VirtualPath::root())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Iterates over the path segments, root excluded.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Parent directory; the root is its own parent.
    pub fn parent(&self) -> VirtualPath {
        dirname(self)
    }

    /// Last segment; empty for the root.
    pub fn file_name(&self) -> &str {
        basename(self)
    }

    /// Normalizes `segment` against this path.
    pub fn join(&self, segment: &str) -> Result<VirtualPath> {
        join(self, segment)
    }

    /// True if `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &VirtualPath) -> bool {
        is_ancestor(self, other)
    }

    /// Relative remainder of `self` below `ancestor`, without a leading `/`.
    /// Returns `None` if `ancestor` is not an ancestor of `self`.
    pub fn strip_ancestor(&self, ancestor: &VirtualPath) -> Option<&str> {
        if !is_ancestor(ancestor, self) {
            return None;
        }
        if ancestor.is_root() {
            return Some(&self.0[1..]);
        }
        let rest = &self.0[ancestor.0.len()..];
        Some(rest.trim_start_matches(SEPARATOR))
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for VirtualPath {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for VirtualPath {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Resolves `raw` into a [`VirtualPath`].
///
/// Relative input is resolved against `base`; empty input yields `base`.
/// `.` and `..` are resolved lexically. A NUL byte, or a `..` climbing
/// above `/`, fails with `InvalidPath`.
pub fn normalize(raw: &str, base: &VirtualPath) -> Result<VirtualPath> {
    if raw.contains('\0') {
        return Err(VfsError::InvalidPath(format!(
            "'{}' contains a NUL byte",
            raw.escape_default()
        )));
    }

    let mut stack: Vec<&str> = if raw.starts_with(SEPARATOR) {
        Vec::new()
    } else {
        base.components().collect()
    };

    for segment in raw.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(VfsError::InvalidPath(format!(
                        "'{raw}' escapes the virtual root"
                    )));
                }
            }
            name => stack.push(name),
        }
    }

    let mut canonical = String::with_capacity(raw.len() + base.0.len() + 1);
    for segment in &stack {
        canonical.push(SEPARATOR);
        canonical.push_str(segment);
    }
    if canonical.is_empty() {
        canonical.push(SEPARATOR);
    }
    Ok(VirtualPath(canonical))
}

pub fn join(base: &VirtualPath, segment: &str) -> Result<VirtualPath> {
    normalize(segment, base)
}

pub fn dirname(path: &VirtualPath) -> VirtualPath {
    match path.0.rfind(SEPARATOR) {
        Some(0) | None => VirtualPath::root(),
        Some(idx) => VirtualPath(path.0[..idx].to_string()),
    }
}

pub fn basename(path: &VirtualPath) -> &str {
    match path.0.rfind(SEPARATOR) {
        Some(idx) => &path.0[idx + 1..],
        None => "",
    }
}

/// String-prefix ancestry over canonical forms. A path is its own ancestor.
pub fn is_ancestor(ancestor: &VirtualPath, path: &VirtualPath) -> bool {
    if ancestor.is_root() || ancestor == path {
        return true;
    }
    path.0.len() > ancestor.0.len()
        && path.0.starts_with(&ancestor.0)
        && path.0.as_bytes()[ancestor.0.len()] == b'/'
}
