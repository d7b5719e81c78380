//! Mapping between host paths and virtual paths.
//!
//! A virtual path is expressed relative to the unified tree. The unified
//! root itself is written as [`ROOT_MARKER`]. Virtual paths are normalized
//! lexically and clamped at the unified root, so `..` can never climb out of
//! a root through this module. Host paths are matched against roots
//! lexically first, then in symlink-resolved form; [`real_path`] backs the
//! containment check.

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Virtual path denoting the unified root.
pub const ROOT_MARKER: &str = ".";

/// Maximum number of symlinks followed by [`real_path`].
const MAX_SYMLINK_HOPS: usize = 40;

/// Lexically normalize an absolute host path (`.` dropped, `..` applied).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(c) => out.push(c),
        }
    }
    out
}

/// Normalize a virtual path, clamping `..` at the unified root.
///
/// Leading separators are ignored. The result never starts with a
/// separator and is [`ROOT_MARKER`] for the root itself.
pub fn normalize_virtual(path: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(c) => parts.push(c.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if parts.is_empty() {
        ROOT_MARKER.to_string()
    } else {
        parts.join("/")
    }
}

/// Join a child name onto a virtual directory path.
pub fn join_virtual(dir: &str, name: &str) -> String {
    if dir == ROOT_MARKER {
        normalize_virtual(name)
    } else {
        normalize_virtual(&format!("{}/{}", dir, name))
    }
}

fn strip_root_prefix(absolute: &Path, root: &Path) -> Option<String> {
    absolute.strip_prefix(root).ok().map(|rest| {
        if rest.as_os_str().is_empty() {
            ROOT_MARKER.to_string()
        } else {
            rest.to_string_lossy().into_owned()
        }
    })
}

/// Resolve symlinks in `path`, tolerating components that do not exist.
///
/// The longest existing prefix is canonicalized and the missing tail is
/// appended. A dangling symlink is followed to its target so that creating
/// through it is judged by where the data would really land.
pub fn real_path(path: &Path) -> PathBuf {
    real_path_inner(&normalize(path), 0)
}

fn real_path_inner(path: &Path, hops: usize) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<OsString> = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for name in tail.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }

        if hops < MAX_SYMLINK_HOPS {
            if let Ok(target) = fs::read_link(&existing) {
                let parent = existing.parent().unwrap_or_else(|| Path::new("/"));
                let mut redirected = normalize(&parent.join(target));
                for name in tail.iter().rev() {
                    redirected.push(name);
                }
                return real_path_inner(&redirected, hops + 1);
            }
        }

        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Pure mapping between absolute host paths and virtual paths over an
/// ordered list of roots.
#[derive(Debug, Clone)]
pub struct VirtualPathResolver {
    roots: Vec<PathBuf>,
}

impl VirtualPathResolver {
    /// Create a resolver over `roots`, normalizing each one lexically.
    ///
    /// Order is preserved: earlier roots take read precedence and the last
    /// root receives new files and directories.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots: roots.iter().map(|r| normalize(r)).collect(),
        }
    }

    /// The configured roots in precedence order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The designated write root (the last configured root).
    pub fn write_root(&self) -> Option<&Path> {
        self.roots.last().map(PathBuf::as_path)
    }

    /// Map an absolute host path to its virtual path.
    ///
    /// The first root that is a component-wise prefix wins. When no root
    /// matches lexically, the symlink-resolved forms of the path and the
    /// roots are compared. Returns `None` when the path lies under no root.
    pub fn to_virtual(&self, absolute: &Path) -> Option<String> {
        let absolute = normalize(absolute);
        self.roots
            .iter()
            .find_map(|root| strip_root_prefix(&absolute, root))
            .or_else(|| {
                let real = real_path(&absolute);
                self.roots
                    .iter()
                    .find_map(|root| strip_root_prefix(&real, &real_path(root)))
            })
    }

    /// Join a virtual path under `root`.
    pub fn to_absolute(&self, virtual_path: &str, root: &Path) -> PathBuf {
        let virtual_path = normalize_virtual(virtual_path);
        if virtual_path == ROOT_MARKER {
            root.to_path_buf()
        } else {
            root.join(virtual_path)
        }
    }

    /// Accept either an absolute host path or a virtual path and return the
    /// normalized virtual form. Absolute paths outside every root yield `None`.
    pub fn virtualize(&self, path: &str) -> Option<String> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            self.to_virtual(candidate)
        } else {
            Some(normalize_virtual(path))
        }
    }
}
