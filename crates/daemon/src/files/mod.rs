//! Unified filesystem over several ordered root directories.
//!
//! This module provides:
//! - Virtual path resolution between host paths and the unified tree
//! - A case-insensitive blacklist hiding paths from listing and navigation
//! - The [`UnifiedFilesystem`] that routes each operation to a root
//!
//! # Security
//!
//! Virtual paths are clamped at the unified root, and [`FilesystemOps::validpath`]
//! resolves symlinks before checking that a path stays inside a root.

pub mod blacklist;
pub mod error;
pub mod resolver;
pub mod unified;

pub use blacklist::Blacklist;
pub use error::{FsError, FsResult};
pub use resolver::{VirtualPathResolver, ROOT_MARKER};
pub use unified::{FilesystemConfig, FilesystemOps, OpenMode, UnifiedFilesystem};
