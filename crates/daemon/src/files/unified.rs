//! Unified view over several ordered root directories.
//!
//! Every operation takes a path that is either virtual (relative to the
//! unified tree) or absolute under one of the roots. Lookups scan the roots
//! in order and act on the first one that contains the concrete path; new
//! files and directories always land under the last root.

use std::collections::BTreeSet;
use std::fs::{self, File, Metadata, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

use super::blacklist::Blacklist;
use super::error::{FsError, FsResult};
use super::resolver::{join_virtual, real_path, VirtualPathResolver, ROOT_MARKER};

/// Construction parameters for [`UnifiedFilesystem`].
#[derive(Debug, Clone, Default)]
pub struct FilesystemConfig {
    /// Root directories in precedence order. The last one is the write root.
    pub roots: Vec<PathBuf>,
    /// Case-insensitive regular expressions hiding matching virtual paths.
    pub blacklist: Vec<String>,
}

impl FilesystemConfig {
    /// Create a configuration with no blacklist.
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            blacklist: Vec::new(),
        }
    }

    /// Set the blacklist patterns.
    pub fn with_blacklist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = patterns.into_iter().map(Into::into).collect();
        self
    }
}

/// fopen-style access mode for [`FilesystemOps::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
}

impl OpenMode {
    /// Read-only access to an existing file.
    pub const READ: OpenMode = OpenMode {
        read: true,
        write: false,
        append: false,
        truncate: false,
        create: false,
    };

    /// Create or truncate for writing.
    pub const WRITE: OpenMode = OpenMode {
        read: false,
        write: true,
        append: false,
        truncate: true,
        create: true,
    };

    /// Create or append.
    pub const APPEND: OpenMode = OpenMode {
        read: false,
        write: true,
        append: true,
        truncate: false,
        create: true,
    };

    /// Whether the mode writes to the file.
    pub fn is_write(&self) -> bool {
        self.write || self.append
    }

    /// Whether the mode creates the file when it is missing.
    pub fn creates(&self) -> bool {
        self.create
    }

    fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create);
        options
    }
}

impl FromStr for OpenMode {
    type Err = FsError;

    /// Parse `r`, `w`, `a` with optional `+` and `b`/`t` modifiers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FsError::InvalidMode(s.to_string());
        let mut chars = s.chars();
        let base = chars.next().ok_or_else(invalid)?;
        let mut plus = false;
        for c in chars {
            match c {
                '+' if !plus => plus = true,
                'b' | 't' => {}
                _ => return Err(invalid()),
            }
        }

        let mode = match base {
            'r' => OpenMode {
                write: plus,
                ..OpenMode::READ
            },
            'w' => OpenMode {
                read: plus,
                ..OpenMode::WRITE
            },
            'a' => OpenMode {
                read: plus,
                ..OpenMode::APPEND
            },
            _ => return Err(invalid()),
        };
        Ok(mode)
    }
}

/// Filesystem capability interface consumed by the transfer engine.
///
/// Attribute probes (`is_file`, `is_link`, `is_dir`) answer `false` for
/// missing paths. Every other lookup fails with [`FsError::NotFound`]
/// carrying the requested virtual path.
pub trait FilesystemOps: Send + Sync {
    /// Whether the path resolves to a regular file (following symlinks).
    fn is_file(&self, path: &str) -> bool;
    /// Whether the path is itself a symbolic link.
    fn is_link(&self, path: &str) -> bool;
    /// Whether the path resolves to a directory (following symlinks).
    fn is_dir(&self, path: &str) -> bool;
    /// Metadata following symlinks.
    fn stat(&self, path: &str) -> FsResult<Metadata>;
    /// Metadata of the path itself.
    fn lstat(&self, path: &str) -> FsResult<Metadata>;
    /// Target of a symbolic link.
    fn readlink(&self, path: &str) -> FsResult<PathBuf>;
    /// File size in bytes.
    fn get_size(&self, path: &str) -> FsResult<u64>;
    /// Last modification time.
    fn get_mtime(&self, path: &str) -> FsResult<SystemTime>;
    /// Open a file, creating it under the write root when missing.
    fn open(&self, path: &str, mode: OpenMode) -> FsResult<File>;
    /// Union of the entries of the directory across all roots.
    fn list_dir(&self, path: &str) -> FsResult<Vec<String>>;
    /// Change the session working directory.
    fn chdir(&mut self, path: &str) -> FsResult<()>;
    /// Create a directory under the write root.
    fn mkdir(&self, path: &str) -> FsResult<()>;
    /// Remove an empty directory from the first root containing it.
    fn rmdir(&self, path: &str) -> FsResult<()>;
    /// Remove a file from the first root containing it.
    fn remove(&self, path: &str) -> FsResult<()>;
    /// Rename within the first root containing `src`.
    fn rename(&self, src: &str, dst: &str) -> FsResult<()>;
    /// Always unsupported.
    fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;
    /// Always unsupported.
    fn mkstemp(&self, suffix: &str, prefix: &str, dir: Option<&str>) -> FsResult<(File, PathBuf)>;
    /// Whether the symlink-resolved path stays inside some root.
    fn validpath(&self, path: &str) -> bool;
}

#[derive(Debug)]
struct Shared {
    resolver: VirtualPathResolver,
    blacklist: Blacklist,
}

/// A multi-root filesystem presenting one logical tree.
///
/// Cloning is cheap: the roots and compiled blacklist are shared, while the
/// working directory is per clone, so each client session gets its own.
#[derive(Debug, Clone)]
pub struct UnifiedFilesystem {
    shared: Arc<Shared>,
    cwd: String,
}

impl UnifiedFilesystem {
    /// Build the filesystem from its configuration.
    ///
    /// Fails when no roots are given, a root is relative, or a blacklist
    /// pattern does not compile. Roots missing on disk are tolerated and
    /// logged; they simply contribute nothing until they appear.
    pub fn new(config: FilesystemConfig) -> FsResult<Self> {
        if config.roots.is_empty() {
            return Err(FsError::InvalidConfig(
                "at least one root directory is required".to_string(),
            ));
        }
        if let Some(relative) = config.roots.iter().find(|r| !r.is_absolute()) {
            return Err(FsError::InvalidConfig(format!(
                "root directory must be absolute: {}",
                relative.display()
            )));
        }
        for root in config.roots.iter().filter(|r| !r.is_dir()) {
            tracing::warn!("Root directory {:?} does not exist", root);
        }

        let blacklist = Blacklist::new(&config.blacklist)
            .map_err(|e| FsError::InvalidConfig(format!("invalid blacklist pattern: {}", e)))?;

        Ok(Self {
            shared: Arc::new(Shared {
                resolver: VirtualPathResolver::new(config.roots),
                blacklist,
            }),
            cwd: ROOT_MARKER.to_string(),
        })
    }

    /// The resolver used by this filesystem.
    pub fn resolver(&self) -> &VirtualPathResolver {
        &self.shared.resolver
    }

    /// The roots in precedence order.
    pub fn roots(&self) -> &[PathBuf] {
        self.shared.resolver.roots()
    }

    /// The current session working directory (virtual).
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Whether `path` is hidden by the blacklist.
    pub fn is_blacklisted(&self, path: &str) -> bool {
        self.shared.blacklist.is_blacklisted(path)
    }

    fn write_root(&self) -> &Path {
        // Construction guarantees at least one root.
        self.shared
            .resolver
            .write_root()
            .unwrap_or_else(|| Path::new("/"))
    }

    fn virtualize(&self, path: &str) -> FsResult<String> {
        self.shared
            .resolver
            .virtualize(path)
            .ok_or_else(|| FsError::not_found(path))
    }

    fn concrete(&self, virtual_path: &str, root: &Path) -> PathBuf {
        self.shared.resolver.to_absolute(virtual_path, root)
    }

    /// First root whose concrete path exists, following symlinks. A dangling
    /// link does not shadow a real entry in a later root.
    fn first_existing(&self, virtual_path: &str) -> Option<(&Path, PathBuf)> {
        self.roots().iter().find_map(|root| {
            let full = self.concrete(virtual_path, root);
            fs::metadata(&full).ok().map(|_| (root.as_path(), full))
        })
    }

    /// First root holding a directory entry at the path, links included.
    fn first_entry(&self, virtual_path: &str) -> Option<(&Path, PathBuf)> {
        self.roots().iter().find_map(|root| {
            let full = self.concrete(virtual_path, root);
            fs::symlink_metadata(&full).ok().map(|_| (root.as_path(), full))
        })
    }

    /// Every root where the concrete path is a directory, in order.
    fn all_existing_dirs(&self, virtual_path: &str) -> Vec<PathBuf> {
        self.roots()
            .iter()
            .map(|root| self.concrete(virtual_path, root))
            .filter(|full| full.is_dir())
            .collect()
    }

    fn locate(&self, path: &str) -> FsResult<PathBuf> {
        let virtual_path = self.virtualize(path)?;
        self.first_existing(&virtual_path)
            .map(|(_, full)| full)
            .ok_or(FsError::NotFound { path: virtual_path })
    }

    fn locate_entry(&self, path: &str) -> FsResult<PathBuf> {
        let virtual_path = self.virtualize(path)?;
        self.first_entry(&virtual_path)
            .map(|(_, full)| full)
            .ok_or(FsError::NotFound { path: virtual_path })
    }

    fn probe(&self, path: &str, check: impl Fn(&Path) -> bool) -> bool {
        self.shared
            .resolver
            .virtualize(path)
            .and_then(|virtual_path| self.first_existing(&virtual_path))
            .is_some_and(|(_, full)| check(&full))
    }
}

impl FilesystemOps for UnifiedFilesystem {
    fn is_file(&self, path: &str) -> bool {
        self.probe(path, Path::is_file)
    }

    fn is_link(&self, path: &str) -> bool {
        self.shared
            .resolver
            .virtualize(path)
            .and_then(|virtual_path| self.first_entry(&virtual_path))
            .is_some_and(|(_, full)| full.is_symlink())
    }

    fn is_dir(&self, path: &str) -> bool {
        self.probe(path, Path::is_dir)
    }

    fn stat(&self, path: &str) -> FsResult<Metadata> {
        Ok(fs::metadata(self.locate(path)?)?)
    }

    fn lstat(&self, path: &str) -> FsResult<Metadata> {
        Ok(fs::symlink_metadata(self.locate_entry(path)?)?)
    }

    fn readlink(&self, path: &str) -> FsResult<PathBuf> {
        Ok(fs::read_link(self.locate_entry(path)?)?)
    }

    fn get_size(&self, path: &str) -> FsResult<u64> {
        Ok(self.stat(path)?.len())
    }

    fn get_mtime(&self, path: &str) -> FsResult<SystemTime> {
        Ok(self.stat(path)?.modified()?)
    }

    fn open(&self, path: &str, mode: OpenMode) -> FsResult<File> {
        let virtual_path = self.virtualize(path)?;

        let existing = self
            .roots()
            .iter()
            .map(|root| self.concrete(&virtual_path, root))
            .find(|full| full.is_file());

        let target = match existing {
            Some(full) => full,
            None if mode.creates() => {
                let full = self.concrete(&virtual_path, self.write_root());
                tracing::debug!("Creating {:?} under write root", full);
                full
            }
            None => return Err(FsError::NotFound { path: virtual_path }),
        };

        Ok(mode.options().open(target)?)
    }

    fn list_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let virtual_path = self.virtualize(path)?;
        let is_root = virtual_path == ROOT_MARKER;
        if !is_root && self.is_blacklisted(&virtual_path) {
            return Err(FsError::NotFound { path: virtual_path });
        }

        let dirs = self.all_existing_dirs(&virtual_path);
        if dirs.is_empty() && !is_root {
            return Err(FsError::NotFound { path: virtual_path });
        }

        let mut listing = BTreeSet::new();
        for dir in dirs {
            for entry in fs::read_dir(&dir)? {
                let Ok(entry) = entry else {
                    continue;
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                if self.is_blacklisted(&join_virtual(&virtual_path, &name)) {
                    continue;
                }
                listing.insert(name);
            }
        }
        Ok(listing.into_iter().collect())
    }

    fn chdir(&mut self, path: &str) -> FsResult<()> {
        let virtual_path = self.virtualize(path)?;
        if virtual_path != ROOT_MARKER && self.is_blacklisted(&virtual_path) {
            return Err(FsError::NotFound { path: virtual_path });
        }
        if virtual_path != ROOT_MARKER && self.all_existing_dirs(&virtual_path).is_empty() {
            return Err(FsError::NotFound { path: virtual_path });
        }
        self.cwd = virtual_path;
        Ok(())
    }

    fn mkdir(&self, path: &str) -> FsResult<()> {
        let virtual_path = self.virtualize(path)?;
        fs::create_dir(self.concrete(&virtual_path, self.write_root()))?;
        Ok(())
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        fs::remove_dir(self.locate(path)?)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        fs::remove_file(self.locate_entry(path)?)?;
        Ok(())
    }

    fn rename(&self, src: &str, dst: &str) -> FsResult<()> {
        let src_virtual = self.virtualize(src)?;
        let dst_virtual = self.virtualize(dst)?;

        if self.is_blacklisted(&src_virtual) {
            return Err(FsError::NotFound { path: src_virtual });
        }
        let (root, from) = self
            .first_entry(&src_virtual)
            .ok_or_else(|| FsError::not_found(src_virtual.clone()))?;
        let to = self.concrete(&dst_virtual, root);

        tracing::debug!("Renaming {:?} to {:?}", from, to);
        fs::rename(from, to)?;
        Ok(())
    }

    fn chmod(&self, _path: &str, _mode: u32) -> FsResult<()> {
        Err(FsError::unsupported("chmod"))
    }

    fn mkstemp(
        &self,
        _suffix: &str,
        _prefix: &str,
        _dir: Option<&str>,
    ) -> FsResult<(File, PathBuf)> {
        Err(FsError::unsupported("mkstemp"))
    }

    fn validpath(&self, path: &str) -> bool {
        let Some(virtual_path) = self.shared.resolver.virtualize(path) else {
            return false;
        };

        // Resolve the entry that holds the path, or where it would be created.
        let full = match self.first_entry(&virtual_path) {
            Some((_, full)) => full,
            None => self.concrete(&virtual_path, self.write_root()),
        };
        let resolved = real_path(&full);
        self.roots()
            .iter()
            .any(|root| resolved.starts_with(real_path(root)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    struct Fixture {
        _dirs: Vec<TempDir>,
        roots: Vec<PathBuf>,
    }

    fn fixture(count: usize) -> Fixture {
        let dirs: Vec<TempDir> = (0..count).map(|_| TempDir::new().unwrap()).collect();
        let roots = dirs.iter().map(|d| d.path().to_path_buf()).collect();
        Fixture { _dirs: dirs, roots }
    }

    fn unified(roots: &[PathBuf], blacklist: &[&str]) -> UnifiedFilesystem {
        UnifiedFilesystem::new(
            FilesystemConfig::new(roots.to_vec()).with_blacklist(blacklist.iter().copied()),
        )
        .unwrap()
    }

    fn read_all(mut file: File) -> String {
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        contents
    }

    #[test]
    fn test_new_rejects_empty_roots() {
        let result = UnifiedFilesystem::new(FilesystemConfig::new(Vec::new()));
        assert!(matches!(result, Err(FsError::InvalidConfig(_))));
    }

    #[test]
    fn test_new_rejects_relative_root() {
        let result = UnifiedFilesystem::new(FilesystemConfig::new(vec![PathBuf::from("rel")]));
        assert!(matches!(result, Err(FsError::InvalidConfig(_))));
    }

    #[test]
    fn test_new_rejects_bad_pattern() {
        let fx = fixture(1);
        let result =
            UnifiedFilesystem::new(FilesystemConfig::new(fx.roots.clone()).with_blacklist(["["]));
        assert!(matches!(result, Err(FsError::InvalidConfig(_))));
    }

    #[test]
    fn test_probes_do_not_raise() {
        let fx = fixture(2);
        fs::write(fx.roots[1].join("file.txt"), "x").unwrap();
        fs::create_dir(fx.roots[0].join("dir")).unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert!(ufs.is_file("file.txt"));
        assert!(ufs.is_dir("dir"));
        assert!(!ufs.is_link("file.txt"));
        assert!(!ufs.is_file("missing"));
        assert!(!ufs.is_dir("missing"));
        assert!(!ufs.is_link("missing"));
        assert!(!ufs.is_file("/outside/of/roots"));
    }

    #[test]
    fn test_first_root_wins_for_stat_and_open() {
        let fx = fixture(3);
        fs::write(fx.roots[1].join("dup.txt"), "second").unwrap();
        fs::write(fx.roots[2].join("dup.txt"), "third!").unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert_eq!(ufs.get_size("dup.txt").unwrap(), 6);
        assert_eq!(read_all(ufs.open("dup.txt", OpenMode::READ).unwrap()), "second");
    }

    #[test]
    fn test_lookups_raise_not_found_with_virtual_path() {
        let fx = fixture(2);
        let ufs = unified(&fx.roots, &[]);

        for result in [
            ufs.stat("a/b.txt").map(|_| ()),
            ufs.lstat("a/b.txt").map(|_| ()),
            ufs.readlink("a/b.txt").map(|_| ()),
            ufs.get_size("a/b.txt").map(|_| ()),
            ufs.get_mtime("a/b.txt").map(|_| ()),
            ufs.open("a/b.txt", OpenMode::READ).map(|_| ()),
            ufs.rmdir("a/b.txt"),
            ufs.remove("a/b.txt"),
            ufs.rename("a/b.txt", "a/c.txt"),
        ] {
            match result {
                Err(FsError::NotFound { path }) => assert_eq!(path, "a/b.txt"),
                other => panic!("expected NotFound, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_absolute_paths_are_virtualized() {
        let fx = fixture(2);
        fs::write(fx.roots[1].join("abs.txt"), "abc").unwrap();
        let ufs = unified(&fx.roots, &[]);

        // An absolute path under the first root still resolves by virtual
        // path, so the file in the second root is found.
        let via_first = fx.roots[0].join("abs.txt");
        assert_eq!(ufs.get_size(via_first.to_str().unwrap()).unwrap(), 3);
    }

    #[test]
    fn test_open_write_creates_under_last_root() {
        let fx = fixture(3);
        let ufs = unified(&fx.roots, &[]);

        let mut file = ufs.open("newfile.txt", OpenMode::WRITE).unwrap();
        file.write_all(b"hello").unwrap();
        drop(file);

        assert!(fx.roots[2].join("newfile.txt").is_file());
        assert!(!fx.roots[0].join("newfile.txt").exists());
        assert!(!fx.roots[1].join("newfile.txt").exists());
    }

    #[test]
    fn test_open_write_existing_file_stays_in_its_root() {
        let fx = fixture(2);
        fs::write(fx.roots[0].join("log.txt"), "a").unwrap();
        let ufs = unified(&fx.roots, &[]);

        let mut file = ufs.open("log.txt", "ab".parse().unwrap()).unwrap();
        file.write_all(b"b").unwrap();
        drop(file);

        assert_eq!(fs::read_to_string(fx.roots[0].join("log.txt")).unwrap(), "ab");
        assert!(!fx.roots[1].join("log.txt").exists());
    }

    #[test]
    fn test_open_read_plus_missing_is_not_found() {
        let fx = fixture(1);
        let ufs = unified(&fx.roots, &[]);
        let result = ufs.open("nope", "r+".parse().unwrap());
        assert!(matches!(result, Err(FsError::NotFound { .. })));
    }

    #[test]
    fn test_list_dir_unions_and_deduplicates() {
        let fx = fixture(3);
        for root in &fx.roots {
            fs::write(root.join("same.txt"), "x").unwrap();
        }
        fs::write(fx.roots[0].join("one.txt"), "1").unwrap();
        fs::write(fx.roots[2].join("three.txt"), "3").unwrap();
        let ufs = unified(&fx.roots, &[]);

        let listing = ufs.list_dir(".").unwrap();
        assert_eq!(listing, vec!["one.txt", "same.txt", "three.txt"]);
    }

    #[test]
    fn test_list_dir_filters_blacklist_on_child_path() {
        let fx = fixture(2);
        fs::create_dir(fx.roots[0].join("pub")).unwrap();
        fs::write(fx.roots[0].join("pub/ok.txt"), "").unwrap();
        fs::create_dir(fx.roots[1].join("pub")).unwrap();
        fs::write(fx.roots[1].join("pub/tmp.part"), "").unwrap();
        let ufs = unified(&fx.roots, &["\\.part$"]);

        assert_eq!(ufs.list_dir("pub").unwrap(), vec!["ok.txt"]);
    }

    #[test]
    fn test_list_dir_missing() {
        let fx = fixture(2);
        let ufs = unified(&fx.roots, &[]);
        assert!(matches!(
            ufs.list_dir("nowhere"),
            Err(FsError::NotFound { path }) if path == "nowhere"
        ));
    }

    #[test]
    fn test_list_dir_root_never_not_found() {
        let missing = vec![PathBuf::from("/nonexistent-uniftp-root-a")];
        let ufs = unified(&missing, &[]);
        assert!(ufs.list_dir(".").unwrap().is_empty());
    }

    #[test]
    fn test_chdir_respects_blacklist() {
        let fx = fixture(2);
        fs::create_dir(fx.roots[0].join("secret")).unwrap();
        fs::create_dir(fx.roots[1].join("music")).unwrap();
        let mut ufs = unified(&fx.roots, &["^secret"]);

        assert!(matches!(
            ufs.chdir("secret"),
            Err(FsError::NotFound { path }) if path == "secret"
        ));
        assert_eq!(ufs.cwd(), ".");

        ufs.chdir("music").unwrap();
        assert_eq!(ufs.cwd(), "music");

        ufs.chdir(".").unwrap();
        assert_eq!(ufs.cwd(), ".");
    }

    #[test]
    fn test_chdir_is_per_clone() {
        let fx = fixture(1);
        fs::create_dir(fx.roots[0].join("a")).unwrap();
        let ufs = unified(&fx.roots, &[]);
        let mut session = ufs.clone();

        session.chdir("a").unwrap();
        assert_eq!(session.cwd(), "a");
        assert_eq!(ufs.cwd(), ".");
    }

    #[test]
    fn test_chdir_rejects_files() {
        let fx = fixture(1);
        fs::write(fx.roots[0].join("f"), "").unwrap();
        let mut ufs = unified(&fx.roots, &[]);
        assert!(ufs.chdir("f").is_err());
    }

    #[test]
    fn test_mkdir_under_write_root() {
        let fx = fixture(2);
        let ufs = unified(&fx.roots, &[]);
        ufs.mkdir("uploads").unwrap();
        assert!(fx.roots[1].join("uploads").is_dir());
        assert!(!fx.roots[0].join("uploads").exists());
    }

    #[test]
    fn test_remove_and_rmdir_use_first_root() {
        let fx = fixture(2);
        fs::write(fx.roots[0].join("f.txt"), "").unwrap();
        fs::write(fx.roots[1].join("f.txt"), "").unwrap();
        fs::create_dir(fx.roots[1].join("d")).unwrap();
        let ufs = unified(&fx.roots, &[]);

        ufs.remove("f.txt").unwrap();
        assert!(!fx.roots[0].join("f.txt").exists());
        assert!(fx.roots[1].join("f.txt").exists());

        ufs.rmdir("d").unwrap();
        assert!(!fx.roots[1].join("d").exists());
    }

    #[test]
    fn test_rename_stays_in_source_root() {
        let fx = fixture(3);
        fs::create_dir(fx.roots[1].join("a")).unwrap();
        fs::write(fx.roots[1].join("a/old.txt"), "data").unwrap();
        fs::create_dir(fx.roots[2].join("a")).unwrap();
        let ufs = unified(&fx.roots, &[]);

        ufs.rename("a/old.txt", "a/new.txt").unwrap();

        assert!(fx.roots[1].join("a/new.txt").is_file());
        assert!(!fx.roots[1].join("a/old.txt").exists());
        assert!(!fx.roots[0].join("a/new.txt").exists());
        assert!(!fx.roots[2].join("a/new.txt").exists());
    }

    #[test]
    fn test_rename_accepts_absolute_endpoints() {
        let fx = fixture(2);
        fs::write(fx.roots[1].join("x.txt"), "").unwrap();
        let ufs = unified(&fx.roots, &[]);

        let src = fx.roots[0].join("x.txt");
        let dst = fx.roots[0].join("y.txt");
        ufs.rename(src.to_str().unwrap(), dst.to_str().unwrap()).unwrap();

        assert!(fx.roots[1].join("y.txt").is_file());
        assert!(!fx.roots[0].join("y.txt").exists());
    }

    #[test]
    fn test_rename_blacklisted_source_is_not_found() {
        let fx = fixture(1);
        fs::write(fx.roots[0].join("secret.txt"), "").unwrap();
        let ufs = unified(&fx.roots, &["^secret"]);
        assert!(matches!(
            ufs.rename("secret.txt", "public.txt"),
            Err(FsError::NotFound { .. })
        ));
        assert!(fx.roots[0].join("secret.txt").exists());
    }

    #[test]
    fn test_unsupported_operations() {
        let fx = fixture(1);
        fs::write(fx.roots[0].join("f"), "").unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert!(matches!(
            ufs.chmod("f", 0o777),
            Err(FsError::Unsupported { operation: "chmod" })
        ));
        assert!(matches!(
            ufs.mkstemp("", "tmp", None),
            Err(FsError::Unsupported { operation: "mkstemp" })
        ));
    }

    #[test]
    fn test_readlink_and_lstat() {
        let fx = fixture(1);
        fs::write(fx.roots[0].join("target.txt"), "t").unwrap();
        symlink("target.txt", fx.roots[0].join("link")).unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert!(ufs.is_link("link"));
        assert!(ufs.is_file("link"));
        assert_eq!(ufs.readlink("link").unwrap(), PathBuf::from("target.txt"));
        assert!(ufs.lstat("link").unwrap().file_type().is_symlink());
        assert!(ufs.stat("link").unwrap().is_file());
    }

    #[test]
    fn test_dangling_link_does_not_shadow_later_root() {
        let fx = fixture(2);
        symlink("nowhere.txt", fx.roots[0].join("f.txt")).unwrap();
        fs::write(fx.roots[1].join("f.txt"), "hello").unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert!(ufs.is_file("f.txt"));
        assert_eq!(ufs.get_size("f.txt").unwrap(), 5);
        assert!(ufs.stat("f.txt").unwrap().is_file());
        assert!(ufs.get_mtime("f.txt").is_ok());
        assert_eq!(read_all(ufs.open("f.txt", OpenMode::READ).unwrap()), "hello");

        // Link-level operations still see the link itself.
        assert!(ufs.is_link("f.txt"));
        assert!(ufs.lstat("f.txt").unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_dangling_link_alone_is_not_found() {
        let fx = fixture(1);
        symlink("nowhere.txt", fx.roots[0].join("f.txt")).unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert!(!ufs.is_file("f.txt"));
        assert!(matches!(ufs.stat("f.txt"), Err(FsError::NotFound { path }) if path == "f.txt"));
        assert!(matches!(ufs.get_size("f.txt"), Err(FsError::NotFound { .. })));
        assert_eq!(ufs.readlink("f.txt").unwrap(), PathBuf::from("nowhere.txt"));

        ufs.remove("f.txt").unwrap();
        assert!(fs::symlink_metadata(fx.roots[0].join("f.txt")).is_err());
    }

    #[test]
    fn test_validpath_accepts_link_into_other_root() {
        let fx = fixture(2);
        fs::write(fx.roots[1].join("shared.txt"), "s").unwrap();
        symlink(fx.roots[1].join("shared.txt"), fx.roots[0].join("link.txt")).unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert!(ufs.validpath("link.txt"));
    }

    #[test]
    fn test_validpath_inside_roots() {
        let fx = fixture(2);
        fs::write(fx.roots[1].join("f"), "").unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert!(ufs.validpath("."));
        assert!(ufs.validpath("f"));
        assert!(ufs.validpath("not/yet/created.txt"));
        assert!(ufs.validpath(fx.roots[1].join("f").to_str().unwrap()));
    }

    #[test]
    fn test_validpath_rejects_symlink_escape() {
        let fx = fixture(1);
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("passwd"), "").unwrap();
        symlink(outside.path(), fx.roots[0].join("escape")).unwrap();
        let ufs = unified(&fx.roots, &[]);

        // Lexically under the root, really outside it.
        assert!(ufs.is_file("escape/passwd"));
        assert!(!ufs.validpath("escape/passwd"));
        assert!(!ufs.validpath("escape"));
    }

    #[test]
    fn test_validpath_escape_not_masked_by_later_root() {
        let fx = fixture(2);
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("passwd"), "").unwrap();
        symlink(outside.path(), fx.roots[0].join("escape")).unwrap();
        let ufs = unified(&fx.roots, &[]);

        assert!(!ufs.validpath("escape/passwd"));
    }

    #[test]
    fn test_validpath_rejects_absolute_outside() {
        let fx = fixture(1);
        let ufs = unified(&fx.roots, &[]);
        assert!(!ufs.validpath("/etc/passwd"));
    }

    #[test]
    fn test_validpath_no_partial_segment_match() {
        let parent = TempDir::new().unwrap();
        let root1 = parent.path().join("root1");
        let root12 = parent.path().join("root12");
        fs::create_dir(&root1).unwrap();
        fs::create_dir(&root12).unwrap();
        symlink(&root12, root1.join("sideways")).unwrap();
        let ufs = unified(&[root1], &[]);

        assert!(!ufs.validpath("sideways"));
    }

    #[test]
    fn test_open_mode_parsing() {
        let read: OpenMode = "rb".parse().unwrap();
        assert_eq!(read, OpenMode::READ);
        assert!(!read.is_write());

        let write: OpenMode = "wb".parse().unwrap();
        assert!(write.is_write());
        assert!(write.creates());

        let update: OpenMode = "r+b".parse().unwrap();
        assert!(update.is_write());
        assert!(!update.creates());

        assert!("a+".parse::<OpenMode>().unwrap().creates());
        assert!(matches!("x".parse::<OpenMode>(), Err(FsError::InvalidMode(_))));
        assert!(matches!("".parse::<OpenMode>(), Err(FsError::InvalidMode(_))));
        assert!(matches!("r++".parse::<OpenMode>(), Err(FsError::InvalidMode(_))));
    }
}
