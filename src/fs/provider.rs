use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use glob::Pattern;

use crate::error::Result;
use crate::fs::locator::Locator;
use crate::fs::record::{FileInfo, FileRecord};
use crate::fs::sort::SortSpec;

/// Name of the per-directory control file listing extra hidden entries.
pub const HIDDEN_MARKER_NAME: &str = ".hidden";

/// Source of file attributes and directory contents.
///
/// Implementations may be called from traversal and watch-consumer threads
/// concurrently.
pub trait FileInfoProvider: Send + Sync {
    /// Query one entry. `None` means the entry no longer exists or cannot be
    /// reached.
    fn create(&self, url: &Locator) -> Option<FileInfo>;

    /// Immediate children of a directory, in enumeration order.
    fn children(&self, dir: &Locator) -> Result<Vec<Locator>>;

    /// Fast path: read, filter and sort a whole directory in one go.
    ///
    /// Returns `None` when the fast path is unavailable for `dir` or the scan
    /// was cancelled through `cancel`.
    fn bulk_local(
        &self,
        _dir: &Locator,
        _filter: &EntryFilter,
        _sort: &SortSpec,
        _cancel: &AtomicBool,
    ) -> Option<Vec<FileRecord>> {
        None
    }

    /// Drop anything cached about `url`.
    fn refresh(&self, _url: &Locator) {}

    /// Location of the hidden-marker file governing `dir`.
    fn hidden_marker(&self, dir: &Locator) -> Locator {
        dir.join(HIDDEN_MARKER_NAME)
    }
}

/// Which entries a traversal reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    pub include_hidden: bool,
    /// Glob patterns (`*`, `?`, `[...]`) matched against the file name.
    /// Empty accepts every name.
    pub name_filters: Vec<Pattern>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            include_hidden: true,
            name_filters: Vec::new(),
        }
    }
}

impl EntryFilter {
    /// Compile `patterns` into name filters.
    pub fn with_name_filters<S: AsRef<str>>(include_hidden: bool, patterns: &[S]) -> Result<Self> {
        let name_filters = patterns
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            include_hidden,
            name_filters,
        })
    }

    pub fn accepts(&self, record: &FileRecord) -> bool {
        if !self.include_hidden && record.is_hidden {
            return false;
        }
        self.name_filters.is_empty()
            || self.name_filters.iter().any(|p| p.matches(record.name()))
    }
}

/// Cached contents of one directory's hidden-marker file.
struct MarkerEntry {
    modified: Option<SystemTime>,
    names: Arc<HashSet<String>>,
}

/// Provider backed by `std::fs` for `file` locators.
///
/// An entry is hidden when its name starts with a dot or when it is listed in
/// its parent's `.hidden` file.
#[derive(Default)]
pub struct LocalFileProvider {
    markers: Mutex<HashMap<PathBuf, MarkerEntry>>,
}

impl LocalFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names listed in `dir/.hidden`, re-read when the file's mtime changes.
    fn hidden_names(&self, dir: &Path) -> Arc<HashSet<String>> {
        let marker = dir.join(HIDDEN_MARKER_NAME);
        let modified = fs::metadata(&marker).and_then(|m| m.modified()).ok();

        let mut markers = self.markers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = markers.get(dir) {
            if entry.modified == modified {
                return Arc::clone(&entry.names);
            }
        }

        let names: HashSet<String> = fs::read_to_string(&marker)
            .map(|content| {
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let names = Arc::new(names);
        markers.insert(
            dir.to_path_buf(),
            MarkerEntry {
                modified,
                names: Arc::clone(&names),
            },
        );
        names
    }

    fn info_with_markers(&self, url: &Locator, hidden: &HashSet<String>) -> Option<FileInfo> {
        let path = url.path();
        let link_meta = fs::symlink_metadata(path).ok()?;
        // Follow symlinks for kind and permissions; a dangling link keeps its own.
        let meta = fs::metadata(path).unwrap_or_else(|_| link_meta.clone());
        let name = url.file_name();
        let (is_readable, is_writable, is_executable) = permissions(path, &meta);

        Some(FileInfo {
            url: url.clone(),
            is_dir: meta.is_dir(),
            is_symlink: link_meta.is_symlink(),
            is_hidden: name.starts_with('.') || hidden.contains(&name),
            is_readable,
            is_writable,
            is_executable,
            size: meta.len(),
            last_read: meta.accessed().ok(),
            last_modified: meta.modified().ok(),
        })
    }
}

/// Read, write and execute access for the calling process.
#[cfg(unix)]
fn permissions(path: &Path, _meta: &fs::Metadata) -> (bool, bool, bool) {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return (false, false, false);
    };
    // Checked against the effective ids, owner and ACLs included
    let allowed = |mode| {
        (unsafe { libc::faccessat(libc::AT_FDCWD, c_path.as_ptr(), mode, libc::AT_EACCESS) }) == 0
    };
    (allowed(libc::R_OK), allowed(libc::W_OK), allowed(libc::X_OK))
}

#[cfg(not(unix))]
fn permissions(_path: &Path, meta: &fs::Metadata) -> (bool, bool, bool) {
    (true, !meta.permissions().readonly(), meta.is_dir())
}

impl FileInfoProvider for LocalFileProvider {
    fn create(&self, url: &Locator) -> Option<FileInfo> {
        if !url.is_local() {
            return None;
        }
        let hidden = match url.path().parent() {
            Some(parent) => self.hidden_names(parent),
            None => Arc::new(HashSet::new()),
        };
        self.info_with_markers(url, &hidden)
    }

    fn children(&self, dir: &Locator) -> Result<Vec<Locator>> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir.path())? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            children.push(dir.join(entry.file_name()));
        }
        Ok(children)
    }

    fn bulk_local(
        &self,
        dir: &Locator,
        filter: &EntryFilter,
        sort: &SortSpec,
        cancel: &AtomicBool,
    ) -> Option<Vec<FileRecord>> {
        if !dir.is_local() {
            return None;
        }
        let entries = fs::read_dir(dir.path()).ok()?;
        let hidden = self.hidden_names(dir.path());

        let mut records = Vec::new();
        for entry in entries {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let url = dir.join(entry.file_name());
            if let Some(info) = self.info_with_markers(&url, &hidden) {
                let record = FileRecord::from_info(info);
                if filter.accepts(&record) {
                    records.push(record);
                }
            }
        }

        sort.sort(&mut records);
        Some(records)
    }

    fn refresh(&self, url: &Locator) {
        if url.file_name() == HIDDEN_MARKER_NAME {
            if let Some(parent) = url.path().parent() {
                self.markers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(parent);
            }
        }
    }
}
