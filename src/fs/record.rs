use std::time::SystemTime;

use serde::Serialize;

use crate::fs::locator::Locator;

/// Attributes a provider reports for a single entry.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub url: Locator,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub is_hidden: bool,
    pub is_readable: bool,
    pub is_writable: bool,
    pub is_executable: bool,
    pub size: u64,
    pub last_read: Option<SystemTime>,
    pub last_modified: Option<SystemTime>,
}

/// Attributes a listing can be ordered by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub name: String,
    pub size: u64,
    pub last_read: Option<SystemTime>,
    pub last_modified: Option<SystemTime>,
}

/// One entry of a directory listing as known to a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub url: Locator,
    pub is_dir: bool,
    pub is_hidden: bool,
    pub is_symlink: bool,
    pub is_readable: bool,
    pub is_writable: bool,
    pub is_executable: bool,
    pub sort_key: SortKey,
}

impl FileRecord {
    pub fn from_info(info: FileInfo) -> Self {
        let name = info.url.file_name();
        Self {
            url: info.url,
            is_dir: info.is_dir,
            is_hidden: info.is_hidden,
            is_symlink: info.is_symlink,
            is_readable: info.is_readable,
            is_writable: info.is_writable,
            is_executable: info.is_executable,
            sort_key: SortKey {
                name,
                size: info.size,
                last_read: info.last_read,
                last_modified: info.last_modified,
            },
        }
    }

    /// Stand-in for an entry the provider can no longer resolve, so a removal
    /// can still be reported for it.
    pub fn placeholder(url: Locator) -> Self {
        let name = url.file_name();
        Self {
            url,
            is_dir: false,
            is_hidden: false,
            is_symlink: false,
            is_readable: false,
            is_writable: false,
            is_executable: false,
            sort_key: SortKey {
                name,
                ..SortKey::default()
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.sort_key.name
    }
}

impl From<FileInfo> for FileRecord {
    fn from(info: FileInfo) -> Self {
        Self::from_info(info)
    }
}
