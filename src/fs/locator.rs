use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Serialize, Serializer};

/// Scheme used for entries on the local filesystem.
pub const LOCAL_SCHEME: &str = "file";

/// Identity of a directory entry: a scheme plus a lexically normalized path.
///
/// Two locators compare equal when they name the same entry, regardless of
/// trailing separators or `.` components in the spelling they were built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    scheme: String,
    path: PathBuf,
}

impl Locator {
    /// Build a locator with an explicit scheme.
    pub fn new(scheme: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            scheme: scheme.into(),
            path: normalize(path.as_ref()),
        }
    }

    /// Build a locator for a local filesystem path.
    pub fn local(path: impl AsRef<Path>) -> Self {
        Self::new(LOCAL_SCHEME, path)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_local(&self) -> bool {
        self.scheme == LOCAL_SCHEME
    }

    /// Locator of the child `name` under this one, keeping the scheme.
    pub fn join(&self, name: impl AsRef<Path>) -> Self {
        Self::new(self.scheme.clone(), self.path.join(name))
    }

    pub fn parent(&self) -> Option<Self> {
        self.path
            .parent()
            .map(|p| Self::new(self.scheme.clone(), p))
    }

    /// Last path component, or the whole path for a root.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path.display())
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Drop `.` components and trailing separators without touching the disk.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_separator_is_ignored() {
        assert_eq!(Locator::local("/tmp/dir/"), Locator::local("/tmp/dir"));
    }

    #[test]
    fn cur_dir_components_are_ignored() {
        assert_eq!(Locator::local("/tmp/./dir"), Locator::local("/tmp/dir"));
    }

    #[test]
    fn scheme_is_part_of_identity() {
        assert_ne!(Locator::new("smb", "/share/a"), Locator::local("/share/a"));
    }

    #[test]
    fn join_keeps_scheme() {
        let child = Locator::new("smb", "/share").join("doc.txt");
        assert_eq!(child.scheme(), "smb");
        assert_eq!(child.path(), Path::new("/share/doc.txt"));
    }

    #[test]
    fn parent_and_file_name() {
        let loc = Locator::local("/home/user/notes.md");
        assert_eq!(loc.parent(), Some(Locator::local("/home/user")));
        assert_eq!(loc.file_name(), "notes.md");
    }

    #[test]
    fn display_includes_scheme() {
        assert_eq!(Locator::local("/tmp/x").to_string(), "file:///tmp/x");
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Locator::local("/tmp/x")).unwrap();
        assert_eq!(json, "\"file:///tmp/x\"");
    }
}
