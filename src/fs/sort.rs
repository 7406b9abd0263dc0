use std::cmp::Ordering;

use serde::Serialize;

use crate::fs::record::FileRecord;

/// Attribute a listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SortRole {
    /// Arrival order, no reordering.
    #[default]
    Default,
    /// Display name, case-insensitive.
    Name,
    Size,
    LastRead,
    LastModified,
}

impl SortRole {
    /// Parse a sort role from a config or CLI string.
    pub fn from_str(s: &str) -> Self {
        match s {
            "name" => SortRole::Name,
            "size" => SortRole::Size,
            "last-read" | "accessed" => SortRole::LastRead,
            "modified" | "last-modified" => SortRole::LastModified,
            _ => SortRole::Default,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortRole::Default => "Default",
            SortRole::Name => "Name",
            SortRole::Size => "Size",
            SortRole::LastRead => "Last read",
            SortRole::LastModified => "Last modified",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// A requested ordering: attribute, direction and directory grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SortSpec {
    pub role: SortRole,
    pub order: SortOrder,
    /// When false, directories are grouped before files.
    pub mix_dirs_and_files: bool,
}

impl SortSpec {
    pub fn new(role: SortRole, order: SortOrder, mix_dirs_and_files: bool) -> Self {
        Self {
            role,
            order,
            mix_dirs_and_files,
        }
    }

    pub fn compare(&self, a: &FileRecord, b: &FileRecord) -> Ordering {
        let mut cmp = Ordering::Equal;

        if !self.mix_dirs_and_files {
            cmp = b.is_dir.cmp(&a.is_dir);
        }

        cmp.then_with(|| {
            let by_role = match self.role {
                SortRole::Default => Ordering::Equal,
                SortRole::Name => a.name().to_lowercase().cmp(&b.name().to_lowercase()),
                SortRole::Size => a.sort_key.size.cmp(&b.sort_key.size),
                SortRole::LastRead => a.sort_key.last_read.cmp(&b.sort_key.last_read),
                SortRole::LastModified => {
                    a.sort_key.last_modified.cmp(&b.sort_key.last_modified)
                }
            };
            match self.order {
                SortOrder::Ascending => by_role,
                SortOrder::Descending => by_role.reverse(),
            }
        })
    }

    /// Stable sort, so `SortRole::Default` keeps arrival order.
    pub fn sort(&self, records: &mut [FileRecord]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}
