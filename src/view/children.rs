use std::collections::HashMap;

use crate::fs::locator::Locator;
use crate::fs::record::FileRecord;

/// Arrival-ordered records of one directory with a url → position index.
///
/// Every url in `records` appears exactly once in `index` and vice versa.
#[derive(Debug, Default)]
pub struct ChildList {
    records: Vec<FileRecord>,
    index: HashMap<Locator, usize>,
}

impl ChildList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, url: &Locator) -> bool {
        self.index.contains_key(url)
    }

    pub fn get(&self, url: &Locator) -> Option<&FileRecord> {
        self.index.get(url).map(|&pos| &self.records[pos])
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    /// Append `record` unless its url is already present.
    ///
    /// Returns whether the record was appended.
    pub fn insert(&mut self, record: FileRecord) -> bool {
        if self.index.contains_key(&record.url) {
            return false;
        }
        self.index.insert(record.url.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Replace the record with the same url in place.
    ///
    /// Returns false when the url is not present.
    pub fn replace(&mut self, record: FileRecord) -> bool {
        match self.index.get(&record.url) {
            Some(&pos) => {
                self.records[pos] = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, url: &Locator) -> Option<FileRecord> {
        let pos = self.index.remove(url)?;
        let record = self.records.remove(pos);
        for later in &self.records[pos..] {
            if let Some(p) = self.index.get_mut(&later.url) {
                *p -= 1;
            }
        }
        Some(record)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }

    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        self.records.len() == self.index.len()
            && self
                .records
                .iter()
                .enumerate()
                .all(|(pos, r)| self.index.get(&r.url) == Some(&pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str) -> FileRecord {
        FileRecord::placeholder(Locator::local(format!("/d/{name}")))
    }

    fn names(list: &ChildList) -> Vec<&str> {
        list.records().iter().map(|r| r.name()).collect()
    }

    #[test]
    fn insert_keeps_arrival_order() {
        let mut list = ChildList::new();
        assert!(list.insert(rec("c")));
        assert!(list.insert(rec("a")));
        assert_eq!(names(&list), ["c", "a"]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut list = ChildList::new();
        assert!(list.insert(rec("a")));
        assert!(!list.insert(rec("a")));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_reindexes_later_entries() {
        let mut list = ChildList::new();
        for name in ["a", "b", "c", "d"] {
            list.insert(rec(name));
        }
        assert_eq!(list.remove(&rec("b").url).map(|r| r.name().to_string()), Some("b".into()));
        assert!(list.is_consistent());
        assert_eq!(list.get(&rec("d").url).map(|r| r.name()), Some("d"));
        assert!(list.remove(&rec("b").url).is_none());
    }

    #[test]
    fn replace_only_touches_present_urls() {
        let mut list = ChildList::new();
        list.insert(rec("a"));
        let mut updated = rec("a");
        updated.sort_key.size = 99;
        assert!(list.replace(updated));
        assert_eq!(list.get(&rec("a").url).unwrap().sort_key.size, 99);
        assert!(!list.replace(rec("zz")));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn mixed_operations_stay_consistent() {
        let mut list = ChildList::new();
        for i in 0..50u32 {
            let name = format!("f{}", i % 7);
            match i % 3 {
                0 | 1 => {
                    list.insert(rec(&name));
                }
                _ => {
                    list.remove(&rec(&name).url);
                }
            }
            assert!(list.is_consistent());
        }
    }
}
