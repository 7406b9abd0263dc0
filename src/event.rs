use std::fmt;

use tokio::sync::mpsc;

use crate::fs::locator::Locator;
use crate::fs::record::FileRecord;
use crate::fs::sort::SortSpec;

/// Caller-chosen name for one requested listing (sort and grouping
/// combination) of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingKey(String);

impl ListingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ListingKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Change notifications emitted by a directory view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// One entry discovered by a running traversal.
    TraversalRecord { key: ListingKey, record: FileRecord },
    /// A whole directory read through the bulk fast path, already sorted.
    TraversalBatch {
        key: ListingKey,
        records: Vec<FileRecord>,
        sort: SortSpec,
    },
    /// The current list, served without starting a new traversal.
    SourceData {
        key: ListingKey,
        records: Vec<FileRecord>,
        sort: SortSpec,
        finished: bool,
    },
    /// A traversal delivered its last entry.
    TraversalComplete { key: ListingKey },
    EntriesAdded(Vec<FileRecord>),
    EntryUpdated(FileRecord),
    EntriesRemoved(Vec<FileRecord>),
    /// The watch queue was drained.
    ChildrenUpdated,
    /// The directory's hidden-marker file changed.
    HiddenMarkerChanged(Locator),
    /// Anything showing this url should close.
    CloseRequested(Locator),
}

/// A view event tagged with the directory it concerns.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewUpdate {
    pub root: Locator,
    pub event: ViewEvent,
}

/// Sending side of a view's notification channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    root: Locator,
    tx: mpsc::UnboundedSender<ViewUpdate>,
}

impl Notifier {
    pub fn new(root: Locator, tx: mpsc::UnboundedSender<ViewUpdate>) -> Self {
        Self { root, tx }
    }

    /// Deliver an event. A dropped receiver only means nobody is listening.
    pub fn send(&self, event: ViewEvent) {
        let _ = self.tx.send(ViewUpdate {
            root: self.root.clone(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_tags_events_with_root() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(Locator::local("/d"), tx);
        notifier.send(ViewEvent::ChildrenUpdated);

        let update = rx.try_recv().unwrap();
        assert_eq!(update.root, Locator::local("/d"));
        assert_eq!(update.event, ViewEvent::ChildrenUpdated);
    }

    #[test]
    fn send_without_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        Notifier::new(Locator::local("/d"), tx).send(ViewEvent::ChildrenUpdated);
    }

    #[test]
    fn listing_key_display() {
        assert_eq!(ListingKey::from("name-asc").to_string(), "name-asc");
    }
}
