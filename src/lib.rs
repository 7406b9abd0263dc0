//! Live directory listings.
//!
//! A [`DirectoryView`] lists one directory through a background traversal,
//! keeps the list current from filesystem watch events and reports every
//! change on a channel. [`DirectoryViewRegistry`] hands out one view per
//! directory.

pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod queue;
pub mod registry;
pub mod traversal;
pub mod view;

pub use error::{Result, ViewError};
pub use event::{ListingKey, ViewEvent, ViewUpdate};
pub use fs::locator::Locator;
pub use fs::provider::{EntryFilter, FileInfoProvider, LocalFileProvider};
pub use fs::record::{FileInfo, FileRecord};
pub use fs::sort::{SortOrder, SortRole, SortSpec};
pub use fs::watcher::{NotifyWatcherFactory, WatchEventSink, WatchHandle, WatcherFactory};
pub use queue::{WatchEvent, WatchEventQueue};
pub use registry::DirectoryViewRegistry;
pub use traversal::{TraversalRequest, TraversalSink, TraversalWorker};
pub use view::{DirectoryView, ViewConfig};
