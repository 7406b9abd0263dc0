//! A live listing of one directory.
//!
//! A [`DirectoryView`] owns the deduplicated entry list of its directory,
//! feeds it from a [`TraversalWorker`] and from watch events, and reports
//! every change through its notification channel.

mod children;
mod listings;
mod shared;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, ViewError};
use crate::event::{ListingKey, Notifier, ViewUpdate};
use crate::fs::locator::Locator;
use crate::fs::provider::{EntryFilter, FileInfoProvider};
use crate::fs::record::FileRecord;
use crate::fs::sort::SortSpec;
use crate::fs::watcher::{WatchHandle, WatcherFactory};
use crate::queue::WatchEvent;
use crate::traversal::{TraversalRequest, TraversalSink, TraversalWorker};

pub use children::ChildList;
pub use listings::{ListingCache, DEFAULT_MAX_CACHED_LISTINGS};

use shared::{ViewShared, WeakViewSink};

/// Runtime settings of a directory view.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Serve repeated opens from the current list instead of rescanning.
    pub cache_listings: bool,
    pub max_cached_listings: usize,
    pub filter: EntryFilter,
    pub local_fast_path: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            cache_listings: true,
            max_cached_listings: DEFAULT_MAX_CACHED_LISTINGS,
            filter: EntryFilter::default(),
            local_fast_path: true,
        }
    }
}

struct Listings {
    cache: ListingCache,
    worker: Option<TraversalWorker>,
}

/// Live, deduplicated listing of one directory.
pub struct DirectoryView {
    shared: Arc<ViewShared>,
    config: ViewConfig,
    listings: Mutex<Listings>,
    watch: Mutex<Option<WatchHandle>>,
    closed: AtomicBool,
}

impl DirectoryView {
    /// Create a view of `root`, watching it through `watcher` when given.
    ///
    /// A watcher that cannot be created leaves the view serving traversal
    /// results only.
    pub fn new(
        root: Locator,
        provider: Arc<dyn FileInfoProvider>,
        watcher: Option<&dyn WatcherFactory>,
        config: ViewConfig,
        tx: mpsc::UnboundedSender<ViewUpdate>,
    ) -> Self {
        let notifier = Notifier::new(root.clone(), tx);
        let shared = Arc::new(ViewShared::new(
            root.clone(),
            provider,
            config.filter.clone(),
            notifier,
        ));

        let watch = match watcher {
            Some(factory) => match factory.watch(&root, Arc::new(WeakViewSink::new(&shared))) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("watching {root} failed, serving static listing: {e}");
                    None
                }
            },
            None => {
                info!("no watcher for {root}, serving static listing");
                None
            }
        };

        Self {
            shared,
            listings: Mutex::new(Listings {
                cache: ListingCache::new(config.max_cached_listings),
                worker: None,
            }),
            config,
            watch: Mutex::new(watch),
            closed: AtomicBool::new(false),
        }
    }

    fn listings(&self) -> MutexGuard<'_, Listings> {
        self.listings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> &Locator {
        self.shared.root()
    }

    pub fn hidden_marker(&self) -> &Locator {
        self.shared.hidden_marker()
    }

    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ── Listings ────────────────────────────────────────────────────────────

    /// Request the listing `key` ordered by `sort`.
    ///
    /// With caching enabled and any listing already held, or while a scan is
    /// still running, the current list is sent as `SourceData` and no scan
    /// starts. Otherwise the list is cleared and a new traversal starts.
    /// A running scan whose key is evicted by this open is replaced by a
    /// scan for `key`. Returns whether the result was served from the
    /// current list.
    pub fn open(&self, key: impl Into<ListingKey>, sort: SortSpec) -> Result<bool> {
        let key = key.into();
        if self.is_closed() {
            return Err(ViewError::Closed(self.root().to_string()));
        }

        let mut listings = self.listings();
        let cached = self.config.cache_listings && !listings.cache.is_empty();
        let running = !self.shared.is_traversal_finished();
        if cached || running {
            if self.config.cache_listings {
                let evicted = listings.cache.touch(key.clone(), sort);
                let current = self.shared.current_key();
                if running && current.is_some_and(|k| evicted.contains(&k)) {
                    // The scan in flight belongs to a listing nobody holds any more
                    debug!("{}: evicted running listing, rescanning for {key}", self.root());
                    self.start_traversal(&mut listings, key, sort)?;
                    return Ok(false);
                }
                for evicted in evicted {
                    debug!("{}: evicted listing {evicted}", self.root());
                }
            }
            drop(listings);
            self.shared.serve_source_data(&key);
            return Ok(true);
        }

        self.start_traversal(&mut listings, key, sort)?;
        Ok(false)
    }

    /// Rescan for `key` regardless of what is cached.
    pub fn refresh(&self, key: impl Into<ListingKey>, sort: SortSpec) -> Result<()> {
        if self.is_closed() {
            return Err(ViewError::Closed(self.root().to_string()));
        }
        let mut listings = self.listings();
        self.start_traversal(&mut listings, key.into(), sort)
    }

    fn start_traversal(&self, listings: &mut Listings, key: ListingKey, sort: SortSpec) -> Result<()> {
        // Join the old worker before the list is cleared for the new one
        if let Some(mut previous) = listings.worker.take() {
            previous.stop();
            previous.wait();
        }
        if !self.config.cache_listings {
            listings.cache.clear();
        }
        for evicted in listings.cache.touch(key.clone(), sort) {
            debug!("{}: evicted listing {evicted}", self.root());
        }

        let generation = self.shared.begin_traversal(key.clone(), sort);
        let request = TraversalRequest {
            directory: self.root().clone(),
            filter: self.config.filter.clone(),
            sort,
            local_fast_path: self.config.local_fast_path,
        };
        let mut worker = TraversalWorker::new(request, generation);
        let sink: Arc<dyn TraversalSink> = self.shared.clone();
        if let Err(e) = worker.start(self.shared.provider(), sink) {
            self.shared.abandon_traversal(generation);
            return Err(e);
        }
        debug!("{}: traversal {generation} started for {key}", self.root());
        listings.worker = Some(worker);
        Ok(())
    }

    /// Forget `key`, stopping its traversal if it is the running one.
    ///
    /// Returns the number of listings still held.
    pub fn close_listing(&self, key: &ListingKey) -> usize {
        let mut listings = self.listings();
        listings.cache.remove(key);
        if self.shared.current_key().as_ref() == Some(key) {
            if let Some(mut worker) = listings.worker.take() {
                worker.stop();
                worker.wait();
                self.shared.abandon_traversal(worker.generation());
            }
        }
        listings.cache.len()
    }

    /// Block until the running traversal, if any, has exited.
    pub fn wait_for_traversal(&self) {
        if let Some(worker) = self.listings().worker.as_mut() {
            worker.wait();
        }
    }

    pub fn cached_keys(&self) -> Vec<ListingKey> {
        self.listings().cache.keys()
    }

    pub fn current_key(&self) -> Option<ListingKey> {
        self.shared.current_key()
    }

    pub fn is_traversal_finished(&self) -> bool {
        self.shared.is_traversal_finished()
    }

    /// Ordering the list is known to have.
    pub fn origin_sort(&self) -> SortSpec {
        self.shared.origin_sort()
    }

    // ── Entries ─────────────────────────────────────────────────────────────

    pub fn contains(&self, url: &Locator) -> bool {
        self.shared.contains(url)
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in arrival order.
    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.shared.snapshot()
    }

    pub fn sorted(&self, sort: &SortSpec) -> Vec<FileRecord> {
        let mut records = self.snapshot();
        sort.sort(&mut records);
        records
    }

    /// Track `urls`, returning the record of every url the provider knows,
    /// including ones that were already tracked.
    pub fn apply_add(&self, urls: &[Locator]) -> Vec<FileRecord> {
        self.shared.apply_add(urls)
    }

    /// Re-query a tracked url. Untracked or vanished urls are ignored.
    pub fn apply_update(&self, url: &Locator) -> Option<FileRecord> {
        self.shared.apply_update(url)
    }

    /// Stop tracking `urls`, returning a record for each of them.
    pub fn apply_remove(&self, urls: &[Locator]) -> Vec<FileRecord> {
        self.shared.apply_remove(urls)
    }

    // ── Watch events ────────────────────────────────────────────────────────

    /// Queue a watch event and make sure the consumer loop runs.
    pub fn push_event(&self, event: WatchEvent) {
        self.shared.enqueue(event);
        self.shared.request_processing();
    }

    /// Queue a watch event without waking the consumer loop.
    pub fn enqueue_event(&self, event: WatchEvent) {
        self.shared.enqueue(event);
    }

    /// Wake the consumer loop. Dropped if it is already running.
    pub fn process_events(&self) {
        self.shared.request_processing();
    }

    pub fn pending_events(&self) -> usize {
        self.shared.pending_events()
    }

    /// Block until the consumer loop, if running, has drained the queue.
    pub fn wait_for_events(&self) {
        self.shared.join_consumer();
    }

    // ── Teardown ────────────────────────────────────────────────────────────

    /// Stop watching, stop the consumer loop and stop and join the traversal.
    ///
    /// No background work touches the view once this returns. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let worker = self.listings().worker.take();
        if let Some(worker) = &worker {
            worker.stop();
        }
        self.shared.cancel();
        if let Some(mut worker) = worker {
            worker.wait();
            self.shared.abandon_traversal(worker.generation());
        }
        debug!("{}: view shut down", self.root());
    }
}

impl Drop for DirectoryView {
    fn drop(&mut self) {
        self.shutdown();
    }
}
