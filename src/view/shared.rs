//! State shared between a directory view, its traversal worker, its watch
//! backend and its watch-event consumer thread.
//!
//! Lock order: `state` may be taken before `children`; the watch queue's
//! internal lock is never held together with either of them.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::event::{ListingKey, Notifier, ViewEvent};
use crate::fs::locator::Locator;
use crate::fs::provider::{EntryFilter, FileInfoProvider};
use crate::fs::record::FileRecord;
use crate::fs::sort::{SortRole, SortSpec};
use crate::fs::watcher::WatchEventSink;
use crate::queue::{WatchEvent, WatchEventKind, WatchEventQueue};
use crate::traversal::TraversalSink;
use crate::view::children::ChildList;

#[derive(Debug)]
struct TraversalState {
    /// Generation of the worker whose output is accepted.
    generation: u64,
    key: Option<ListingKey>,
    finished: bool,
    /// Ordering the list currently has, as far as is known.
    origin_sort: SortSpec,
}

pub(crate) struct ViewShared {
    root: Locator,
    hidden_marker: Locator,
    provider: Arc<dyn FileInfoProvider>,
    /// Applied to watch-event additions as the traversal applies it to scans.
    filter: EntryFilter,
    notifier: Notifier,
    children: RwLock<ChildList>,
    events: WatchEventQueue,
    state: Mutex<TraversalState>,
    /// Re-entrancy guard of the consumer loop.
    processing: AtomicBool,
    cancelled: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl ViewShared {
    pub(crate) fn new(
        root: Locator,
        provider: Arc<dyn FileInfoProvider>,
        filter: EntryFilter,
        notifier: Notifier,
    ) -> Self {
        let hidden_marker = provider.hidden_marker(&root);
        Self {
            root,
            hidden_marker,
            provider,
            filter,
            notifier,
            children: RwLock::new(ChildList::new()),
            events: WatchEventQueue::new(),
            state: Mutex::new(TraversalState {
                generation: 0,
                key: None,
                finished: true,
                origin_sort: SortSpec::default(),
            }),
            processing: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            consumer: Mutex::new(None),
        }
    }

    pub(crate) fn root(&self) -> &Locator {
        &self.root
    }

    pub(crate) fn hidden_marker(&self) -> &Locator {
        &self.hidden_marker
    }

    pub(crate) fn provider(&self) -> Arc<dyn FileInfoProvider> {
        Arc::clone(&self.provider)
    }

    fn state(&self) -> MutexGuard<'_, TraversalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn children_read(&self) -> RwLockReadGuard<'_, ChildList> {
        self.children.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn children_write(&self) -> RwLockWriteGuard<'_, ChildList> {
        self.children.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub(crate) fn contains(&self, url: &Locator) -> bool {
        self.children_read().contains(url)
    }

    pub(crate) fn len(&self) -> usize {
        self.children_read().len()
    }

    pub(crate) fn snapshot(&self) -> Vec<FileRecord> {
        self.children_read().records().to_vec()
    }

    pub(crate) fn is_traversal_finished(&self) -> bool {
        self.state().finished
    }

    pub(crate) fn current_key(&self) -> Option<ListingKey> {
        self.state().key.clone()
    }

    pub(crate) fn origin_sort(&self) -> SortSpec {
        self.state().origin_sort
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    // ── Traversal bookkeeping ───────────────────────────────────────────────

    /// Clear the list and accept output only from the returned generation.
    ///
    /// The previous worker must already be joined.
    pub(crate) fn begin_traversal(&self, key: ListingKey, sort: SortSpec) -> u64 {
        let generation = {
            let mut state = self.state();
            state.generation += 1;
            state.key = Some(key);
            state.finished = false;
            state.origin_sort =
                SortSpec::new(SortRole::Default, sort.order, sort.mix_dirs_and_files);
            state.generation
        };
        self.children_write().clear();
        generation
    }

    /// Mark a stopped traversal as done without announcing completion.
    pub(crate) fn abandon_traversal(&self, generation: u64) {
        let mut state = self.state();
        if state.generation == generation {
            state.finished = true;
        }
    }

    /// Send the current list to the caller of `key`.
    pub(crate) fn serve_source_data(&self, key: &ListingKey) {
        let (sort, finished) = {
            let state = self.state();
            (state.origin_sort, state.finished)
        };
        let records = self.snapshot();
        debug!("{} served {} cached entries for {key}", self.root, records.len());
        self.notifier.send(ViewEvent::SourceData {
            key: key.clone(),
            records,
            sort,
            finished,
        });
    }

    /// Key of the traversal `generation`, if its output is still wanted.
    fn accepting(&self, generation: u64) -> Option<ListingKey> {
        if self.is_cancelled() {
            return None;
        }
        let state = self.state();
        if state.generation != generation {
            return None;
        }
        state.key.clone()
    }

    // ── Mutations ───────────────────────────────────────────────────────────

    /// Append `record` unless its url is tracked; returns the tracked record
    /// and whether it was appended.
    fn insert_child(&self, record: FileRecord) -> (FileRecord, bool) {
        let mut children = self.children_write();
        if let Some(existing) = children.get(&record.url) {
            return (existing.clone(), false);
        }
        children.insert(record.clone());
        (record, true)
    }

    pub(crate) fn apply_add(&self, urls: &[Locator]) -> Vec<FileRecord> {
        let mut records = Vec::with_capacity(urls.len());
        let mut added = Vec::new();

        for url in urls {
            if let Some(existing) = self.children_read().get(url) {
                records.push(existing.clone());
                continue;
            }
            let Some(info) = self.provider.create(url) else {
                continue;
            };
            if self.is_cancelled() {
                break;
            }
            let record = FileRecord::from_info(info);
            if !self.filter.accepts(&record) {
                continue;
            }
            let (record, inserted) = self.insert_child(record);
            if inserted {
                added.push(record.clone());
            }
            records.push(record);
        }

        if !added.is_empty() {
            // Appended entries break whatever order the list had
            self.state().origin_sort.role = SortRole::Default;
            self.notifier.send(ViewEvent::EntriesAdded(added));
        }
        records
    }

    pub(crate) fn apply_update(&self, url: &Locator) -> Option<FileRecord> {
        if !self.contains(url) {
            return None;
        }
        let record = FileRecord::from_info(self.provider.create(url)?);
        if !self.children_write().replace(record.clone()) {
            return None;
        }

        self.notifier.send(ViewEvent::EntryUpdated(record.clone()));
        if *url == self.hidden_marker {
            self.notifier.send(ViewEvent::HiddenMarkerChanged(url.clone()));
        }
        Some(record)
    }

    pub(crate) fn apply_remove(&self, urls: &[Locator]) -> Vec<FileRecord> {
        let mut removed = Vec::with_capacity(urls.len());
        for url in urls {
            let tracked = self.children_write().remove(url);
            let record = match tracked {
                Some(record) => record,
                // Still report it so the caller can clear any row it shows
                None => self
                    .provider
                    .create(url)
                    .map(FileRecord::from_info)
                    .unwrap_or_else(|| FileRecord::placeholder(url.clone())),
            };
            removed.push(record);
        }

        if !removed.is_empty() {
            self.notifier.send(ViewEvent::EntriesRemoved(removed.clone()));
        }
        removed
    }

    // ── Watch events ────────────────────────────────────────────────────────

    pub(crate) fn enqueue(&self, event: WatchEvent) {
        if !self.is_cancelled() {
            self.events.push(event);
        }
    }

    pub(crate) fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Start the consumer loop unless it is already running.
    ///
    /// A request that finds the loop running is dropped: the running loop
    /// drains the queue before it exits.
    pub(crate) fn request_processing(self: &Arc<Self>) {
        if self.is_cancelled() || self.processing.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = consumer.take() {
            // Released the guard already, so it is on its way out
            let _ = previous.join();
        }

        let shared = Arc::clone(self);
        match thread::Builder::new()
            .name("dirview-events".into())
            .spawn(move || shared.drain_events())
        {
            Ok(handle) => *consumer = Some(handle),
            Err(e) => {
                warn!("{}: failed to spawn event consumer: {e}", self.root);
                self.processing.store(false, Ordering::Release);
            }
        }
    }

    fn drain_events(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }

            let mut applied = 0usize;
            while let Some(event) = self.events.pop() {
                if self.is_cancelled() {
                    return;
                }
                applied += 1;
                if self.handle_event(event).is_break() {
                    self.events.clear();
                    break;
                }
            }

            if self.is_cancelled() {
                return;
            }
            debug!("{}: applied {applied} watch events", self.root);
            self.notifier.send(ViewEvent::ChildrenUpdated);

            self.processing.store(false, Ordering::Release);
            // An event may have landed between the last pop and the release
            if self.events.is_empty() || self.processing.swap(true, Ordering::AcqRel) {
                return;
            }
        }
    }

    /// Apply one event. Breaks when the view's own directory went away.
    fn handle_event(&self, event: WatchEvent) -> ControlFlow<()> {
        match event {
            // The open directory exists by definition
            WatchEvent::Added(url) if url == self.root => {}
            WatchEvent::Removed(url) if url == self.root => {
                info!("{} was removed, requesting close", self.root);
                self.notifier.send(ViewEvent::CloseRequested(url));
                return ControlFlow::Break(());
            }
            WatchEvent::Added(url) => {
                self.apply_add(&[url]);
            }
            WatchEvent::Updated(url) => {
                self.apply_update(&url);
            }
            WatchEvent::Removed(url) => {
                self.apply_remove(std::slice::from_ref(&url));
                self.notifier.send(ViewEvent::CloseRequested(url));
            }
            WatchEvent::Renamed { from, to } => return self.reconcile_rename(from, to),
        }
        ControlFlow::Continue(())
    }

    fn reconcile_rename(&self, from: Locator, to: Locator) -> ControlFlow<()> {
        if self.handle_event(WatchEvent::Removed(from)).is_break() {
            return ControlFlow::Break(());
        }

        self.provider.refresh(&to);
        if to.scheme() != self.root.scheme() {
            return ControlFlow::Continue(());
        }

        if to != self.root && !self.contains(&to) {
            // A created event for `to` may have been queued ahead of the rename
            if self.events.cancel_pending(&to, WatchEventKind::Added) {
                debug!("{}: dropped queued add of {to} superseded by rename", self.root);
            }
            self.apply_add(std::slice::from_ref(&to));
        }
        // A queued remove of `to` must not delete the entry just renamed in
        if self.events.cancel_pending(&to, WatchEventKind::Removed) {
            debug!("{}: dropped queued remove of renamed-in {to}", self.root);
        }

        if to == self.hidden_marker {
            self.notifier.send(ViewEvent::HiddenMarkerChanged(to));
        }
        ControlFlow::Continue(())
    }

    // ── Teardown ────────────────────────────────────────────────────────────

    /// Stop the consumer loop at its next check and wait for it.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.join_consumer();
        self.events.clear();
    }

    /// Wait for the current consumer loop, if any, to exit.
    pub(crate) fn join_consumer(&self) {
        let handle = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("{}: event consumer panicked", self.root);
            }
        }
    }
}

impl TraversalSink for ViewShared {
    fn record(&self, generation: u64, record: FileRecord) {
        let Some(key) = self.accepting(generation) else {
            return;
        };
        let (record, inserted) = self.insert_child(record);
        if inserted {
            self.notifier.send(ViewEvent::TraversalRecord { key, record });
        }
    }

    fn local_batch(&self, generation: u64, records: Vec<FileRecord>, sort: SortSpec) {
        let Some(key) = self.accepting(generation) else {
            return;
        };
        self.state().origin_sort = sort;

        let mut accepted = Vec::with_capacity(records.len());
        {
            let mut children = self.children_write();
            for record in records {
                if children.insert(record.clone()) {
                    accepted.push(record);
                }
            }
        }
        self.notifier.send(ViewEvent::TraversalBatch {
            key,
            records: accepted,
            sort,
        });
    }

    fn finished(&self, generation: u64) {
        if self.is_cancelled() {
            return;
        }
        let key = {
            let mut state = self.state();
            if state.generation != generation || state.finished {
                return;
            }
            state.finished = true;
            state.key.clone()
        };
        if let Some(key) = key {
            debug!("{}: traversal for {key} complete", self.root);
            self.notifier.send(ViewEvent::TraversalComplete { key });
        }
    }
}

/// Watch callback target that does not keep the view alive.
pub(crate) struct WeakViewSink(Weak<ViewShared>);

impl WeakViewSink {
    pub(crate) fn new(shared: &Arc<ViewShared>) -> Self {
        Self(Arc::downgrade(shared))
    }

    fn push(&self, event: WatchEvent) {
        if let Some(shared) = self.0.upgrade() {
            shared.enqueue(event);
            shared.request_processing();
        }
    }
}

impl WatchEventSink for WeakViewSink {
    fn deleted(&self, url: Locator) {
        self.push(WatchEvent::Removed(url));
    }

    fn created(&self, url: Locator) {
        self.push(WatchEvent::Added(url));
    }

    fn attribute_changed(&self, url: Locator) {
        self.push(WatchEvent::Updated(url));
    }

    fn renamed(&self, from: Locator, to: Locator) {
        self.push(WatchEvent::Renamed { from, to });
    }
}
