use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{Result, ViewError};
use crate::fs::locator::Locator;
use crate::fs::provider::{EntryFilter, FileInfoProvider};
use crate::fs::record::FileRecord;
use crate::fs::sort::SortSpec;

/// What a traversal should enumerate and how the result should be ordered.
#[derive(Debug, Clone)]
pub struct TraversalRequest {
    pub directory: Locator,
    pub filter: EntryFilter,
    pub sort: SortSpec,
    /// Try the provider's bulk read before enumerating entry by entry.
    pub local_fast_path: bool,
}

impl TraversalRequest {
    pub fn new(directory: Locator, sort: SortSpec) -> Self {
        Self {
            directory,
            filter: EntryFilter::default(),
            sort,
            local_fast_path: true,
        }
    }
}

/// Receiver of traversal output, called on the traversal thread.
///
/// `generation` identifies the worker so a receiver can ignore output from
/// a worker it has already replaced.
pub trait TraversalSink: Send + Sync {
    /// One entry, delivered as soon as it is discovered.
    fn record(&self, generation: u64, record: FileRecord);
    /// The whole directory at once, already sorted by `sort`.
    fn local_batch(&self, generation: u64, records: Vec<FileRecord>, sort: SortSpec);
    /// Called exactly once after the last delivery of a scan that was not
    /// stopped.
    fn finished(&self, generation: u64);
}

/// A cancellable background scan of one directory.
pub struct TraversalWorker {
    request: TraversalRequest,
    generation: u64,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TraversalWorker {
    pub fn new(request: TraversalRequest, generation: u64) -> Self {
        Self {
            request,
            generation,
            cancel: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn request(&self) -> &TraversalRequest {
        &self.request
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start scanning on a background thread. Starting twice is a no-op.
    pub fn start(
        &mut self,
        provider: Arc<dyn FileInfoProvider>,
        sink: Arc<dyn TraversalSink>,
    ) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let request = self.request.clone();
        let generation = self.generation;
        let cancel = Arc::clone(&self.cancel);
        let handle = thread::Builder::new()
            .name("dirview-traversal".into())
            .spawn(move || scan(&request, generation, provider.as_ref(), sink.as_ref(), &cancel))
            .map_err(|e| {
                warn!("failed to spawn traversal thread: {e}");
                ViewError::Spawn("traversal".into())
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Ask the scan to stop at its next check. Safe to call at any time.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Whether the scan thread has exited (or never started).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the scan thread exits.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("traversal of {} panicked", self.request.directory);
            }
        }
    }
}

impl Drop for TraversalWorker {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

fn scan(
    request: &TraversalRequest,
    generation: u64,
    provider: &dyn FileInfoProvider,
    sink: &dyn TraversalSink,
    cancel: &AtomicBool,
) {
    let cancelled = || cancel.load(Ordering::Acquire);
    let dir = &request.directory;
    debug!("traversal {generation} of {dir} started");

    if cancelled() {
        debug!("traversal {generation} of {dir} cancelled before start");
        return;
    }

    if request.local_fast_path && dir.is_local() {
        if let Some(records) = provider.bulk_local(dir, &request.filter, &request.sort, cancel) {
            if cancelled() {
                debug!("traversal {generation} of {dir} cancelled");
                return;
            }
            debug!(
                "traversal {generation} of {dir} read {} entries in bulk",
                records.len()
            );
            sink.local_batch(generation, records, request.sort);
            sink.finished(generation);
            return;
        }
    }

    let children = match provider.children(dir) {
        Ok(children) => children,
        Err(e) => {
            // An unreadable directory lists as empty
            debug!("traversal {generation} of {dir} could not open directory: {e}");
            if !cancelled() {
                sink.finished(generation);
            }
            return;
        }
    };

    let mut delivered = 0usize;
    for url in children {
        if cancelled() {
            debug!("traversal {generation} of {dir} cancelled after {delivered} entries");
            return;
        }
        let Some(info) = provider.create(&url) else {
            continue;
        };
        let record = FileRecord::from_info(info);
        if !request.filter.accepts(&record) {
            continue;
        }
        if cancelled() {
            debug!("traversal {generation} of {dir} cancelled after {delivered} entries");
            return;
        }
        sink.record(generation, record);
        delivered += 1;
    }

    if cancelled() {
        return;
    }
    debug!("traversal {generation} of {dir} finished with {delivered} entries");
    sink.finished(generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::provider::LocalFileProvider;
    use crate::fs::record::FileInfo;
    use crate::fs::sort::{SortOrder, SortRole};
    use std::fs::{self, File};
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CollectingSink {
        records: Mutex<Vec<FileRecord>>,
        batches: Mutex<Vec<(Vec<FileRecord>, SortSpec)>>,
        finished: Mutex<Vec<u64>>,
    }

    impl TraversalSink for CollectingSink {
        fn record(&self, _generation: u64, record: FileRecord) {
            self.records.lock().unwrap().push(record);
        }
        fn local_batch(&self, _generation: u64, records: Vec<FileRecord>, sort: SortSpec) {
            self.batches.lock().unwrap().push((records, sort));
        }
        fn finished(&self, generation: u64) {
            self.finished.lock().unwrap().push(generation);
        }
    }

    /// Provider whose `children` blocks until the test releases it.
    struct GatedProvider {
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl FileInfoProvider for GatedProvider {
        fn create(&self, url: &Locator) -> Option<FileInfo> {
            Some(FileInfo {
                url: url.clone(),
                is_dir: false,
                is_symlink: false,
                is_hidden: false,
                is_readable: true,
                is_writable: true,
                is_executable: false,
                size: 0,
                last_read: None,
                last_modified: None,
            })
        }

        fn children(&self, dir: &Locator) -> Result<Vec<Locator>> {
            if let Some(tx) = self.entered.lock().unwrap().take() {
                let _ = tx.send(());
            }
            let _ = self.release.lock().unwrap().recv_timeout(Duration::from_secs(5));
            Ok((0..10).map(|i| dir.join(format!("f{i}"))).collect())
        }
    }

    fn setup_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        File::create(dir.path().join("b.txt")).unwrap();
        File::create(dir.path().join("a.txt")).unwrap();
        dir
    }

    fn run_to_end(request: TraversalRequest) -> Arc<CollectingSink> {
        let sink = Arc::new(CollectingSink::default());
        let mut worker = TraversalWorker::new(request, 7);
        worker
            .start(Arc::new(LocalFileProvider::new()), sink.clone())
            .unwrap();
        worker.wait();
        sink
    }

    #[test]
    fn incremental_scan_reports_every_entry() {
        let dir = setup_test_dir();
        let mut request = TraversalRequest::new(Locator::local(dir.path()), SortSpec::default());
        request.local_fast_path = false;

        let sink = run_to_end(request);
        assert_eq!(sink.records.lock().unwrap().len(), 3);
        assert!(sink.batches.lock().unwrap().is_empty());
        assert_eq!(*sink.finished.lock().unwrap(), [7]);
    }

    #[test]
    fn local_fast_path_delivers_sorted_batch() {
        let dir = setup_test_dir();
        let sort = SortSpec::new(SortRole::Name, SortOrder::Ascending, false);
        let sink = run_to_end(TraversalRequest::new(Locator::local(dir.path()), sort));

        assert!(sink.records.lock().unwrap().is_empty());
        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let names: Vec<&str> = batches[0].0.iter().map(|r| r.name()).collect();
        assert_eq!(names, ["sub", "a.txt", "b.txt"]);
        assert_eq!(batches[0].1, sort);
        assert_eq!(*sink.finished.lock().unwrap(), [7]);
    }

    #[test]
    fn name_filters_apply_to_incremental_scan() {
        let dir = setup_test_dir();
        let mut request = TraversalRequest::new(Locator::local(dir.path()), SortSpec::default());
        request.local_fast_path = false;
        request.filter.name_filters = vec![glob::Pattern::new("a.*").unwrap()];

        let sink = run_to_end(request);
        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "a.txt");
    }

    #[test]
    fn missing_directory_finishes_empty() {
        let sink = run_to_end(TraversalRequest::new(
            Locator::local("/definitely/not/here"),
            SortSpec::default(),
        ));
        assert!(sink.records.lock().unwrap().is_empty());
        assert!(sink.batches.lock().unwrap().is_empty());
        assert_eq!(*sink.finished.lock().unwrap(), [7]);
    }

    #[test]
    fn stop_before_first_record_delivers_nothing() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let provider = Arc::new(GatedProvider {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        let sink = Arc::new(CollectingSink::default());
        let mut request = TraversalRequest::new(Locator::new("mem", "/d"), SortSpec::default());
        request.local_fast_path = false;

        let mut worker = TraversalWorker::new(request, 1);
        worker.start(provider, sink.clone()).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        worker.stop();
        release_tx.send(()).unwrap();
        worker.wait();

        assert!(sink.records.lock().unwrap().is_empty());
        assert!(sink.finished.lock().unwrap().is_empty());
        assert!(worker.is_finished());
    }

    #[test]
    fn stop_and_wait_are_idempotent() {
        let dir = setup_test_dir();
        let mut worker = TraversalWorker::new(
            TraversalRequest::new(Locator::local(dir.path()), SortSpec::default()),
            1,
        );
        worker.stop();
        worker.wait();
        worker
            .start(
                Arc::new(LocalFileProvider::new()),
                Arc::new(CollectingSink::default()),
            )
            .unwrap();
        worker.wait();
        worker.stop();
        worker.wait();
        assert!(worker.is_stopped());
    }
}
