use std::path::PathBuf;
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};

use crate::error::Result;
use crate::fs::locator::Locator;
use crate::queue::WatchEvent;

/// Receiver of raw change notifications for one watched directory.
///
/// Callbacks arrive on whatever thread the watch backend uses.
pub trait WatchEventSink: Send + Sync {
    fn deleted(&self, url: Locator);
    fn created(&self, url: Locator);
    fn attribute_changed(&self, url: Locator);
    fn renamed(&self, from: Locator, to: Locator);
}

/// Keeps a watch alive; dropping it stops the watch.
pub struct WatchHandle {
    _guard: Box<dyn Send>,
}

impl WatchHandle {
    pub fn new(guard: impl Send + 'static) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

/// Creates watches on directories.
pub trait WatcherFactory: Send + Sync {
    fn watch(&self, dir: &Locator, sink: Arc<dyn WatchEventSink>) -> Result<WatchHandle>;
}

/// Forward one mapped event to the sink's matching callback.
pub fn dispatch(sink: &dyn WatchEventSink, event: WatchEvent) {
    match event {
        WatchEvent::Added(url) => sink.created(url),
        WatchEvent::Removed(url) => sink.deleted(url),
        WatchEvent::Updated(url) => sink.attribute_changed(url),
        WatchEvent::Renamed { from, to } => sink.renamed(from, to),
    }
}

/// Watcher factory backed by the platform's native notification API.
///
/// Watches are non-recursive: every reported path is the directory itself
/// or one of its direct children, so each one is forwarded to keep the live
/// list in step with what a traversal lists.
#[derive(Debug, Default)]
pub struct NotifyWatcherFactory;

impl NotifyWatcherFactory {
    pub fn new() -> Self {
        Self
    }
}

impl WatcherFactory for NotifyWatcherFactory {
    fn watch(&self, dir: &Locator, sink: Arc<dyn WatchEventSink>) -> Result<WatchHandle> {
        let scheme = dir.scheme().to_string();

        let mut watcher = notify::recommended_watcher(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    for change in map_event(&scheme, event.kind, &event.paths) {
                        dispatch(sink.as_ref(), change);
                    }
                }
                Err(e) => {
                    // Watcher errors are non-fatal
                    tracing::debug!("watch backend error: {e}");
                }
            },
        )?;

        watcher.watch(dir.path(), RecursiveMode::NonRecursive)?;
        Ok(WatchHandle::new(watcher))
    }
}

/// Translate a backend event into the changes a view understands.
pub fn map_event(scheme: &str, kind: EventKind, paths: &[PathBuf]) -> Vec<WatchEvent> {
    let locate = |p: &PathBuf| Locator::new(scheme, p);

    match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            vec![WatchEvent::Renamed {
                from: locate(&paths[0]),
                to: locate(&paths[1]),
            }]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => paths
            .iter()
            .map(|p| WatchEvent::Removed(locate(p)))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) | EventKind::Create(_) => paths
            .iter()
            .map(|p| WatchEvent::Added(locate(p)))
            .collect(),
        // Backends that cannot tell the two halves of a rename apart
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|p| {
                if p.symlink_metadata().is_ok() {
                    WatchEvent::Added(locate(p))
                } else {
                    WatchEvent::Removed(locate(p))
                }
            })
            .collect(),
        EventKind::Modify(_) | EventKind::Any => paths
            .iter()
            .map(|p| WatchEvent::Updated(locate(p)))
            .collect(),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}
