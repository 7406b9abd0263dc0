//! Open directory views, one per directory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::ViewUpdate;
use crate::fs::locator::Locator;
use crate::fs::provider::FileInfoProvider;
use crate::fs::watcher::WatcherFactory;
use crate::view::{DirectoryView, ViewConfig};

/// Hands out the single live [`DirectoryView`] of each directory.
///
/// Every view reports through the registry's channel; updates carry the
/// root they belong to.
pub struct DirectoryViewRegistry {
    provider: Arc<dyn FileInfoProvider>,
    watcher_factory: Option<Arc<dyn WatcherFactory>>,
    config: ViewConfig,
    views: Mutex<HashMap<Locator, Arc<DirectoryView>>>,
    tx: mpsc::UnboundedSender<ViewUpdate>,
}

impl DirectoryViewRegistry {
    pub fn new(
        provider: Arc<dyn FileInfoProvider>,
        watcher_factory: Option<Arc<dyn WatcherFactory>>,
        config: ViewConfig,
        tx: mpsc::UnboundedSender<ViewUpdate>,
    ) -> Self {
        Self {
            provider,
            watcher_factory,
            config,
            views: Mutex::new(HashMap::new()),
            tx,
        }
    }

    fn views(&self) -> MutexGuard<'_, HashMap<Locator, Arc<DirectoryView>>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The view of `root`, created and watched on first use.
    pub fn get(&self, root: &Locator) -> Arc<DirectoryView> {
        let mut views = self.views();
        if let Some(view) = views.get(root) {
            return Arc::clone(view);
        }

        debug!("opening view of {root}");
        let view = Arc::new(DirectoryView::new(
            root.clone(),
            Arc::clone(&self.provider),
            self.watcher_factory.as_deref(),
            self.config.clone(),
            self.tx.clone(),
        ));
        views.insert(root.clone(), Arc::clone(&view));
        view
    }

    /// Shut down and forget the view of `root`. Returns whether it existed.
    pub fn close(&self, root: &Locator) -> bool {
        let view = self.views().remove(root);
        match view {
            Some(view) => {
                view.shutdown();
                debug!("closed view of {root}");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, root: &Locator) -> bool {
        self.views().contains_key(root)
    }

    pub fn len(&self) -> usize {
        self.views().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close_all(&self) {
        let views: Vec<_> = self.views().drain().map(|(_, view)| view).collect();
        for view in views {
            view.shutdown();
        }
    }
}

impl Drop for DirectoryViewRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ViewEvent;
    use crate::fs::provider::LocalFileProvider;
    use crate::fs::sort::SortSpec;
    use crate::fs::watcher::NotifyWatcherFactory;
    use tempfile::TempDir;

    fn registry(
        watch: bool,
    ) -> (DirectoryViewRegistry, mpsc::UnboundedReceiver<ViewUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory: Option<Arc<dyn WatcherFactory>> = if watch {
            Some(Arc::new(NotifyWatcherFactory::default()))
        } else {
            None
        };
        let registry = DirectoryViewRegistry::new(
            Arc::new(LocalFileProvider::new()),
            factory,
            ViewConfig::default(),
            tx,
        );
        (registry, rx)
    }

    #[test]
    fn get_returns_the_same_view() {
        let dir = TempDir::new().unwrap();
        let (registry, _rx) = registry(false);
        let root = Locator::local(dir.path());

        let first = registry.get(&root);
        let second = registry.get(&root);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn close_shuts_the_view_down() {
        let dir = TempDir::new().unwrap();
        let (registry, _rx) = registry(false);
        let root = Locator::local(dir.path());
        let view = registry.get(&root);

        assert!(registry.close(&root));
        assert!(!registry.close(&root));
        assert!(view.is_closed());
        assert!(!registry.contains(&root));

        let reopened = registry.get(&root);
        assert!(!reopened.is_closed());
    }

    #[test]
    fn updates_carry_their_root() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        std::fs::write(a.path().join("one"), "1").unwrap();
        std::fs::write(b.path().join("two"), "2").unwrap();
        let (registry, mut rx) = registry(false);
        let root_a = Locator::local(a.path());
        let root_b = Locator::local(b.path());

        for root in [&root_a, &root_b] {
            let view = registry.get(root);
            view.open("k", SortSpec::default()).unwrap();
            view.wait_for_traversal();
        }

        let mut completed = Vec::new();
        while let Ok(update) = rx.try_recv() {
            if matches!(update.event, ViewEvent::TraversalComplete { .. }) {
                completed.push(update.root);
            }
        }
        assert_eq!(completed, [root_a, root_b]);
    }

    #[test]
    fn close_all_empties_the_registry() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let (registry, _rx) = registry(true);
        let views = [
            registry.get(&Locator::local(a.path())),
            registry.get(&Locator::local(b.path())),
        ];
        assert!(views.iter().all(|v| v.is_watching()));

        registry.close_all();
        assert!(registry.is_empty());
        assert!(views.iter().all(|v| v.is_closed()));
    }
}
