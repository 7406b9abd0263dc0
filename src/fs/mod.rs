pub mod locator;
pub mod provider;
pub mod record;
pub mod sort;
pub mod watcher;
