//! Configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--config`, `--sort`, `--no-cache`, etc.)
//! 2. `$DIRVIEW_CONFIG` environment variable (path to config file)
//! 3. Project-local `.dirview.toml` in the current working directory
//! 4. Global `~/.config/dirview/config.toml`
//! 5. Built-in defaults

use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::fs::provider::EntryFilter;
use crate::fs::sort::{SortOrder, SortRole, SortSpec};
use crate::view::{ViewConfig, DEFAULT_MAX_CACHED_LISTINGS};

// ── Section configs ──────────────────────────────────────────────────────────

/// Listing and traversal settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ListingConfig {
    /// Serve repeated opens of a directory from the current list.
    pub cache_listings: Option<bool>,
    /// How many listing keys are remembered per directory.
    pub max_cached_listings: Option<usize>,
    /// Sort role: "default", "name", "size", "last-read", "modified".
    pub sort_by: Option<String>,
    pub descending: Option<bool>,
    /// List directories among files instead of before them.
    pub mix_dirs_and_files: Option<bool>,
    pub show_hidden: Option<bool>,
    /// Glob patterns an entry name must match to be listed.
    pub name_filters: Option<Vec<String>>,
    /// Read local directories in one bulk call.
    pub local_fast_path: Option<bool>,
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WatcherConfig {
    /// Enable live updates from the filesystem watcher.
    pub enabled: Option<bool>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub listing: ListingConfig,
    pub watcher: WatcherConfig,
}

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path, which is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("DIRVIEW_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".dirview.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("dirview").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning logged).
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => {
            debug!("loaded config from {}", path.display());
            Some(cfg)
        }
        Err(e) => {
            warn!("failed to parse config file {}: {e}", path.display());
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            listing: ListingConfig {
                cache_listings: other.listing.cache_listings.or(self.listing.cache_listings),
                max_cached_listings: other
                    .listing
                    .max_cached_listings
                    .or(self.listing.max_cached_listings),
                sort_by: other.listing.sort_by.clone().or(self.listing.sort_by),
                descending: other.listing.descending.or(self.listing.descending),
                mix_dirs_and_files: other
                    .listing
                    .mix_dirs_and_files
                    .or(self.listing.mix_dirs_and_files),
                show_hidden: other.listing.show_hidden.or(self.listing.show_hidden),
                name_filters: other
                    .listing
                    .name_filters
                    .clone()
                    .or(self.listing.name_filters),
                local_fast_path: other
                    .listing
                    .local_fast_path
                    .or(self.listing.local_fast_path),
            },
            watcher: WatcherConfig {
                enabled: other.watcher.enabled.or(self.watcher.enabled),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Lowest priority first so that the environment variable wins
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            match load_file(cli_path) {
                Some(file_cfg) => config = config.merge(&file_cfg),
                None => warn!("config file {} not loaded", cli_path.display()),
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    pub fn cache_listings(&self) -> bool {
        self.listing.cache_listings.unwrap_or(true)
    }

    pub fn max_cached_listings(&self) -> usize {
        self.listing
            .max_cached_listings
            .unwrap_or(DEFAULT_MAX_CACHED_LISTINGS)
            .max(1)
    }

    /// Sort role name as configured.
    pub fn sort_by(&self) -> &str {
        self.listing.sort_by.as_deref().unwrap_or("default")
    }

    pub fn descending(&self) -> bool {
        self.listing.descending.unwrap_or(false)
    }

    pub fn mix_dirs_and_files(&self) -> bool {
        self.listing.mix_dirs_and_files.unwrap_or(false)
    }

    pub fn show_hidden(&self) -> bool {
        self.listing.show_hidden.unwrap_or(true)
    }

    pub fn local_fast_path(&self) -> bool {
        self.listing.local_fast_path.unwrap_or(true)
    }

    pub fn watcher_enabled(&self) -> bool {
        self.watcher.enabled.unwrap_or(true)
    }

    pub fn name_filters(&self) -> &[String] {
        self.listing.name_filters.as_deref().unwrap_or_default()
    }

    /// Compiled name filters. Invalid patterns are logged and skipped.
    pub fn entry_filter(&self) -> EntryFilter {
        let name_filters = self
            .name_filters()
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("ignoring invalid name filter {p:?}: {e}");
                    None
                }
            })
            .collect();
        EntryFilter {
            include_hidden: self.show_hidden(),
            name_filters,
        }
    }

    pub fn sort_spec(&self) -> SortSpec {
        let order = if self.descending() {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        SortSpec::new(SortRole::from_str(self.sort_by()), order, self.mix_dirs_and_files())
    }

    /// Runtime settings for the directory views this config opens.
    pub fn view_config(&self) -> ViewConfig {
        ViewConfig {
            cache_listings: self.cache_listings(),
            max_cached_listings: self.max_cached_listings(),
            filter: self.entry_filter(),
            local_fast_path: self.local_fast_path(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = AppConfig::default();
        assert!(cfg.cache_listings());
        assert_eq!(cfg.max_cached_listings(), 2);
        assert_eq!(cfg.sort_by(), "default");
        assert!(!cfg.descending());
        assert!(!cfg.mix_dirs_and_files());
        assert!(cfg.show_hidden());
        assert!(cfg.local_fast_path());
        assert!(cfg.watcher_enabled());
        assert!(cfg.name_filters().is_empty());
        assert_eq!(cfg.sort_spec(), SortSpec::default());
    }

    #[test]
    fn test_toml_parsing_full() {
        let toml = r#"
[listing]
cache_listings = false
max_cached_listings = 4
sort_by = "size"
descending = true
mix_dirs_and_files = true
show_hidden = false
local_fast_path = false
name_filters = ["*.rs", "[ab].txt"]

[watcher]
enabled = false
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert!(!cfg.cache_listings());
        assert_eq!(cfg.max_cached_listings(), 4);
        assert_eq!(cfg.sort_by(), "size");
        assert!(!cfg.show_hidden());
        assert!(!cfg.local_fast_path());
        assert!(!cfg.watcher_enabled());
        assert_eq!(cfg.name_filters(), ["*.rs", "[ab].txt"]);
        assert_eq!(cfg.entry_filter().name_filters.len(), 2);
        assert_eq!(
            cfg.sort_spec(),
            SortSpec::new(SortRole::Size, SortOrder::Descending, true)
        );
    }

    #[test]
    fn test_toml_parsing_partial() {
        let toml = r#"
[listing]
sort_by = "modified"
"#;
        let cfg: AppConfig = toml::from_str(toml).expect("parse failed");
        assert_eq!(cfg.sort_spec().role, SortRole::LastModified);
        // Everything else should be defaults
        assert!(cfg.cache_listings());
        assert!(cfg.watcher_enabled());
    }

    #[test]
    fn test_toml_parsing_empty() {
        let cfg: AppConfig = toml::from_str("").expect("parse failed");
        assert!(cfg.show_hidden());
        assert_eq!(cfg.max_cached_listings(), 2);
    }

    #[test]
    fn test_zero_cache_size_is_raised_to_one() {
        let cfg: AppConfig =
            toml::from_str("[listing]\nmax_cached_listings = 0").expect("parse failed");
        assert_eq!(cfg.max_cached_listings(), 1);
    }

    #[test]
    fn test_merge_overrides() {
        let base = AppConfig {
            listing: ListingConfig {
                cache_listings: Some(false),
                sort_by: Some("name".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let over = AppConfig {
            listing: ListingConfig {
                sort_by: Some("size".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = base.merge(&over);
        assert_eq!(merged.sort_by(), "size"); // overridden
        assert!(!merged.cache_listings()); // from base
    }

    #[test]
    fn test_merge_none_does_not_clear_some() {
        let base = AppConfig {
            listing: ListingConfig {
                name_filters: Some(vec!["*.md".into()]),
                ..Default::default()
            },
            watcher: WatcherConfig {
                enabled: Some(false),
            },
        };

        let merged = base.merge(&AppConfig::default());
        assert!(!merged.watcher_enabled());
        assert_eq!(merged.name_filters(), ["*.md"]);
    }

    #[test]
    fn test_view_config_follows_settings() {
        let cfg = AppConfig {
            listing: ListingConfig {
                cache_listings: Some(false),
                max_cached_listings: Some(5),
                show_hidden: Some(false),
                local_fast_path: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };
        let view = cfg.view_config();
        assert!(!view.cache_listings);
        assert_eq!(view.max_cached_listings, 5);
        assert!(!view.filter.include_hidden);
        assert!(!view.local_fast_path);
    }

    #[test]
    fn test_invalid_name_filter_is_skipped() {
        let cfg = AppConfig {
            listing: ListingConfig {
                name_filters: Some(vec!["[oops".into(), "*.txt".into()]),
                ..Default::default()
            },
            ..Default::default()
        };
        let filter = cfg.entry_filter();
        assert_eq!(filter.name_filters, vec![Pattern::new("*.txt").unwrap()]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("test-config.toml");
        let mut f = std::fs::File::create(&cfg_path).expect("create");
        writeln!(
            f,
            r#"
[listing]
sort_by = "last-read"
mix_dirs_and_files = true
"#
        )
        .expect("write");

        let cfg = load_file(&cfg_path).expect("load");
        assert_eq!(cfg.sort_spec().role, SortRole::LastRead);
        assert!(cfg.mix_dirs_and_files());
        // Unset fields fall through to defaults
        assert!(cfg.cache_listings());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_file(Path::new("/nonexistent/config.toml")).is_none());
    }

    #[test]
    fn test_load_invalid_toml_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("bad.toml");
        std::fs::write(&cfg_path, "this is { not valid toml").expect("write");
        assert!(load_file(&cfg_path).is_none());
    }

    #[test]
    fn test_load_with_cli_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg_path = dir.path().join("config.toml");
        std::fs::write(
            &cfg_path,
            r#"
[listing]
sort_by = "name"
show_hidden = false
"#,
        )
        .expect("write");

        let cli_overrides = AppConfig {
            listing: ListingConfig {
                sort_by: Some("size".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let cfg = AppConfig::load(Some(&cfg_path), Some(&cli_overrides));
        // CLI override wins
        assert_eq!(cfg.sort_by(), "size");
        // File value preserved
        assert!(!cfg.show_hidden());
    }
}
