use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use dirview::config::{AppConfig, ListingConfig, WatcherConfig};
use dirview::error::{self, ViewError};
use dirview::{
    DirectoryView, DirectoryViewRegistry, FileRecord, ListingKey, LocalFileProvider, Locator,
    NotifyWatcherFactory, SortSpec, ViewEvent, ViewUpdate, WatcherFactory,
};

/// List a directory and optionally follow its changes.
#[derive(Parser, Debug)]
#[command(name = "dirview", version, about)]
struct Cli {
    /// Directory to list (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Sort by: default, name, size, last-read, modified
    #[arg(long, value_name = "ROLE")]
    sort: Option<String>,

    /// Sort in descending order
    #[arg(long)]
    desc: bool,

    /// List directories among files instead of first
    #[arg(long)]
    mix: bool,

    /// Rescan on every open instead of serving the cached list
    #[arg(long)]
    no_cache: bool,

    /// Disable the filesystem watcher
    #[arg(long)]
    no_watcher: bool,

    /// Explicit config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep printing changes until the directory is removed or Ctrl-C
    #[arg(long)]
    follow: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> AppConfig {
        AppConfig {
            listing: ListingConfig {
                sort_by: self.sort.clone(),
                descending: self.desc.then_some(true),
                mix_dirs_and_files: self.mix.then_some(true),
                cache_listings: self.no_cache.then_some(false),
                ..Default::default()
            },
            watcher: WatcherConfig {
                enabled: self.no_watcher.then_some(false),
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = cli
        .path
        .canonicalize()
        .map_err(|_| ViewError::InvalidPath(format!("{} does not exist", cli.path.display())))?;
    if !path.is_dir() {
        return Err(ViewError::InvalidPath(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    let sort = config.sort_spec();

    let watcher: Option<Arc<dyn WatcherFactory>> = if config.watcher_enabled() {
        Some(Arc::new(NotifyWatcherFactory::new()))
    } else {
        None
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let registry = DirectoryViewRegistry::new(
        Arc::new(LocalFileProvider::new()),
        watcher,
        config.view_config(),
        tx,
    );

    let root = Locator::local(&path);
    let view = registry.get(&root);
    let key = ListingKey::new(sort.role.label());
    view.open(key.clone(), sort)?;

    while let Some(update) = rx.recv().await {
        match update.event {
            ViewEvent::TraversalComplete { key: done } if done == key => break,
            ViewEvent::SourceData {
                key: done,
                finished: true,
                ..
            } if done == key => break,
            _ => {}
        }
    }
    print_listing(&view, &sort, cli.json);

    if cli.follow {
        follow(&root, &mut rx, cli.json).await;
    }

    registry.close_all();
    Ok(())
}

fn print_listing(view: &DirectoryView, sort: &SortSpec, as_json: bool) {
    let records = view.sorted(sort);
    if as_json {
        println!("{}", json!({ "root": view.root(), "entries": records }));
        return;
    }
    for record in &records {
        println!("{}", format_record(record));
    }
}

fn format_record(record: &FileRecord) -> String {
    let kind = if record.is_dir {
        'd'
    } else if record.is_symlink {
        'l'
    } else {
        '-'
    };
    format!("{kind} {:>10}  {}", record.sort_key.size, record.name())
}

async fn follow(root: &Locator, rx: &mut mpsc::UnboundedReceiver<ViewUpdate>, as_json: bool) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let update = tokio::select! {
            update = rx.recv() => update,
            _ = &mut ctrl_c => None,
        };
        let Some(update) = update else {
            return;
        };

        let (change, records) = match update.event {
            ViewEvent::EntriesAdded(records) => ("added", records),
            ViewEvent::EntriesRemoved(records) => ("removed", records),
            ViewEvent::EntryUpdated(record) => ("updated", vec![record]),
            ViewEvent::HiddenMarkerChanged(_) => ("hidden-marker-changed", Vec::new()),
            ViewEvent::CloseRequested(url) if url == *root => {
                if as_json {
                    println!("{}", json!({ "change": "closed", "url": url }));
                } else {
                    println!("x {url}");
                }
                return;
            }
            _ => continue,
        };

        if as_json {
            println!("{}", json!({ "change": change, "entries": records }));
            continue;
        }
        let mark = match change {
            "added" => '+',
            "removed" => '-',
            "updated" => '~',
            _ => '*',
        };
        if records.is_empty() {
            println!("{mark} {change}");
        }
        for record in &records {
            println!("{mark} {}", format_record(record));
        }
    }
}
