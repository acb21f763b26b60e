// File watcher feeding save/remove triggers to the re-indexer

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::reindex::ChangeEvent;
use crate::strategies::SUPPORTED_EXTENSIONS;

pub struct FileWatcher {
    watch_path: PathBuf,
}

impl FileWatcher {
    pub fn new(watch_path: PathBuf) -> Self {
        Self { watch_path }
    }

    /// Watch the tree and forward relevant events on `sender`. The
    /// re-indexer owns debouncing and hash checks; this only filters by
    /// extension and maps notify events to save/remove triggers.
    pub async fn watch(&self, sender: mpsc::Sender<ChangeEvent>) -> Result<()> {
        info!("Starting file watcher for: {}", self.watch_path.display());

        let (tx, mut rx) = mpsc::channel(100);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let tx = tx.clone();
                match res {
                    Ok(event) => {
                        if let Err(e) = tx.blocking_send(event) {
                            error!("Failed to forward file event: {}", e);
                        }
                    }
                    Err(e) => error!("File watch error: {}", e),
                }
            },
            Config::default(),
        )?;

        watcher.watch(&self.watch_path, RecursiveMode::Recursive)?;
        info!("File watcher started. Monitoring for changes...");

        while let Some(event) = rx.recv().await {
            for change in map_event(&event) {
                if sender.send(change).await.is_err() {
                    debug!("Re-indexer gone, watcher stopping");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn map_event(event: &Event) -> Vec<ChangeEvent> {
    let mut changes = Vec::new();
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            for path in &event.paths {
                if is_supported(path) {
                    changes.push(ChangeEvent::Saved(path.clone()));
                }
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                if is_supported(path) {
                    changes.push(ChangeEvent::Removed(path.clone()));
                }
            }
        }
        _ => {}
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};

    #[test]
    fn test_map_event_filters_unsupported() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("a.py"))
            .add_path(PathBuf::from("notes.txt"));
        let changes = map_event(&event);
        assert_eq!(changes.len(), 1);
        assert!(matches!(&changes[0], ChangeEvent::Saved(p) if p == Path::new("a.py")));
    }

    #[test]
    fn test_map_event_remove() {
        let event = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("src/engine.cpp"));
        let changes = map_event(&event);
        assert!(matches!(&changes[0], ChangeEvent::Removed(_)));
    }
}
