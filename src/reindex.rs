// Progressive re-indexer
//
// Two entry points into the same orchestrator path: a scheduled full pass
// over the project tree, and per-file save triggers from the watcher.
// Save events are debounced per path; unchanged files are skipped by the
// content-hash gate inside the orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::orchestrator::Orchestrator;
use crate::strategies::SUPPORTED_EXTENSIONS;

/// Per-pass counters, reported after every scheduled pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// A change delivered by the watcher.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Saved(PathBuf),
    Removed(PathBuf),
}

pub struct Reindexer {
    orchestrator: Arc<Orchestrator>,
    project_root: PathBuf,
    interval: Duration,
    debounce: Duration,
    last_handled: DashMap<String, Instant>,
    /// Saves coalesced by the debounce window, keyed by path with the time
    /// of the latest event. Flushed once the window elapses so the final
    /// write of a burst is still indexed promptly.
    pending: DashMap<String, Instant>,
}

impl Reindexer {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        project_root: PathBuf,
        interval: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            orchestrator,
            project_root,
            interval,
            debounce,
            last_handled: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Event loop: scheduled passes interleaved with save triggers.
    pub async fn run(&self, mut events: mpsc::Receiver<ChangeEvent>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut flush = tokio::time::interval(self.debounce.max(Duration::from_millis(50)));
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = flush.tick() => self.flush_pending(),
                _ = ticker.tick() => {
                    let stats = self.run_pass();
                    info!(
                        attempted = stats.attempted,
                        succeeded = stats.succeeded,
                        skipped = stats.skipped,
                        failed = stats.failed,
                        "Scheduled re-index pass complete"
                    );
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            debug!("Change channel closed, re-indexer stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    pub fn handle_event(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::Saved(path) => self.handle_save(&path),
            ChangeEvent::Removed(path) => self.handle_remove(&path),
        }
    }

    /// Re-parse one saved file, debounced per path. A save landing inside
    /// the debounce window is deferred, not dropped: `flush_pending` picks
    /// it up once the window elapses.
    pub fn handle_save(&self, path: &Path) {
        let path_str = path.to_string_lossy().to_string();
        if !self.debounce_allows(&path_str) {
            debug!(file = %path_str, "Save event coalesced, deferred to flush");
            self.pending.insert(path_str, Instant::now());
            return;
        }
        self.index_one(path);
    }

    /// Index deferred saves whose debounce window has elapsed.
    pub fn flush_pending(&self) {
        let now = Instant::now();
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) >= self.debounce)
            .map(|entry| entry.key().clone())
            .collect();
        for path_str in due {
            self.pending.remove(&path_str);
            self.last_handled.insert(path_str.clone(), Instant::now());
            debug!(file = %path_str, "Flushing deferred save");
            self.index_one(Path::new(&path_str));
        }
    }

    /// Remove a deleted file's symbols and record.
    pub fn handle_remove(&self, path: &Path) {
        let path_str = path.to_string_lossy().to_string();
        let outcome = self.orchestrator.table().remove_file(&path_str);
        if let Err(e) = self.orchestrator.store().remove(&path_str) {
            warn!(file = %path_str, error = %e, "Failed to drop parse record");
        }
        self.last_handled.remove(&path_str);
        self.pending.remove(&path_str);
        info!(
            file = %path_str,
            tombstoned = outcome.tombstoned.len(),
            dropped_edges = outcome.dropped_relationships,
            "Removed deleted file from index"
        );
    }

    /// One full pass over the project tree. Idempotent: a second pass over
    /// an unchanged tree skips every file.
    pub fn run_pass(&self) -> PassStats {
        let files = supported_files(&self.project_root);
        self.run_pass_over(&files)
    }

    pub fn run_pass_over(&self, files: &[PathBuf]) -> PassStats {
        let mut stats = PassStats::default();
        for path in files {
            stats.attempted += 1;
            match self.index_one(path) {
                IndexOutcome::Indexed => stats.succeeded += 1,
                IndexOutcome::Skipped => stats.skipped += 1,
                IndexOutcome::Failed => stats.failed += 1,
            }
        }
        stats
    }

    fn index_one(&self, path: &Path) -> IndexOutcome {
        let path_str = path.to_string_lossy().to_string();

        // File deleted between the event and now: drop the write silently.
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %path_str, "File gone before re-index, write dropped");
                return IndexOutcome::Skipped;
            }
            Err(e) => {
                warn!(file = %path_str, error = %e, "Failed to read file");
                return IndexOutcome::Failed;
            }
        };

        match self.orchestrator.parse_if_changed(&path_str, &content) {
            Ok(Some(summary)) => {
                if let Err(e) = self
                    .orchestrator
                    .resolve_and_publish(&path_str, &summary.result.call_sites)
                {
                    warn!(file = %path_str, error = %e, "Relationship publish failed");
                }
                debug!(
                    file = %path_str,
                    tier = summary.tier.as_str(),
                    confidence = summary.overall,
                    preserved = summary.preserved,
                    "Re-indexed file"
                );
                IndexOutcome::Indexed
            }
            Ok(None) => IndexOutcome::Skipped,
            Err(e) => {
                warn!(file = %path_str, error = %e, "Re-index failed");
                IndexOutcome::Failed
            }
        }
    }

    fn debounce_allows(&self, path: &str) -> bool {
        let now = Instant::now();
        match self.last_handled.get(path) {
            Some(last) if now.duration_since(*last) < self.debounce => false,
            _ => {
                self.last_handled.insert(path.to_string(), now);
                true
            }
        }
    }
}

enum IndexOutcome {
    Indexed,
    Skipped,
    Failed,
}

/// All parseable source files under a root, hidden directories excluded.
/// The root itself is exempt from the hidden-name check so a dot-named
/// project directory can still be indexed.
pub fn supported_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .map(|s| s.starts_with('.') && s.len() > 1)
                    .unwrap_or(false)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::table::SymbolTable;
    use crate::graph::MemorySink;
    use crate::orchestrator::OrchestratorConfig;
    use crate::preserve::ParseStore;
    use crate::strategies::line::LineStrategy;
    use crate::strategies::tree::TreeStrategy;
    use tempfile::tempdir;

    fn reindexer(root: &Path, db_dir: &Path) -> Reindexer {
        let store = Arc::new(ParseStore::new(db_dir.join("parse.db")).unwrap());
        let table = Arc::new(SymbolTable::new());
        let sink = Arc::new(MemorySink::new());
        let orchestrator = Arc::new(Orchestrator::with_strategies(
            None,
            Arc::new(TreeStrategy::new()),
            Arc::new(LineStrategy::new()),
            store,
            table,
            sink,
            OrchestratorConfig::default(),
        ));
        Reindexer::new(
            orchestrator,
            root.to_path_buf(),
            Duration::from_secs(300),
            Duration::from_millis(0),
        )
    }

    #[test]
    fn test_pass_is_idempotent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def alpha():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "def beta():\n    pass\n").unwrap();

        let reindexer = reindexer(dir.path(), dir.path());
        let first = reindexer.run_pass();
        assert_eq!(first.attempted, 2);
        assert_eq!(first.succeeded, 2);

        let second = reindexer.run_pass();
        assert_eq!(second.attempted, 2);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.succeeded, 0);
    }

    #[test]
    fn test_changed_file_reindexed() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def alpha():\n    pass\n").unwrap();

        let reindexer = reindexer(dir.path(), dir.path());
        reindexer.run_pass();

        std::fs::write(&file, "def alpha():\n    pass\n\ndef gamma():\n    pass\n").unwrap();
        let stats = reindexer.run_pass();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.skipped, 0);
    }

    #[test]
    fn test_deleted_file_write_dropped() {
        let dir = tempdir().unwrap();
        let reindexer = reindexer(dir.path(), dir.path());

        let gone = dir.path().join("missing.py");
        let stats = reindexer.run_pass_over(&[gone]);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_remove_event_drops_symbols_and_record() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def alpha():\n    pass\n").unwrap();

        let reindexer = reindexer(dir.path(), dir.path());
        reindexer.run_pass();
        assert!(reindexer.orchestrator.table().symbol_count() > 0);

        std::fs::remove_file(&file).unwrap();
        reindexer.handle_event(ChangeEvent::Removed(file.clone()));
        assert_eq!(reindexer.orchestrator.table().symbol_count(), 0);
        assert!(reindexer
            .orchestrator
            .store()
            .get(&file.to_string_lossy())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dot_named_root_still_walked() {
        let dir = tempdir().unwrap();
        let root = dir.path().join(".workspace");
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("a.py"), "def alpha():\n    pass\n").unwrap();
        std::fs::write(root.join(".git").join("b.py"), "def beta():\n    pass\n").unwrap();

        // Root name may be hidden; nested hidden directories stay excluded.
        let files = supported_files(&root);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.py"));
    }

    #[test]
    fn test_trailing_save_flushed_after_window() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def alpha():\n    pass\n").unwrap();

        let store = Arc::new(ParseStore::new(dir.path().join("parse.db")).unwrap());
        let orchestrator = Arc::new(Orchestrator::with_strategies(
            None,
            Arc::new(TreeStrategy::new()),
            Arc::new(LineStrategy::new()),
            store,
            Arc::new(SymbolTable::new()),
            Arc::new(MemorySink::new()),
            OrchestratorConfig::default(),
        ));
        let reindexer = Reindexer::new(
            orchestrator,
            dir.path().to_path_buf(),
            Duration::from_secs(300),
            Duration::from_millis(200),
        );

        reindexer.handle_save(&file);

        // A second save lands inside the window with new content.
        std::fs::write(&file, "def alpha():\n    pass\n\ndef gamma():\n    pass\n").unwrap();
        reindexer.handle_save(&file);
        let record = reindexer
            .orchestrator
            .store()
            .get(&file.to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(record.symbols.len(), 1);

        // Once the window elapses the deferred save is picked up.
        std::thread::sleep(Duration::from_millis(250));
        reindexer.flush_pending();
        let record = reindexer
            .orchestrator
            .store()
            .get(&file.to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(record.symbols.len(), 2);
        assert!(reindexer.pending.is_empty());
    }

    #[test]
    fn test_debounce_coalesces_rapid_saves() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ParseStore::new(dir.path().join("parse.db")).unwrap());
        let orchestrator = Arc::new(Orchestrator::with_strategies(
            None,
            Arc::new(TreeStrategy::new()),
            Arc::new(LineStrategy::new()),
            store,
            Arc::new(SymbolTable::new()),
            Arc::new(MemorySink::new()),
            OrchestratorConfig::default(),
        ));
        let reindexer = Reindexer::new(
            orchestrator,
            dir.path().to_path_buf(),
            Duration::from_secs(300),
            Duration::from_secs(60),
        );

        assert!(reindexer.debounce_allows("a.py"));
        assert!(!reindexer.debounce_allows("a.py"));
        assert!(reindexer.debounce_allows("b.py"));
    }
}
