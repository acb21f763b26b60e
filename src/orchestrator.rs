// Parsing orchestrator
//
// Routes each file across the strategy tiers, scores the winner, persists
// it under the monotonic-confidence contract, applies symbols to the
// table and publishes patterns downstream. Call-site resolution is a
// separate pass (`resolve_and_publish`) so project-wide indexing can
// parse everything before resolving anything.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::confidence::score;
use crate::graph::table::SymbolTable;
use crate::graph::{CallSite, GraphBatch, GraphSink, PatternHit, Relationship};
use crate::preserve::{content_hash, now, ParseRecord, ParseStore, PutOutcome, StrategyAttempt};
use crate::resolve::ResolutionPipeline;
use crate::strategies::external::ExternalStrategy;
use crate::strategies::line::LineStrategy;
use crate::strategies::tree::TreeStrategy;
use crate::strategies::{ParseResult, ParseStrategy, StrategyError, StrategyTier};

/// Errors escaping the orchestrator. Tier fallback and preserved-data use
/// consume most strategy failures internally.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("strategy '{strategy}' failed on {path}: {source}")]
    Strategy {
        strategy: &'static str,
        path: String,
        #[source]
        source: StrategyError,
    },

    #[error("all strategies failed on {path}")]
    AllStrategiesFailed { path: String },

    #[error("parse store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Files above this size go straight to the line tier.
    pub large_file_bytes: usize,
    /// Size cap for the syntax-tree tier.
    pub tree_max_bytes: usize,
    /// Path markers that make a large file worth a background deep pass.
    pub critical_markers: Vec<String>,
    pub external_tool: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            large_file_bytes: 1024 * 1024,
            tree_max_bytes: crate::strategies::tree::DEFAULT_MAX_BYTES,
            critical_markers: vec![
                "core".to_string(),
                "engine".to_string(),
                "interface".to_string(),
                "api".to_string(),
            ],
            external_tool: "ctags".to_string(),
        }
    }
}

/// What one orchestrated parse produced.
#[derive(Debug)]
pub struct ParseSummary {
    pub result: ParseResult,
    pub record: ParseRecord,
    pub tier: StrategyTier,
    pub overall: f32,
    /// The published symbols came from the preservation store rather than
    /// the fresh parse (external failure with a prior high-accuracy
    /// record, or a fresh result weaker than the stored one).
    pub preserved: bool,
    pub deep_pass_scheduled: bool,
}

pub struct Orchestrator {
    external: Option<Arc<dyn ParseStrategy>>,
    tree: Arc<dyn ParseStrategy>,
    line: Arc<dyn ParseStrategy>,
    store: Arc<ParseStore>,
    table: Arc<SymbolTable>,
    sink: Arc<dyn GraphSink>,
    pipeline: ResolutionPipeline,
    config: OrchestratorConfig,
    deep_passes: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Orchestrator {
    /// Build with the standard tier set, probing external tool
    /// availability once.
    pub fn new(
        project_root: &Path,
        store: Arc<ParseStore>,
        table: Arc<SymbolTable>,
        sink: Arc<dyn GraphSink>,
        config: OrchestratorConfig,
        external_timeout: std::time::Duration,
    ) -> Self {
        let external_strategy =
            ExternalStrategy::with_tool(&config.external_tool, external_timeout);
        let external: Option<Arc<dyn ParseStrategy>> =
            match external_strategy.initialize(project_root) {
                Ok(()) => Some(Arc::new(external_strategy)),
                Err(e) => {
                    info!("External tier disabled: {}", e);
                    None
                }
            };

        let tree = Arc::new(TreeStrategy::with_max_bytes(config.tree_max_bytes));
        Self::with_strategies(
            external,
            tree,
            Arc::new(LineStrategy::new()),
            store,
            table,
            sink,
            config,
        )
    }

    /// Assemble from explicit strategies. Tests inject stubs here.
    pub fn with_strategies(
        external: Option<Arc<dyn ParseStrategy>>,
        tree: Arc<dyn ParseStrategy>,
        line: Arc<dyn ParseStrategy>,
        store: Arc<ParseStore>,
        table: Arc<SymbolTable>,
        sink: Arc<dyn GraphSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            external,
            tree,
            line,
            store,
            table,
            sink,
            pipeline: ResolutionPipeline::with_builtins(),
            config,
            deep_passes: Mutex::new(Vec::new()),
        }
    }

    pub fn table(&self) -> &Arc<SymbolTable> {
        &self.table
    }

    pub fn store(&self) -> &Arc<ParseStore> {
        &self.store
    }

    pub fn pipeline_mut(&mut self) -> &mut ResolutionPipeline {
        &mut self.pipeline
    }

    /// Parse only when the content hash differs from the stored record.
    pub fn parse_if_changed(
        &self,
        path: &str,
        content: &str,
    ) -> Result<Option<ParseSummary>, ParseError> {
        let hash = content_hash(content);
        if !self
            .store
            .file_changed(path, &hash)
            .map_err(ParseError::Store)?
        {
            debug!(file = path, "skipped, unchanged");
            return Ok(None);
        }
        self.parse_file(path, content).map(Some)
    }

    /// Read a file from disk and parse it.
    pub fn parse_path(&self, path: &Path) -> Result<ParseSummary, ParseError> {
        let path_str = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        self.parse_file(&path_str, &content)
    }

    /// Route one file across the tiers, persist and publish the winner.
    pub fn parse_file(&self, path: &str, content: &str) -> Result<ParseSummary, ParseError> {
        let hash = content_hash(content);
        let mut attempts: BTreeMap<String, StrategyAttempt> = BTreeMap::new();

        // Large files get the cheap answer now; critical ones also get a
        // background deep pass that republishes when it lands.
        if content.len() > self.config.large_file_bytes {
            let result = self.run_line(path, content)?;
            let deep = self.is_critical(path);
            let summary =
                self.persist_and_publish(path, &hash, result, StrategyTier::Line, deep, attempts)?;
            // Scheduled after the cheap result is persisted so the deep
            // pass always compares against it.
            if deep {
                self.schedule_deep_pass(path, content, &hash);
            }
            return Ok(summary);
        }

        if let Some(external) = &self.external {
            match external.parse_file(path, content) {
                Ok(result) => {
                    // Harvest tree-tier patterns into the high-tier result.
                    let result = match self.tree.parse_file(path, content) {
                        Ok(tree_result) => {
                            attempts.insert(
                                StrategyTier::Tree.as_str().to_string(),
                                StrategyAttempt::succeeded(
                                    tree_result.symbols.len(),
                                    score(StrategyTier::Tree, &tree_result.evidence()).overall(),
                                ),
                            );
                            merge_results(result, tree_result)
                        }
                        Err(_) => {
                            attempts.insert(
                                StrategyTier::Tree.as_str().to_string(),
                                StrategyAttempt::failed(),
                            );
                            result
                        }
                    };
                    return self.persist_and_publish(
                        path,
                        &hash,
                        result,
                        StrategyTier::External,
                        false,
                        attempts,
                    );
                }
                Err(e) => {
                    warn!(file = path, error = %e, "External tier failed, checking preserved data");
                    attempts.insert(
                        StrategyTier::External.as_str().to_string(),
                        StrategyAttempt::failed(),
                    );
                    if let Some(summary) = self.preserved_fallback(path, &hash, content)? {
                        return Ok(summary);
                    }
                }
            }
        }

        match self.tree.parse_file(path, content) {
            Ok(result) => {
                self.persist_and_publish(path, &hash, result, StrategyTier::Tree, false, attempts)
            }
            Err(e) if e.is_size_related() => {
                debug!(file = path, "Tree tier refused input size, falling back to line");
                attempts.insert(
                    StrategyTier::Tree.as_str().to_string(),
                    StrategyAttempt::failed(),
                );
                let result = self.run_line(path, content)?;
                self.persist_and_publish(path, &hash, result, StrategyTier::Line, false, attempts)
            }
            Err(source) => Err(ParseError::Strategy {
                strategy: "tree",
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Resolve call sites against the current table, record the resulting
    /// relationships and publish them as one batch.
    pub fn resolve_and_publish(
        &self,
        path: &str,
        call_sites: &[CallSite],
    ) -> Result<GraphBatch> {
        let mut relationships: Vec<Relationship> = Vec::new();
        for site in call_sites {
            // An edge needs a real symbol id on the caller side too, or the
            // tombstone cascade could never remove it.
            let callers = self.table.find_exact(&site.from_name);
            let caller = callers
                .iter()
                .find(|s| s.is_callable())
                .or_else(|| callers.first());
            let Some(caller) = caller else {
                debug!(from = %site.from_name, "Caller unknown, call site dropped");
                continue;
            };

            if let Some(resolution) = self.pipeline.resolve(site, &self.table) {
                let rel = resolution.into_relationship(site, caller.id.clone());
                self.table.add_relationship(rel.clone());
                relationships.push(rel);
            } else {
                debug!(
                    from = %site.from_name,
                    to = %site.to_name,
                    "Call site unresolved, dropped"
                );
            }
        }

        let batch = GraphBatch {
            file_path: path.to_string(),
            patterns: Vec::new(),
            relationships: relationships.clone(),
            removed_symbols: Vec::new(),
        };
        if !relationships.is_empty() {
            self.sink.publish(batch.clone())?;
        }
        Ok(batch)
    }

    /// Await outstanding background deep passes. Tests and shutdown use
    /// this; normal operation never waits on them.
    pub async fn drain_deep_passes(&self) {
        let handles: Vec<_> = self.deep_passes.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn run_line(&self, path: &str, content: &str) -> Result<ParseResult, ParseError> {
        self.line
            .parse_file(path, content)
            .map_err(|source| ParseError::Strategy {
                strategy: "line",
                path: path.to_string(),
                source,
            })
    }

    fn is_critical(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        if matches!(
            Path::new(path).extension().and_then(|e| e.to_str()),
            Some("h" | "hpp" | "hxx" | "ixx")
        ) {
            return true;
        }
        self.config
            .critical_markers
            .iter()
            .any(|marker| lower.contains(marker.as_str()))
    }

    /// External failed: a preserved high-accuracy record for the current
    /// content hash wins over re-parsing at a lower tier. Patterns are
    /// refreshed from a cheap fresh pass.
    fn preserved_fallback(
        &self,
        path: &str,
        hash: &str,
        content: &str,
    ) -> Result<Option<ParseSummary>, ParseError> {
        let record = match self.store.get(path).map_err(ParseError::Store)? {
            Some(r) if r.content_hash == hash && r.tier == StrategyTier::External => r,
            _ => return Ok(None),
        };

        info!(
            file = path,
            confidence = record.best_confidence,
            "Using preserved high-accuracy parse over degraded fresh result"
        );

        let patterns = self
            .tree
            .parse_file(path, content)
            .or_else(|_| self.line.parse_file(path, content))
            .map(|r| r.patterns)
            .unwrap_or_default();

        let result = ParseResult {
            file_path: path.to_string(),
            strategy: "external".to_string(),
            symbols: record.symbols.clone(),
            call_sites: Vec::new(),
            patterns,
            special_form_count: 0,
            parse_duration_ms: 0,
        };
        self.apply_and_publish(path, &result, &record)?;

        Ok(Some(ParseSummary {
            tier: record.tier,
            overall: record.best_confidence,
            preserved: true,
            deep_pass_scheduled: false,
            result,
            record: self
                .store
                .get(path)
                .map_err(ParseError::Store)?
                .unwrap_or(record),
        }))
    }

    fn persist_and_publish(
        &self,
        path: &str,
        hash: &str,
        result: ParseResult,
        tier: StrategyTier,
        deep_pass_scheduled: bool,
        mut attempts: BTreeMap<String, StrategyAttempt>,
    ) -> Result<ParseSummary, ParseError> {
        let vector = score(tier, &result.evidence());
        let overall = vector.overall();
        attempts.insert(
            tier.as_str().to_string(),
            StrategyAttempt::succeeded(result.symbols.len(), overall),
        );

        let record = ParseRecord {
            file_path: path.to_string(),
            content_hash: hash.to_string(),
            tier,
            confidence: vector,
            best_confidence: overall,
            symbols: result.symbols.clone(),
            per_strategy: attempts,
            parse_duration_ms: result.parse_duration_ms,
            parsed_at: now(),
        };

        let outcome = self.store.put(&record).map_err(ParseError::Store)?;
        if outcome == PutOutcome::Kept {
            // Strategy regression on unchanged content: the stored
            // higher-accuracy symbols stay authoritative.
            let kept = self
                .store
                .get(path)
                .map_err(ParseError::Store)?
                .ok_or_else(|| ParseError::AllStrategiesFailed {
                    path: path.to_string(),
                })?;
            let mut preserved_result = result;
            preserved_result.symbols = kept.symbols.clone();
            self.apply_and_publish(path, &preserved_result, &kept)?;
            return Ok(ParseSummary {
                tier: kept.tier,
                overall: kept.best_confidence,
                preserved: true,
                deep_pass_scheduled,
                result: preserved_result,
                record: kept,
            });
        }

        self.apply_and_publish(path, &result, &record)?;
        Ok(ParseSummary {
            tier,
            overall,
            preserved: false,
            deep_pass_scheduled,
            result,
            record,
        })
    }

    fn apply_and_publish(
        &self,
        path: &str,
        result: &ParseResult,
        _record: &ParseRecord,
    ) -> Result<(), ParseError> {
        let outcome = self.table.apply_file_parse(path, result.symbols.clone());
        debug!(
            file = path,
            inserted = outcome.inserted,
            replaced = outcome.replaced,
            tombstoned = outcome.tombstoned.len(),
            "Applied parse to symbol table"
        );

        if !result.patterns.is_empty() || !outcome.tombstoned.is_empty() {
            self.sink
                .publish(GraphBatch {
                    file_path: path.to_string(),
                    patterns: result.patterns.clone(),
                    relationships: Vec::new(),
                    removed_symbols: outcome.tombstoned,
                })
                .map_err(ParseError::Store)?;
        }
        Ok(())
    }

    /// Fire-and-forget deep pass for a critical large file: tree first,
    /// external on top when available, republishing under the monotonic
    /// contract. Never awaited by the caller; errors are logged only.
    fn schedule_deep_pass(&self, path: &str, content: &str, hash: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(file = path, "No async runtime, deep pass skipped");
            return;
        };

        let path = path.to_string();
        let content = content.to_string();
        let hash = hash.to_string();
        let tree = Arc::clone(&self.tree);
        let external = self.external.clone();
        let store = Arc::clone(&self.store);
        let table = Arc::clone(&self.table);
        let sink = Arc::clone(&self.sink);

        let join = handle.spawn_blocking(move || {
            let mut attempts: BTreeMap<String, StrategyAttempt> = BTreeMap::new();
            let deep = match &external {
                Some(ext) => ext
                    .parse_file(&path, &content)
                    .map(|r| (r, StrategyTier::External))
                    .or_else(|_| {
                        attempts.insert(
                            StrategyTier::External.as_str().to_string(),
                            StrategyAttempt::failed(),
                        );
                        tree.parse_file(&path, &content)
                            .map(|r| (r, StrategyTier::Tree))
                    }),
                None => tree
                    .parse_file(&path, &content)
                    .map(|r| (r, StrategyTier::Tree)),
            };

            match deep {
                Ok((result, tier)) => {
                    let vector = score(tier, &result.evidence());
                    attempts.insert(
                        tier.as_str().to_string(),
                        StrategyAttempt::succeeded(result.symbols.len(), vector.overall()),
                    );
                    let record = ParseRecord {
                        file_path: path.clone(),
                        content_hash: hash,
                        tier,
                        confidence: vector,
                        best_confidence: vector.overall(),
                        symbols: result.symbols.clone(),
                        per_strategy: attempts,
                        parse_duration_ms: result.parse_duration_ms,
                        parsed_at: now(),
                    };
                    // Conditional on the stored hash: the file may have
                    // been edited (or deleted) while this pass ran.
                    match store.put_same_hash(&record) {
                        Ok(PutOutcome::Kept) => {}
                        Ok(PutOutcome::Stale) => {
                            debug!(file = %path, "Deep pass result superseded, dropped");
                        }
                        Ok(_) => {
                            table.apply_file_parse(&path, result.symbols.clone());
                            if !result.patterns.is_empty() {
                                let _ = sink.publish(GraphBatch {
                                    file_path: path.clone(),
                                    patterns: result.patterns,
                                    relationships: Vec::new(),
                                    removed_symbols: Vec::new(),
                                });
                            }
                            info!(
                                file = %path,
                                tier = tier.as_str(),
                                "Background deep pass upgraded parse"
                            );
                        }
                        Err(e) => warn!(file = %path, error = %e, "Deep pass store write failed"),
                    }
                }
                Err(e) => warn!(file = %path, error = %e, "Background deep pass failed"),
            }
        });
        self.deep_passes.lock().push(join);
    }
}

/// Primary is the result with more method/class yield; patterns are the
/// union across both, deduplicated by hash. A weaker strategy's pattern
/// is never dropped.
fn merge_results(a: ParseResult, b: ParseResult) -> ParseResult {
    let (mut primary, secondary) = if b.method_and_class_count() > a.method_and_class_count() {
        (b, a)
    } else {
        (a, b)
    };

    let mut seen: HashMap<String, usize> = primary
        .patterns
        .iter()
        .enumerate()
        .map(|(i, p)| (p.hash.clone(), i))
        .collect();
    for pattern in secondary.patterns {
        match seen.get(&pattern.hash) {
            Some(&i) => {
                // Same detection from two tiers: keep the stronger score.
                if pattern.confidence > primary.patterns[i].confidence {
                    primary.patterns[i] = pattern;
                }
            }
            None => {
                seen.insert(pattern.hash.clone(), primary.patterns.len());
                primary.patterns.push(pattern);
            }
        }
    }

    if primary.call_sites.is_empty() {
        primary.call_sites = secondary.call_sites;
    }
    primary
}

/// Union two pattern lists by hash, preferring higher confidence.
pub fn merge_patterns(mut base: Vec<PatternHit>, extra: Vec<PatternHit>) -> Vec<PatternHit> {
    let mut seen: HashMap<String, usize> = base
        .iter()
        .enumerate()
        .map(|(i, p)| (p.hash.clone(), i))
        .collect();
    for pattern in extra {
        match seen.get(&pattern.hash) {
            Some(&i) => {
                if pattern.confidence > base[i].confidence {
                    base[i] = pattern;
                }
            }
            None => {
                seen.insert(pattern.hash.clone(), base.len());
                base.push(pattern);
            }
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceVector;
    use crate::graph::{MemorySink, Symbol, SymbolKind};
    use crate::strategies::StrategyCapabilities;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::tempdir;

    type StubFn =
        Box<dyn Fn(&str, &str) -> Result<ParseResult, StrategyError> + Send + Sync>;

    struct StubStrategy {
        tier: StrategyTier,
        behavior: StubFn,
    }

    impl StubStrategy {
        fn ok(tier: StrategyTier, symbols: Vec<Symbol>) -> Arc<Self> {
            let strategy_name = tier.as_str().to_string();
            Arc::new(Self {
                tier,
                behavior: Box::new(move |path, _| {
                    Ok(ParseResult {
                        file_path: path.to_string(),
                        strategy: strategy_name.clone(),
                        symbols: symbols.clone(),
                        ..Default::default()
                    })
                }),
            })
        }

        fn failing(tier: StrategyTier) -> Arc<Self> {
            Arc::new(Self {
                tier,
                behavior: Box::new(|path, _| {
                    Err(StrategyError::Syntax {
                        path: path.to_string(),
                        message: "stub failure".to_string(),
                    })
                }),
            })
        }

        fn too_large(tier: StrategyTier) -> Arc<Self> {
            Arc::new(Self {
                tier,
                behavior: Box::new(|path, content| {
                    Err(StrategyError::TooLarge {
                        path: path.to_string(),
                        bytes: content.len(),
                    })
                }),
            })
        }
    }

    impl ParseStrategy for StubStrategy {
        fn capabilities(&self) -> StrategyCapabilities {
            StrategyCapabilities {
                name: "stub",
                tier: self.tier,
                extensions: &["cpp", "py", "rs"],
                features: &[],
            }
        }

        fn initialize(&self, _root: &Path) -> Result<(), StrategyError> {
            Ok(())
        }

        fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, StrategyError> {
            (self.behavior)(path, content)
        }
    }

    fn symbol(qualified_name: &str, file: &str) -> Symbol {
        Symbol {
            id: Symbol::derive_id(qualified_name, file, SymbolKind::Function),
            name: qualified_name.to_string(),
            qualified_name: qualified_name.to_string(),
            kind: SymbolKind::Function,
            file_path: file.to_string(),
            line: 1,
            end_line: 2,
            namespace: None,
            parent_class: None,
            return_type: None,
            is_exported: true,
            is_template: false,
            confidence: 0.9,
            semantic_tags: BTreeSet::new(),
        }
    }

    fn harness(
        external: Option<Arc<dyn ParseStrategy>>,
        tree: Arc<dyn ParseStrategy>,
        line: Arc<dyn ParseStrategy>,
        config: OrchestratorConfig,
    ) -> (Orchestrator, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(ParseStore::new(dir.path().join("parse.db")).unwrap());
        let table = Arc::new(SymbolTable::new());
        let sink = Arc::new(MemorySink::new());
        let orch =
            Orchestrator::with_strategies(external, tree, line, store, table, sink, config);
        (orch, dir)
    }

    #[test]
    fn test_external_wins_when_available() {
        let (orch, _dir) = harness(
            Some(StubStrategy::ok(
                StrategyTier::External,
                vec![symbol("alpha", "a.cpp")],
            )),
            StubStrategy::ok(StrategyTier::Tree, vec![symbol("alpha", "a.cpp")]),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            OrchestratorConfig::default(),
        );

        let summary = orch.parse_file("a.cpp", "void alpha();").unwrap();
        assert_eq!(summary.tier, StrategyTier::External);
        assert!(!summary.preserved);
        assert_eq!(orch.table().symbol_count(), 1);
        assert!(summary.record.per_strategy["external"].succeeded);
        assert!(summary.record.per_strategy["tree"].succeeded);
    }

    #[test]
    fn test_tree_size_failure_falls_back_to_line() {
        let (orch, _dir) = harness(
            None,
            StubStrategy::too_large(StrategyTier::Tree),
            StubStrategy::ok(StrategyTier::Line, vec![symbol("beta", "b.cpp")]),
            OrchestratorConfig::default(),
        );

        let summary = orch.parse_file("b.cpp", "void beta();").unwrap();
        assert_eq!(summary.tier, StrategyTier::Line);
        assert!(summary.overall < 0.8);
    }

    #[test]
    fn test_tree_syntax_failure_propagates() {
        let (orch, _dir) = harness(
            None,
            StubStrategy::failing(StrategyTier::Tree),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            OrchestratorConfig::default(),
        );

        let err = orch.parse_file("c.cpp", "void gamma();").unwrap_err();
        assert!(matches!(err, ParseError::Strategy { strategy: "tree", .. }));
    }

    #[test]
    fn test_external_failure_uses_preserved_record() {
        let content = "void alpha();";
        let hash = content_hash(content);

        let (orch, _dir) = harness(
            Some(StubStrategy::failing(StrategyTier::External)),
            StubStrategy::ok(StrategyTier::Tree, Vec::new()),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            OrchestratorConfig::default(),
        );

        // A prior external success for the same content hash.
        orch.store()
            .put(&ParseRecord {
                file_path: "a.cpp".to_string(),
                content_hash: hash,
                tier: StrategyTier::External,
                confidence: ConfidenceVector::uniform(0.97),
                best_confidence: 0.97,
                symbols: vec![symbol("alpha", "a.cpp")],
                per_strategy: BTreeMap::new(),
                parse_duration_ms: 3,
                parsed_at: now(),
            })
            .unwrap();

        let summary = orch.parse_file("a.cpp", content).unwrap();
        assert!(summary.preserved);
        assert_eq!(summary.tier, StrategyTier::External);
        assert_eq!(summary.result.symbols.len(), 1);
        assert_eq!(orch.table().symbol_count(), 1);
    }

    #[test]
    fn test_monotonic_preservation_on_strategy_regression() {
        let content = "void alpha();";

        // First pass: external available and strong.
        let (orch, dir) = harness(
            Some(StubStrategy::ok(
                StrategyTier::External,
                vec![symbol("alpha", "a.cpp")],
            )),
            StubStrategy::ok(StrategyTier::Tree, Vec::new()),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            OrchestratorConfig::default(),
        );
        let first = orch.parse_file("a.cpp", content).unwrap();
        assert_eq!(first.tier, StrategyTier::External);

        // Second pass on the same store: external gone, only line succeeds.
        let store = Arc::new(ParseStore::new(dir.path().join("parse.db")).unwrap());
        let orch2 = Orchestrator::with_strategies(
            None,
            StubStrategy::too_large(StrategyTier::Tree),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            store,
            Arc::new(SymbolTable::new()),
            Arc::new(MemorySink::new()),
            OrchestratorConfig::default(),
        );
        let second = orch2.parse_file("a.cpp", content).unwrap();

        assert!(second.preserved);
        assert_eq!(second.tier, StrategyTier::External);
        assert_eq!(second.result.symbols.len(), 1);
        let stored = orch2.store().get("a.cpp").unwrap().unwrap();
        assert_eq!(stored.tier, StrategyTier::External);
    }

    #[test]
    fn test_parse_if_changed_skips_unchanged() {
        let (orch, _dir) = harness(
            None,
            StubStrategy::ok(StrategyTier::Tree, vec![symbol("alpha", "a.cpp")]),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            OrchestratorConfig::default(),
        );

        assert!(orch.parse_if_changed("a.cpp", "void alpha();").unwrap().is_some());
        assert!(orch.parse_if_changed("a.cpp", "void alpha();").unwrap().is_none());
        assert!(orch.parse_if_changed("a.cpp", "void beta();").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_large_critical_file_two_pass() {
        let config = OrchestratorConfig {
            large_file_bytes: 16,
            ..Default::default()
        };
        let (orch, _dir) = harness(
            None,
            StubStrategy::ok(
                StrategyTier::Tree,
                vec![symbol("engine::start", "src/engine/Engine.cpp")],
            ),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            config,
        );

        let content = "void start() { /* far past the size cap */ }";
        let summary = orch
            .parse_file("src/engine/Engine.cpp", content)
            .unwrap();
        assert_eq!(summary.tier, StrategyTier::Line);
        assert!(summary.deep_pass_scheduled);

        orch.drain_deep_passes().await;
        let record = orch.store().get("src/engine/Engine.cpp").unwrap().unwrap();
        assert_eq!(record.tier, StrategyTier::Tree);
        assert_eq!(record.symbols.len(), 1);
    }

    #[test]
    fn test_large_non_critical_file_no_deep_pass() {
        let config = OrchestratorConfig {
            large_file_bytes: 16,
            ..Default::default()
        };
        let (orch, _dir) = harness(
            None,
            StubStrategy::ok(StrategyTier::Tree, Vec::new()),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            config,
        );

        let summary = orch
            .parse_file("scripts/helper.py", "x = 1  # long enough to exceed the cap")
            .unwrap();
        assert_eq!(summary.tier, StrategyTier::Line);
        assert!(!summary.deep_pass_scheduled);
    }

    #[test]
    fn test_caller_tombstone_drops_resolved_edges() {
        let (orch, _dir) = harness(
            None,
            StubStrategy::ok(StrategyTier::Tree, Vec::new()),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            OrchestratorConfig::default(),
        );
        orch.table()
            .apply_file_parse("circle.cpp", vec![symbol("Circle::render", "circle.cpp")]);
        orch.table()
            .apply_file_parse("util.cpp", vec![symbol("util::log", "util.cpp")]);

        let site = CallSite::call("Circle::render", "util::log", 9);
        let batch = orch.resolve_and_publish("circle.cpp", &[site]).unwrap();
        assert_eq!(batch.relationships.len(), 1);
        // The caller side must carry a real symbol id, not a bare name.
        assert_eq!(
            batch.relationships[0].from_symbol_id,
            Symbol::derive_id("Circle::render", "circle.cpp", SymbolKind::Function)
        );

        // The caller's file re-parses without it: the edge goes with it.
        let outcome = orch.table().apply_file_parse("circle.cpp", Vec::new());
        assert_eq!(outcome.dropped_relationships, 1);
        assert_eq!(orch.table().relationship_count(), 0);
    }

    #[test]
    fn test_unknown_caller_site_dropped() {
        let (orch, _dir) = harness(
            None,
            StubStrategy::ok(StrategyTier::Tree, Vec::new()),
            StubStrategy::ok(StrategyTier::Line, Vec::new()),
            OrchestratorConfig::default(),
        );
        orch.table()
            .apply_file_parse("util.cpp", vec![symbol("util::log", "util.cpp")]);

        let site = CallSite::call("ghost", "util::log", 1);
        let batch = orch.resolve_and_publish("x.cpp", &[site]).unwrap();
        assert!(batch.relationships.is_empty());
        assert_eq!(orch.table().relationship_count(), 0);
    }

    #[test]
    fn test_pattern_union_never_drops_weaker_hit() {
        let strong = PatternHit::new("factory", "WidgetFactory", "a.cpp", 3, 1.0);
        let weak_same = PatternHit::new("factory", "WidgetFactory", "a.cpp", 3, 0.6);
        let weak_only = PatternHit::new("singleton", "getInstance", "a.cpp", 9, 0.6);

        let merged = merge_patterns(vec![strong.clone()], vec![weak_same, weak_only]);
        assert_eq!(merged.len(), 2);
        let factory = merged.iter().find(|p| p.kind == "factory").unwrap();
        assert!((factory.confidence - 1.0).abs() < f32::EPSILON);
    }
}
