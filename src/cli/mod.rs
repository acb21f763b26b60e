// CLI command implementations

pub mod index;
pub mod resolve;
pub mod stats;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::graph::table::SymbolTable;
use crate::graph::{GraphSink, MemorySink};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::preserve::ParseStore;

/// Everything a command needs for one project.
pub struct ProjectContext {
    pub config: Config,
    pub project_root: PathBuf,
    pub orchestrator: Arc<Orchestrator>,
    pub sink: Arc<MemorySink>,
}

impl ProjectContext {
    pub fn open(project: &str, rebuild: bool) -> Result<Self> {
        let project_root = PathBuf::from(project);
        let config = Config::from_project_dir(&project_root);

        let db_path = project_root.join(".symgraph.db");
        if rebuild && db_path.exists() {
            std::fs::remove_file(&db_path)?;
        }

        let store = Arc::new(ParseStore::new(&db_path)?);
        let table = Arc::new(SymbolTable::new());
        let sink = Arc::new(MemorySink::new());

        // Warm the table from preserved parses. Commands that skip
        // unchanged files via the hash gate still resolve against the
        // whole project this way.
        for record in store.all_records()? {
            table.apply_file_parse(&record.file_path, record.symbols);
        }

        let orchestrator = Arc::new(Orchestrator::new(
            Path::new(project),
            store,
            table,
            Arc::clone(&sink) as Arc<dyn GraphSink>,
            OrchestratorConfig {
                large_file_bytes: config.parsing.large_file_bytes,
                tree_max_bytes: config.parsing.tree_max_bytes,
                critical_markers: config.parsing.critical_markers.clone(),
                external_tool: config.parsing.external_tool.clone(),
            },
            config.external_timeout(),
        ));

        Ok(Self {
            config,
            project_root,
            orchestrator,
            sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceVector;
    use crate::graph::{Symbol, SymbolKind};
    use crate::preserve::{now, ParseRecord};
    use crate::strategies::StrategyTier;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::tempdir;

    #[test]
    fn test_open_hydrates_table_from_preserved_records() {
        let dir = tempdir().unwrap();
        let store = ParseStore::new(dir.path().join(".symgraph.db")).unwrap();
        let symbol = Symbol {
            id: Symbol::derive_id("engine::start", "engine.cpp", SymbolKind::Function),
            name: "start".to_string(),
            qualified_name: "engine::start".to_string(),
            kind: SymbolKind::Function,
            file_path: "engine.cpp".to_string(),
            line: 1,
            end_line: 2,
            namespace: Some("engine".to_string()),
            parent_class: None,
            return_type: None,
            is_exported: true,
            is_template: false,
            confidence: 0.9,
            semantic_tags: BTreeSet::new(),
        };
        store
            .put(&ParseRecord {
                file_path: "engine.cpp".to_string(),
                content_hash: "h1".to_string(),
                tier: StrategyTier::Tree,
                confidence: ConfidenceVector::uniform(0.8),
                best_confidence: 0.8,
                symbols: vec![symbol],
                per_strategy: BTreeMap::new(),
                parse_duration_ms: 2,
                parsed_at: now(),
            })
            .unwrap();
        drop(store);

        let ctx = ProjectContext::open(&dir.path().to_string_lossy(), false).unwrap();
        assert_eq!(ctx.orchestrator.table().symbol_count(), 1);
        assert_eq!(ctx.orchestrator.table().find_exact("engine::start").len(), 1);
    }
}
