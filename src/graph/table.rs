// In-memory symbol table and relationship graph

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{RelationKind, Relationship, Symbol, SymbolKind};

/// Result of applying a file's parse output to the table.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub inserted: usize,
    pub replaced: usize,
    /// Ids of symbols that disappeared from the latest parse of the file.
    pub tombstoned: Vec<String>,
    /// Relationships dropped because they referenced a tombstoned symbol.
    pub dropped_relationships: usize,
}

#[derive(Default)]
struct TableInner {
    symbols: HashMap<String, Symbol>,
    by_qualified_name: HashMap<String, Vec<String>>,
    by_file: HashMap<String, Vec<String>>,
    relationships: HashMap<(String, String, RelationKind), Relationship>,
}

/// Qualified-name index over all known symbols, plus the deduplicated
/// relationship graph. Writes per file path are serialized by the caller
/// (orchestrator/re-indexer); reads may run concurrently.
#[derive(Default)]
pub struct SymbolTable {
    inner: RwLock<TableInner>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the symbol set for one file. Symbols present in the previous
    /// parse but absent from `symbols` are tombstoned: removed from the
    /// table, with every relationship referencing them dropped so the graph
    /// never holds a dangling edge.
    pub fn apply_file_parse(&self, file_path: &str, symbols: Vec<Symbol>) -> ApplyOutcome {
        let mut inner = self.inner.write();
        let mut outcome = ApplyOutcome::default();

        let previous: Vec<String> = inner
            .by_file
            .get(file_path)
            .cloned()
            .unwrap_or_default();

        let new_ids: std::collections::HashSet<String> =
            symbols.iter().map(|s| s.id.clone()).collect();

        for old_id in &previous {
            if !new_ids.contains(old_id) {
                outcome.tombstoned.push(old_id.clone());
            }
        }

        for id in &outcome.tombstoned {
            if let Some(sym) = inner.symbols.remove(id) {
                if let Some(ids) = inner.by_qualified_name.get_mut(&sym.qualified_name) {
                    ids.retain(|i| i != id);
                    if ids.is_empty() {
                        inner.by_qualified_name.remove(&sym.qualified_name);
                    }
                }
            }
        }

        if !outcome.tombstoned.is_empty() {
            let before = inner.relationships.len();
            let gone: std::collections::HashSet<&String> = outcome.tombstoned.iter().collect();
            inner
                .relationships
                .retain(|(from, to, _), _| !gone.contains(from) && !gone.contains(to));
            outcome.dropped_relationships = before - inner.relationships.len();
            debug!(
                file = file_path,
                tombstoned = outcome.tombstoned.len(),
                dropped_edges = outcome.dropped_relationships,
                "Tombstoned symbols absent from latest parse"
            );
        }

        let mut file_ids = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let id = symbol.id.clone();
            if inner.symbols.contains_key(&id) {
                outcome.replaced += 1;
            } else {
                outcome.inserted += 1;
                inner
                    .by_qualified_name
                    .entry(symbol.qualified_name.clone())
                    .or_default()
                    .push(id.clone());
            }
            inner.symbols.insert(id.clone(), symbol);
            file_ids.push(id);
        }
        inner.by_file.insert(file_path.to_string(), file_ids);

        outcome
    }

    /// Remove everything owned by a deleted file, cascading to its edges.
    pub fn remove_file(&self, file_path: &str) -> ApplyOutcome {
        self.apply_file_parse(file_path, Vec::new())
    }

    /// Add a relationship, deduplicating by `(from, to, kind)`. A later,
    /// weaker observation never lowers a previously recorded confidence.
    pub fn add_relationship(&self, rel: Relationship) {
        let mut inner = self.inner.write();
        let key = (
            rel.from_symbol_id.clone(),
            rel.to_symbol_id.clone(),
            rel.kind,
        );
        match inner.relationships.get_mut(&key) {
            Some(existing) => {
                if rel.confidence > existing.confidence {
                    existing.confidence = rel.confidence;
                    existing.source_line = rel.source_line.or(existing.source_line);
                }
            }
            None => {
                inner.relationships.insert(key, rel);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Symbol> {
        self.inner.read().symbols.get(id).cloned()
    }

    /// All symbols whose qualified name matches exactly.
    pub fn find_exact(&self, qualified_name: &str) -> Vec<Symbol> {
        let inner = self.inner.read();
        inner
            .by_qualified_name
            .get(qualified_name)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.symbols.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Symbols whose qualified name ends with `::name` / `.name` or equals it.
    pub fn find_by_name_suffix(&self, name: &str) -> Vec<Symbol> {
        let inner = self.inner.read();
        inner
            .symbols
            .values()
            .filter(|s| {
                s.qualified_name == name
                    || s.qualified_name.ends_with(&format!("::{}", name))
                    || s.qualified_name.ends_with(&format!(".{}", name))
            })
            .cloned()
            .collect()
    }

    /// Methods declared under the given class scope (`Ns::Class` or `Class`).
    pub fn methods_of_class(&self, class_scope: &str) -> Vec<Symbol> {
        let inner = self.inner.read();
        inner
            .symbols
            .values()
            .filter(|s| {
                s.kind == SymbolKind::Method
                    && (s.qualified_name.starts_with(&format!("{}::", class_scope))
                        || s.qualified_name.starts_with(&format!("{}.", class_scope))
                        || s.parent_class.as_deref() == Some(class_scope))
            })
            .cloned()
            .collect()
    }

    /// Free functions living directly in the given namespace.
    pub fn functions_in_namespace(&self, namespace: &str) -> Vec<Symbol> {
        let inner = self.inner.read();
        inner
            .symbols
            .values()
            .filter(|s| {
                s.kind == SymbolKind::Function && s.namespace.as_deref() == Some(namespace)
            })
            .cloned()
            .collect()
    }

    pub fn callables(&self) -> Vec<Symbol> {
        let inner = self.inner.read();
        inner
            .symbols
            .values()
            .filter(|s| s.is_callable())
            .cloned()
            .collect()
    }

    pub fn symbols_in_file(&self, file_path: &str) -> Vec<Symbol> {
        let inner = self.inner.read();
        inner
            .by_file
            .get(file_path)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.symbols.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.inner.read().relationships.values().cloned().collect()
    }

    pub fn symbol_count(&self) -> usize {
        self.inner.read().symbols.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner.read().relationships.len()
    }
}
