// Symbol graph data model

pub mod table;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A code symbol (function, class, namespace, etc.) extracted from a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub line: u32,
    pub end_line: u32,
    pub namespace: Option<String>,
    pub parent_class: Option<String>,
    pub return_type: Option<String>,
    pub is_exported: bool,
    pub is_template: bool,
    pub confidence: f32,
    pub semantic_tags: BTreeSet<String>,
}

impl Symbol {
    /// Identity is `(qualified_name, file_path, kind)`; the id is derived
    /// from it so re-parsing the same file replaces rather than duplicates.
    pub fn derive_id(qualified_name: &str, file_path: &str, kind: SymbolKind) -> String {
        format!("{}:{}:{}", file_path, qualified_name, kind.as_str())
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, SymbolKind::Function | SymbolKind::Method)
    }
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Namespace,
    Variable,
    Constant,
    Module,
    Field,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Module => "module",
            SymbolKind::Field => "field",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "function" => Ok(SymbolKind::Function),
            "method" => Ok(SymbolKind::Method),
            "class" => Ok(SymbolKind::Class),
            "struct" => Ok(SymbolKind::Struct),
            "interface" => Ok(SymbolKind::Interface),
            "namespace" => Ok(SymbolKind::Namespace),
            "variable" => Ok(SymbolKind::Variable),
            "constant" => Ok(SymbolKind::Constant),
            "module" => Ok(SymbolKind::Module),
            "field" => Ok(SymbolKind::Field),
            _ => anyhow::bail!("Unknown symbol kind: {}", s),
        }
    }
}

/// Relationship between two resolved symbols.
///
/// Deduplicated by `(from, to, kind)`; confidence is the max of all
/// observations for that triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from_symbol_id: String,
    pub to_symbol_id: String,
    pub kind: RelationKind,
    pub confidence: f32,
    pub source_line: Option<u32>,
    pub metadata: BTreeMap<String, String>,
}

/// Relationship kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Calls,
    Inherits,
    Implements,
    Uses,
    Imports,
    Instantiates,
    Overrides,
    References,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Calls => "calls",
            RelationKind::Inherits => "inherits",
            RelationKind::Implements => "implements",
            RelationKind::Uses => "uses",
            RelationKind::Imports => "imports",
            RelationKind::Instantiates => "instantiates",
            RelationKind::Overrides => "overrides",
            RelationKind::References => "references",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "calls" => Ok(RelationKind::Calls),
            "inherits" => Ok(RelationKind::Inherits),
            "implements" => Ok(RelationKind::Implements),
            "uses" => Ok(RelationKind::Uses),
            "imports" => Ok(RelationKind::Imports),
            "instantiates" => Ok(RelationKind::Instantiates),
            "overrides" => Ok(RelationKind::Overrides),
            "references" => Ok(RelationKind::References),
            _ => anyhow::bail!("Unknown relationship kind: {}", s),
        }
    }
}

/// A pattern detection reported by a parse strategy (factory naming,
/// RPC stubs, etc.). Unioned across strategies and deduplicated by `hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternHit {
    pub kind: String,
    pub name: String,
    pub file_path: String,
    pub line: u32,
    pub confidence: f32,
    pub hash: String,
}

impl PatternHit {
    pub fn new(kind: &str, name: &str, file_path: &str, line: u32, confidence: f32) -> Self {
        let hash = blake3::hash(format!("{}|{}|{}", kind, name, file_path).as_bytes())
            .to_hex()
            .to_string();
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            file_path: file_path.to_string(),
            line,
            confidence,
            hash,
        }
    }
}

/// Raw call-site reference produced by the strategy layer, before
/// resolution against the symbol table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    pub from_name: String,
    pub to_name: String,
    pub kind: RelationKind,
    pub cross_language: bool,
    pub source_line: u32,
    pub metadata: BTreeMap<String, String>,
}

impl CallSite {
    pub fn call(from_name: &str, to_name: &str, source_line: u32) -> Self {
        Self {
            from_name: from_name.to_string(),
            to_name: to_name.to_string(),
            kind: RelationKind::Calls,
            cross_language: false,
            source_line,
            metadata: BTreeMap::new(),
        }
    }
}

/// Batch emitted to the downstream persistence layer after a parse or a
/// resolution pass for one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphBatch {
    pub file_path: String,
    pub patterns: Vec<PatternHit>,
    pub relationships: Vec<Relationship>,
    pub removed_symbols: Vec<String>,
}

/// Downstream graph sink. The core does not know the consumer's schema;
/// it only hands over per-file batches.
pub trait GraphSink: Send + Sync {
    fn publish(&self, batch: GraphBatch) -> Result<()>;
}

/// In-memory sink collecting every published batch. Used by the CLI for
/// summary reporting and by tests for assertions.
#[derive(Default)]
pub struct MemorySink {
    batches: parking_lot::Mutex<Vec<GraphBatch>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<GraphBatch> {
        self.batches.lock().clone()
    }
}

impl GraphSink for MemorySink {
    fn publish(&self, batch: GraphBatch) -> Result<()> {
        self.batches.lock().push(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_id_is_stable() {
        let a = Symbol::derive_id("Engine::start", "src/Engine.cpp", SymbolKind::Method);
        let b = Symbol::derive_id("Engine::start", "src/Engine.cpp", SymbolKind::Method);
        assert_eq!(a, b);

        let c = Symbol::derive_id("Engine::start", "src/Engine.cpp", SymbolKind::Function);
        assert_ne!(a, c);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Class,
            SymbolKind::Struct,
            SymbolKind::Interface,
            SymbolKind::Namespace,
            SymbolKind::Variable,
            SymbolKind::Constant,
            SymbolKind::Module,
            SymbolKind::Field,
        ] {
            assert_eq!(SymbolKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(SymbolKind::from_str("widget").is_err());
    }

    #[test]
    fn test_pattern_hash_ignores_line() {
        let a = PatternHit::new("factory", "PlanetFactory", "a.cpp", 10, 0.8);
        let b = PatternHit::new("factory", "PlanetFactory", "a.cpp", 99, 0.6);
        assert_eq!(a.hash, b.hash);

        let c = PatternHit::new("factory", "PlanetFactory", "b.cpp", 10, 0.8);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.publish(GraphBatch {
            file_path: "a.py".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sink.batches()[0].file_path, "a.py");
    }
}
