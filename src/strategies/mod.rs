// Parse strategy interface and shared result types

pub mod external;
pub mod line;
pub mod tree;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::confidence::ParseEvidence;
use crate::graph::{CallSite, PatternHit, Symbol};

/// The fixed three-tier ordering the orchestrator routes across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyTier {
    /// External-tool-backed, highest accuracy, may be unavailable.
    External,
    /// Syntax-tree-based, moderate accuracy and cost.
    Tree,
    /// Line/regex-based, never fails on UTF-8 text, any file size.
    Line,
}

impl StrategyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyTier::External => "external",
            StrategyTier::Tree => "tree",
            StrategyTier::Line => "line",
        }
    }
}

/// Static capability declaration for a parse strategy.
#[derive(Debug, Clone)]
pub struct StrategyCapabilities {
    pub name: &'static str,
    pub tier: StrategyTier,
    pub extensions: &'static [&'static str],
    pub features: &'static [&'static str],
}

impl StrategyCapabilities {
    pub fn supports_extension(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }
}

/// Errors a single strategy can raise on a single file. The orchestrator
/// consumes these by falling through to the next tier or to preserved
/// data; only total failure escapes it.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{path}: input too large for this strategy ({bytes} bytes)")]
    TooLarge { path: String, bytes: usize },

    #[error("external tool '{tool}' is not available")]
    Unavailable { tool: String },

    #[error("external tool '{tool}' timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("{path}: {message}")]
    Syntax { path: String, message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StrategyError {
    /// Failures the routing policy treats as "attributable to input size".
    pub fn is_size_related(&self) -> bool {
        matches!(self, StrategyError::TooLarge { .. })
    }
}

/// Draft output of one strategy for one file, before the orchestrator
/// merges patterns and scores confidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub file_path: String,
    pub strategy: String,
    pub symbols: Vec<Symbol>,
    pub call_sites: Vec<CallSite>,
    pub patterns: Vec<PatternHit>,
    /// Constructors, destructors, operators recognized as special forms.
    pub special_form_count: usize,
    pub parse_duration_ms: u64,
}

impl ParseResult {
    pub fn class_count(&self) -> usize {
        self.symbols
            .iter()
            .filter(|s| {
                matches!(
                    s.kind,
                    crate::graph::SymbolKind::Class
                        | crate::graph::SymbolKind::Struct
                        | crate::graph::SymbolKind::Interface
                )
            })
            .count()
    }

    pub fn method_and_class_count(&self) -> usize {
        self.symbols
            .iter()
            .filter(|s| {
                s.is_callable()
                    || matches!(
                        s.kind,
                        crate::graph::SymbolKind::Class | crate::graph::SymbolKind::Struct
                    )
            })
            .count()
    }

    pub fn evidence(&self) -> ParseEvidence {
        ParseEvidence {
            symbol_count: self.symbols.len(),
            class_count: self.class_count(),
            pattern_count: self.patterns.len(),
            special_form_count: self.special_form_count,
            typed_count: self
                .symbols
                .iter()
                .filter(|s| s.return_type.is_some())
                .count(),
        }
    }
}

/// One pluggable parsing backend. New languages and tools are added purely
/// by implementing this; the orchestrator only distinguishes tiers.
pub trait ParseStrategy: Send + Sync {
    fn capabilities(&self) -> StrategyCapabilities;

    /// Called once at startup. A strategy that cannot run in this project
    /// (missing external tool, say) reports it here and is left out of
    /// routing.
    fn initialize(&self, project_root: &Path) -> Result<(), StrategyError>;

    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, StrategyError>;
}

/// Source language, detected by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Cpp,
    Python,
    Rust,
    Go,
    Java,
}

impl Language {
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?;
        match ext {
            "cpp" | "cc" | "cxx" | "h" | "hpp" | "hxx" | "ixx" => Some(Language::Cpp),
            "py" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    /// Separator used in qualified names for this language. The graph layer
    /// itself stays language-agnostic; qualified names are flat strings.
    pub fn separator(&self) -> &'static str {
        match self {
            Language::Cpp | Language::Rust => "::",
            Language::Python | Language::Go | Language::Java => ".",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
        }
    }
}

/// Name-based pattern detection shared by the strategy tiers. Kept in one
/// place so every tier reports the same pattern vocabulary and the
/// orchestrator can union hits across tiers by hash.
pub(crate) fn detect_name_patterns(
    name: &str,
    file_path: &str,
    line: u32,
    confidence: f32,
) -> Vec<PatternHit> {
    let mut hits = Vec::new();
    if name.contains("Factory") || name.contains("Builder") {
        hits.push(PatternHit::new("factory", name, file_path, line, confidence));
    }
    if name == "getInstance" || name == "instance" || name.ends_with("Singleton") {
        hits.push(PatternHit::new("singleton", name, file_path, line, confidence));
    }
    if name.contains("Listener") || name.contains("Observer") || name == "subscribe" || name == "notify" {
        hits.push(PatternHit::new(
            "observer",
            name,
            file_path,
            line,
            confidence - 0.05,
        ));
    }
    if name.ends_with("Service") || name.ends_with("Servicer") || name.ends_with("Stub") {
        hits.push(PatternHit::new("service", name, file_path, line, confidence));
    }
    hits
}

/// Extensions any strategy in the fixed tier set can handle.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "cpp", "cc", "cxx", "h", "hpp", "hxx", "ixx", "py", "rs", "go", "java",
];
