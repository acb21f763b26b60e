// External-tool strategy backed by universal-ctags
//
// Highest-accuracy tier. Availability is probed once at startup; when the
// tool is missing the orchestrator simply routes around this tier. The
// child process is polled and killed past the configured timeout so a
// wedged tool never stalls an indexing pass.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    detect_name_patterns, Language, ParseResult, ParseStrategy, StrategyCapabilities,
    StrategyError, StrategyTier, SUPPORTED_EXTENSIONS,
};
use crate::graph::{Symbol, SymbolKind};

/// One tag line from `ctags --output-format=json`.
#[derive(Debug, Deserialize)]
struct CtagsTag {
    #[serde(rename = "_type")]
    entry_type: String,
    name: String,
    line: Option<u32>,
    end: Option<u32>,
    kind: Option<String>,
    scope: Option<String>,
    #[serde(rename = "scopeKind")]
    scope_kind: Option<String>,
    typeref: Option<String>,
}

/// Universal-ctags parse strategy.
pub struct ExternalStrategy {
    tool: String,
    timeout: Duration,
}

impl ExternalStrategy {
    pub fn with_tool(tool: &str, timeout: Duration) -> Self {
        Self {
            tool: tool.to_string(),
            timeout,
        }
    }

    /// Run the tool on one file, enforcing the timeout by polling the
    /// child and killing it when the budget runs out.
    fn run_tool(&self, path: &str) -> Result<String, StrategyError> {
        let mut child = Command::new(&self.tool)
            .args([
                "--output-format=json",
                "--fields=+neKSt",
                "--sort=no",
                "-f",
                "-",
                path,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|_| StrategyError::Unavailable {
                tool: self.tool.clone(),
            })?;

        // Drain stdout on a helper thread so a full pipe never blocks the
        // child while we poll for exit.
        let reader = child.stdout.take().map(|mut stdout| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stdout.read_to_string(&mut buf);
                buf
            })
        });

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(_status)) => break,
                Ok(None) => {
                    if started.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(StrategyError::Timeout {
                            tool: self.tool.clone(),
                            seconds: self.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
                Err(e) => {
                    return Err(StrategyError::Io {
                        path: path.to_string(),
                        source: e,
                    })
                }
            }
        }

        let output = reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        Ok(output)
    }
}

impl ParseStrategy for ExternalStrategy {
    fn capabilities(&self) -> StrategyCapabilities {
        StrategyCapabilities {
            name: "external",
            tier: StrategyTier::External,
            extensions: SUPPORTED_EXTENSIONS,
            features: &["symbols", "scopes", "patterns", "return-types"],
        }
    }

    fn initialize(&self, _project_root: &Path) -> Result<(), StrategyError> {
        let probe = Command::new(&self.tool)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output();
        match probe {
            Ok(out) if out.status.success() => {
                debug!(tool = %self.tool, "External tag tool available");
                Ok(())
            }
            _ => {
                warn!(tool = %self.tool, "External tag tool not found, tier disabled");
                Err(StrategyError::Unavailable {
                    tool: self.tool.clone(),
                })
            }
        }
    }

    fn parse_file(&self, path: &str, _content: &str) -> Result<ParseResult, StrategyError> {
        let start = Instant::now();
        let output = self.run_tool(path)?;

        let language = Language::from_path(path);
        let mut result = ParseResult {
            file_path: path.to_string(),
            strategy: "external".to_string(),
            ..Default::default()
        };

        for line in output.lines() {
            let tag: CtagsTag = match serde_json::from_str(line) {
                Ok(tag) => tag,
                Err(_) => continue,
            };
            if tag.entry_type != "tag" {
                continue;
            }
            if let Some(symbol) = symbol_from_tag(&tag, path, language) {
                if let Some(class) = &symbol.parent_class {
                    if symbol.name == *class {
                        result.special_form_count += 1;
                    }
                }
                result.patterns.extend(detect_name_patterns(
                    &symbol.name,
                    path,
                    symbol.line,
                    1.0,
                ));
                result.symbols.push(symbol);
            }
        }

        result.parse_duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}

fn map_kind(kind: &str, scope_kind: Option<&str>) -> Option<SymbolKind> {
    let in_type = matches!(scope_kind, Some("class" | "struct" | "interface"));
    match kind {
        "function" => Some(if in_type {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        }),
        "method" | "member" if scope_kind.is_some() => Some(SymbolKind::Method),
        "member" => Some(SymbolKind::Field),
        "class" => Some(SymbolKind::Class),
        "struct" => Some(SymbolKind::Struct),
        "interface" | "trait" => Some(SymbolKind::Interface),
        "namespace" | "package" | "module" => Some(SymbolKind::Namespace),
        "variable" => Some(SymbolKind::Variable),
        "constant" | "enumerator" => Some(SymbolKind::Constant),
        _ => None,
    }
}

fn symbol_from_tag(tag: &CtagsTag, path: &str, language: Option<Language>) -> Option<Symbol> {
    let kind = map_kind(tag.kind.as_deref()?, tag.scope_kind.as_deref())?;
    let separator = language.map(|l| l.separator()).unwrap_or("::");

    let qualified_name = match &tag.scope {
        Some(scope) => format!("{}{}{}", scope, separator, tag.name),
        None => tag.name.clone(),
    };
    let line = tag.line.unwrap_or(1);

    let namespace = match tag.scope_kind.as_deref() {
        Some("namespace" | "package" | "module") => tag.scope.clone(),
        _ => None,
    };
    let parent_class = match tag.scope_kind.as_deref() {
        Some("class" | "struct" | "interface") => tag
            .scope
            .as_deref()
            .map(|s| s.rsplit("::").next().unwrap_or(s).to_string()),
        _ => None,
    };
    let return_type = tag
        .typeref
        .as_deref()
        .map(|t| t.strip_prefix("typename:").unwrap_or(t).to_string());

    Some(Symbol {
        id: Symbol::derive_id(&qualified_name, path, kind),
        name: tag.name.clone(),
        qualified_name,
        kind,
        file_path: path.to_string(),
        line,
        end_line: tag.end.unwrap_or(line),
        namespace,
        parent_class,
        return_type,
        is_exported: !tag.name.starts_with('_'),
        is_template: false,
        confidence: 1.0,
        semantic_tags: BTreeSet::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_to_symbol_mapping() {
        let line = r#"{"_type":"tag","name":"start","path":"Engine.cpp","line":12,"end":18,"kind":"function","scope":"engine::Engine","scopeKind":"class","typeref":"typename:void"}"#;
        let tag: CtagsTag = serde_json::from_str(line).unwrap();
        let symbol = symbol_from_tag(&tag, "Engine.cpp", Some(Language::Cpp)).unwrap();

        assert_eq!(symbol.kind, SymbolKind::Method);
        assert_eq!(symbol.qualified_name, "engine::Engine::start");
        assert_eq!(symbol.parent_class.as_deref(), Some("Engine"));
        assert_eq!(symbol.return_type.as_deref(), Some("void"));
        assert_eq!(symbol.line, 12);
        assert_eq!(symbol.end_line, 18);
        assert!((symbol.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_namespace_scope_recorded() {
        let line = r#"{"_type":"tag","name":"shutdown","path":"core.py","line":4,"kind":"function","scope":"core","scopeKind":"module"}"#;
        let tag: CtagsTag = serde_json::from_str(line).unwrap();
        let symbol = symbol_from_tag(&tag, "core.py", Some(Language::Python)).unwrap();

        assert_eq!(symbol.kind, SymbolKind::Function);
        assert_eq!(symbol.qualified_name, "core.shutdown");
        assert_eq!(symbol.namespace.as_deref(), Some("core"));
        assert!(symbol.parent_class.is_none());
    }

    #[test]
    fn test_unmapped_kind_skipped() {
        let line = r#"{"_type":"tag","name":"L1","path":"a.cpp","line":9,"kind":"label"}"#;
        let tag: CtagsTag = serde_json::from_str(line).unwrap();
        assert!(symbol_from_tag(&tag, "a.cpp", Some(Language::Cpp)).is_none());
    }

    #[test]
    fn test_missing_tool_reports_unavailable() {
        let strategy =
            ExternalStrategy::with_tool("definitely-not-a-real-tool", Duration::from_secs(1));
        let err = strategy.initialize(Path::new(".")).unwrap_err();
        assert!(matches!(err, StrategyError::Unavailable { .. }));
    }

    #[test]
    fn test_non_tag_lines_ignored() {
        let line = r#"{"_type":"ptag","name":"!_TAG_PROGRAM_NAME","path":"ctags"}"#;
        let tag: CtagsTag = serde_json::from_str(line).unwrap();
        assert_eq!(tag.entry_type, "ptag");
    }
}
