// Call-target resolution pipeline
//
// Priority-ordered strategies over a read-only symbol table view. First
// strategy to produce a candidate wins; an unresolved site is dropped by
// the caller, never retried within a pass.

pub mod strategies;

use std::sync::Arc;

use tracing::trace;

use crate::graph::table::SymbolTable;
use crate::graph::{CallSite, Relationship, Symbol, SymbolKind};

/// Outcome of resolving one call site.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub symbol_id: String,
    pub strategy: &'static str,
    pub confidence: f32,
    pub reason: String,
}

impl Resolution {
    /// Both endpoints of an edge must be real symbol ids, or the tombstone
    /// cascade could never drop it. The caller's id is looked up by the
    /// orchestrator; the name as written survives in metadata.
    pub fn into_relationship(self, site: &CallSite, from_symbol_id: String) -> Relationship {
        let mut metadata = site.metadata.clone();
        metadata.insert("resolved_by".to_string(), self.strategy.to_string());
        metadata.insert("from_name".to_string(), site.from_name.clone());
        Relationship {
            from_symbol_id,
            to_symbol_id: self.symbol_id,
            kind: site.kind,
            confidence: self.confidence,
            source_line: Some(site.source_line),
            metadata,
        }
    }
}

/// Ephemeral per-site view: the caller's qualified name decomposed into
/// namespace / class / function segments, plus the target as written.
pub struct ResolutionContext<'a> {
    pub site: &'a CallSite,
    pub target: &'a str,
    pub caller_name: String,
    pub caller_class: Option<String>,
    pub caller_namespace: Option<String>,
    pub table: &'a SymbolTable,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(site: &'a CallSite, table: &'a SymbolTable) -> Self {
        let from = site.from_name.as_str();
        let separator = if from.contains("::") { "::" } else { "." };
        let segments: Vec<&str> = from.split(separator).collect();

        let caller_name = segments.last().map(|s| s.to_string()).unwrap_or_default();
        let prefix = &segments[..segments.len().saturating_sub(1)];

        let (caller_class, caller_namespace) = match prefix.split_last() {
            None => (None, None),
            Some((last, rest)) => {
                let looks_like_class = table
                    .find_by_name_suffix(last)
                    .iter()
                    .any(|s| {
                        matches!(
                            s.kind,
                            SymbolKind::Class | SymbolKind::Struct | SymbolKind::Interface
                        )
                    })
                    || last.chars().next().is_some_and(|c| c.is_uppercase());
                if looks_like_class {
                    let namespace = if rest.is_empty() {
                        None
                    } else {
                        Some(rest.join(separator))
                    };
                    (Some(last.to_string()), namespace)
                } else {
                    (None, Some(prefix.join(separator)))
                }
            }
        };

        Self {
            site,
            target: site.to_name.as_str(),
            caller_name,
            caller_class,
            caller_namespace,
            table,
        }
    }

    /// Class scope the caller's class lives in, namespace-qualified when
    /// the caller gives one (`engine::Engine`).
    pub fn caller_class_scope(&self) -> Option<String> {
        let class = self.caller_class.as_deref()?;
        Some(match &self.caller_namespace {
            Some(ns) => {
                let separator = if self.site.from_name.contains("::") {
                    "::"
                } else {
                    "."
                };
                format!("{}{}{}", ns, separator, class)
            }
            None => class.to_string(),
        })
    }

    /// A method calling its own name within its own class is never
    /// resolved to itself.
    pub fn is_self_reference(&self, candidate: &Symbol) -> bool {
        candidate.name == self.caller_name
            && candidate.parent_class.as_deref() == self.caller_class.as_deref()
            && self.caller_class.is_some()
    }
}

/// One pluggable resolution strategy.
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    /// Higher runs earlier.
    fn priority(&self) -> u32;
    fn can_resolve(&self, ctx: &ResolutionContext) -> bool;
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution>;
}

/// The ordered strategy set. Custom strategies register at runtime and
/// slot into the order by priority; the first-match contract is kept.
pub struct ResolutionPipeline {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl ResolutionPipeline {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut pipeline = Self::empty();
        for strategy in strategies::builtins() {
            pipeline.register(strategy);
        }
        pipeline
    }

    pub fn register(&mut self, strategy: Box<dyn ResolutionStrategy>) {
        self.strategies.push(strategy);
        self.strategies
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn resolve(&self, site: &CallSite, table: &Arc<SymbolTable>) -> Option<Resolution> {
        let ctx = ResolutionContext::new(site, table);
        for strategy in &self.strategies {
            if !strategy.can_resolve(&ctx) {
                continue;
            }
            if let Some(resolution) = strategy.resolve(&ctx) {
                // Guard holds pipeline-wide, custom strategies included.
                if let Some(candidate) = table.get(&resolution.symbol_id) {
                    if ctx.is_self_reference(&candidate) {
                        trace!(
                            target_name = %site.to_name,
                            strategy = strategy.name(),
                            "Declined self-reference match"
                        );
                        continue;
                    }
                }
                trace!(
                    from = %site.from_name,
                    to = %site.to_name,
                    strategy = strategy.name(),
                    confidence = resolution.confidence,
                    "Resolved call target"
                );
                return Some(resolution);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_decomposition() {
        let table = SymbolTable::new();
        let site = CallSite::call("engine::Engine::start", "loadAssets", 10);
        let ctx = ResolutionContext::new(&site, &table);

        assert_eq!(ctx.caller_name, "start");
        assert_eq!(ctx.caller_class.as_deref(), Some("Engine"));
        assert_eq!(ctx.caller_namespace.as_deref(), Some("engine"));
        assert_eq!(ctx.caller_class_scope().as_deref(), Some("engine::Engine"));
    }

    #[test]
    fn test_context_free_function_caller() {
        let table = SymbolTable::new();
        let site = CallSite::call("main", "run", 3);
        let ctx = ResolutionContext::new(&site, &table);

        assert_eq!(ctx.caller_name, "main");
        assert!(ctx.caller_class.is_none());
        assert!(ctx.caller_namespace.is_none());
    }

    #[test]
    fn test_register_keeps_priority_order() {
        struct Named(&'static str, u32);
        impl ResolutionStrategy for Named {
            fn name(&self) -> &'static str {
                self.0
            }
            fn priority(&self) -> u32 {
                self.1
            }
            fn can_resolve(&self, _: &ResolutionContext) -> bool {
                false
            }
            fn resolve(&self, _: &ResolutionContext) -> Option<Resolution> {
                None
            }
        }

        let mut pipeline = ResolutionPipeline::empty();
        pipeline.register(Box::new(Named("low", 10)));
        pipeline.register(Box::new(Named("high", 95)));
        pipeline.register(Box::new(Named("mid", 50)));
        assert_eq!(pipeline.strategy_names(), vec!["high", "mid", "low"]);
    }
}
