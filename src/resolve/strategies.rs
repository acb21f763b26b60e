// Built-in resolution strategies, in priority order.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::graph::{Symbol, SymbolKind};

use super::{Resolution, ResolutionContext, ResolutionStrategy};

pub fn builtins() -> Vec<Box<dyn ResolutionStrategy>> {
    vec![
        Box::new(ExactMatch),
        Box::new(SameClassMethod),
        Box::new(ConstructorPattern),
        Box::new(SameNamespaceFunction),
        Box::new(ImplicitThisMethod),
        Box::new(StdlibPattern),
        Box::new(GlobalFuzzy),
        Box::new(CrossLanguageService),
    ]
}

fn is_qualified(target: &str) -> bool {
    target.contains("::") || target.contains('.')
}

fn split_qualifier(target: &str) -> Option<(&str, &str)> {
    if let Some(pos) = target.rfind("::") {
        return Some((&target[..pos], &target[pos + 2..]));
    }
    target.rfind('.').map(|pos| (&target[..pos], &target[pos + 1..]))
}

/// Priority 100: the target, as written, is a known qualified name.
struct ExactMatch;

impl ResolutionStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }
    fn priority(&self) -> u32 {
        100
    }
    fn can_resolve(&self, _ctx: &ResolutionContext) -> bool {
        true
    }
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution> {
        ctx.table
            .find_exact(ctx.target)
            .into_iter()
            .find(|s| s.is_callable())
            .map(|s| Resolution {
                symbol_id: s.id,
                strategy: "exact",
                confidence: 1.0,
                reason: "exact qualified-name match".to_string(),
            })
    }
}

/// Priority 90: explicitly class-qualified or this/self-qualified target
/// resolving to a method of that class.
struct SameClassMethod;

impl ResolutionStrategy for SameClassMethod {
    fn name(&self) -> &'static str {
        "same-class"
    }
    fn priority(&self) -> u32 {
        90
    }
    fn can_resolve(&self, ctx: &ResolutionContext) -> bool {
        is_qualified(ctx.target)
            || ctx.target.starts_with("this->")
            || ctx.target.starts_with("self.")
    }
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution> {
        let (class_scope, class_name, method) = if let Some(rest) = ctx
            .target
            .strip_prefix("this->")
            .or_else(|| ctx.target.strip_prefix("this."))
            .or_else(|| ctx.target.strip_prefix("self."))
        {
            (ctx.caller_class_scope()?, ctx.caller_class.clone()?, rest)
        } else {
            let (class_part, method) = split_qualifier(ctx.target)?;
            let name = class_part.rsplit("::").next().unwrap_or(class_part);
            let name = name.rsplit('.').next().unwrap_or(name);
            (class_part.to_string(), name.to_string(), method)
        };

        // The qualifier must actually name the candidate's class. Without
        // this a namespace qualifier like `engine::` could bind to any
        // method of a class living inside that namespace.
        ctx.table
            .methods_of_class(&class_scope)
            .into_iter()
            .find(|s| {
                s.name == method
                    && s.parent_class.as_deref() == Some(class_name.as_str())
                    && !ctx.is_self_reference(s)
            })
            .map(|s| Resolution {
                symbol_id: s.id,
                strategy: "same-class",
                confidence: 0.90,
                reason: format!("method of class {}", class_scope),
            })
    }
}

/// Priority 85: target names a known class, so the call constructs it.
struct ConstructorPattern;

impl ResolutionStrategy for ConstructorPattern {
    fn name(&self) -> &'static str {
        "constructor"
    }
    fn priority(&self) -> u32 {
        85
    }
    fn can_resolve(&self, ctx: &ResolutionContext) -> bool {
        !is_qualified(ctx.target)
            && ctx.target.chars().next().is_some_and(|c| c.is_uppercase())
    }
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution> {
        let class = ctx
            .table
            .find_by_name_suffix(ctx.target)
            .into_iter()
            .find(|s| {
                matches!(s.kind, SymbolKind::Class | SymbolKind::Struct) && s.name == ctx.target
            })?;

        // Prefer the explicit constructor method when the parse found one.
        let target = ctx
            .table
            .methods_of_class(&class.qualified_name)
            .into_iter()
            .find(|m| m.name == class.name)
            .unwrap_or(class);

        Some(Resolution {
            symbol_id: target.id,
            strategy: "constructor",
            confidence: 0.85,
            reason: "target names a known class".to_string(),
        })
    }
}

/// Priority 80: free function in the caller's namespace.
struct SameNamespaceFunction;

impl ResolutionStrategy for SameNamespaceFunction {
    fn name(&self) -> &'static str {
        "same-namespace"
    }
    fn priority(&self) -> u32 {
        80
    }
    fn can_resolve(&self, ctx: &ResolutionContext) -> bool {
        ctx.caller_namespace.is_some() && !is_qualified(ctx.target)
    }
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution> {
        let namespace = ctx.caller_namespace.as_deref()?;
        ctx.table
            .functions_in_namespace(namespace)
            .into_iter()
            .find(|s| s.name == ctx.target)
            .map(|s| Resolution {
                symbol_id: s.id,
                strategy: "same-namespace",
                confidence: 0.80,
                reason: format!("function in namespace {}", namespace),
            })
    }
}

/// Priority 75: bare name resolving to a method of the caller's own class.
struct ImplicitThisMethod;

impl ResolutionStrategy for ImplicitThisMethod {
    fn name(&self) -> &'static str {
        "implicit-this"
    }
    fn priority(&self) -> u32 {
        75
    }
    fn can_resolve(&self, ctx: &ResolutionContext) -> bool {
        ctx.caller_class.is_some() && !is_qualified(ctx.target)
    }
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution> {
        let scope = ctx.caller_class_scope()?;
        let mut candidates = ctx.table.methods_of_class(&scope);
        if candidates.is_empty() {
            if let Some(class) = ctx.caller_class.as_deref() {
                candidates = ctx.table.methods_of_class(class);
            }
        }
        candidates
            .into_iter()
            .find(|s| s.name == ctx.target && !ctx.is_self_reference(s))
            .map(|s| Resolution {
                symbol_id: s.id,
                strategy: "implicit-this",
                confidence: 0.75,
                reason: format!("method of enclosing class {}", scope),
            })
    }
}

static STDLIB_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "printf", "sprintf", "malloc", "free", "memcpy", "memset", "strlen", "strcmp",
        "push_back", "emplace_back", "size", "begin", "end", "find", "insert", "erase",
        "clear", "empty", "at", "get", "make_shared", "make_unique", "move", "swap",
        "print", "len", "range", "open", "append", "join", "split", "format", "isinstance",
        "println", "sort", "reverse", "min", "max", "abs",
    ]
    .into_iter()
    .collect()
});

/// Priority 70: well-known standard-library names. These resolve to a
/// synthetic id outside the table so call counts stay meaningful without
/// polluting the symbol set.
struct StdlibPattern;

impl ResolutionStrategy for StdlibPattern {
    fn name(&self) -> &'static str {
        "stdlib"
    }
    fn priority(&self) -> u32 {
        70
    }
    fn can_resolve(&self, ctx: &ResolutionContext) -> bool {
        let base = ctx.target.rsplit("::").next().unwrap_or(ctx.target);
        ctx.target.starts_with("std::") || STDLIB_NAMES.contains(base)
    }
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution> {
        let base = ctx.target.rsplit("::").next().unwrap_or(ctx.target);
        Some(Resolution {
            symbol_id: format!("stdlib::{}", base),
            strategy: "stdlib",
            confidence: 0.70,
            reason: "standard-library pattern".to_string(),
        })
    }
}

/// Priority 60: project-wide fuzzy match on the bare name, scaled to at
/// most 0.60 so it never outranks a structural match.
struct GlobalFuzzy;

fn fuzzy_score(symbol: &Symbol, target: &str, base: &str) -> f32 {
    let mut score: f32 = 0.0;
    if symbol.name == base {
        score += 0.45;
    } else {
        score += 0.30;
    }
    if symbol.is_exported {
        score += 0.05;
    }
    if symbol.is_callable() {
        score += 0.10;
    }
    if symbol.qualified_name == target {
        score += 0.10;
    }
    score.min(0.60)
}

impl ResolutionStrategy for GlobalFuzzy {
    fn name(&self) -> &'static str {
        "global-fuzzy"
    }
    fn priority(&self) -> u32 {
        60
    }
    fn can_resolve(&self, _ctx: &ResolutionContext) -> bool {
        true
    }
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution> {
        let base = match split_qualifier(ctx.target) {
            Some((_, method)) => method,
            None => ctx.target,
        };
        if base.is_empty() {
            return None;
        }

        ctx.table
            .find_by_name_suffix(base)
            .into_iter()
            .filter(|s| s.is_callable() && !ctx.is_self_reference(s))
            .map(|s| {
                let score = fuzzy_score(&s, ctx.target, base);
                (s, score)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, score)| Resolution {
                symbol_id: s.id,
                strategy: "global-fuzzy",
                confidence: score,
                reason: "best project-wide name match".to_string(),
            })
    }
}

/// Priority 50: RPC-style cross-language bridging. Tries generated-stub
/// naming variants first, then a normalized substring match.
struct CrossLanguageService;

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

impl CrossLanguageService {
    fn variants(target: &str) -> Vec<String> {
        let base = target
            .strip_suffix("Stub")
            .or_else(|| target.strip_suffix("Client"))
            .unwrap_or(target);

        let mut variants = vec![base.to_string()];
        for suffix in ["Service", "ServiceImpl", "ServiceServicer", "ServiceBase"] {
            variants.push(format!("{}{}", base, suffix));
        }
        if base.ends_with("Service") {
            for suffix in ["Impl", "Servicer", "Base"] {
                variants.push(format!("{}{}", base, suffix));
            }
        }
        variants
    }

    fn service_symbol(ctx: &ResolutionContext, name: &str) -> Option<Symbol> {
        ctx.table.find_by_name_suffix(name).into_iter().find(|s| {
            matches!(
                s.kind,
                SymbolKind::Class | SymbolKind::Struct | SymbolKind::Interface
            ) || s.is_callable()
        })
    }
}

impl ResolutionStrategy for CrossLanguageService {
    fn name(&self) -> &'static str {
        "cross-language"
    }
    fn priority(&self) -> u32 {
        50
    }
    fn can_resolve(&self, ctx: &ResolutionContext) -> bool {
        ctx.site.cross_language
            || ctx.site.metadata.contains_key("service")
            || ctx.target.ends_with("Stub")
            || ctx.target.ends_with("Client")
            || ctx.target.contains("Service")
    }
    fn resolve(&self, ctx: &ResolutionContext) -> Option<Resolution> {
        // A service name recorded by the extraction layer is the most
        // specific signal and is consulted before the target's own name.
        if let Some(service) = ctx.site.metadata.get("service") {
            for variant in Self::variants(service) {
                if let Some(symbol) = Self::service_symbol(ctx, &variant) {
                    return Some(Resolution {
                        symbol_id: symbol.id,
                        strategy: "cross-language",
                        confidence: 0.90,
                        reason: format!("declared service {}", service),
                    });
                }
            }
        }

        for variant in Self::variants(ctx.target) {
            if let Some(symbol) = Self::service_symbol(ctx, &variant) {
                return Some(Resolution {
                    symbol_id: symbol.id,
                    strategy: "cross-language",
                    confidence: 0.90,
                    reason: format!("service naming variant {}", variant),
                });
            }
        }

        // Normalized fuzzy: case- and separator-insensitive substring.
        let needle = normalize(ctx.target);
        if needle.len() >= 4 {
            let candidate = ctx.table.callables().into_iter().find(|s| {
                let hay = normalize(&s.qualified_name);
                hay.contains(&needle) || needle.contains(&hay)
            });
            if let Some(symbol) = candidate {
                return Some(Resolution {
                    symbol_id: symbol.id,
                    strategy: "cross-language",
                    confidence: 0.70,
                    reason: "normalized cross-language name match".to_string(),
                });
            }
        }

        // Last resort: the bare name once the stub/client suffix is gone.
        let base = ctx
            .target
            .strip_suffix("Stub")
            .or_else(|| ctx.target.strip_suffix("Client"))?;
        ctx.table
            .find_by_name_suffix(base)
            .into_iter()
            .next()
            .map(|s| Resolution {
                symbol_id: s.id,
                strategy: "cross-language",
                confidence: 0.60,
                reason: "stub suffix stripped".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::table::SymbolTable;
    use crate::graph::CallSite;
    use crate::resolve::ResolutionPipeline;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn symbol(qualified_name: &str, file: &str, kind: SymbolKind) -> Symbol {
        let separator = if qualified_name.contains("::") { "::" } else { "." };
        let name = qualified_name
            .rsplit(separator)
            .next()
            .unwrap_or(qualified_name)
            .to_string();
        Symbol {
            id: Symbol::derive_id(qualified_name, file, kind),
            name,
            qualified_name: qualified_name.to_string(),
            kind,
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

    fn method(qualified_name: &str, file: &str, class: &str) -> Symbol {
        let mut s = symbol(qualified_name, file, SymbolKind::Method);
        s.parent_class = Some(class.to_string());
        s
    }

    fn table_with(symbols: Vec<(&'static str, Vec<Symbol>)>) -> Arc<SymbolTable> {
        let table = SymbolTable::new();
        for (file, syms) in symbols {
            table.apply_file_parse(file, syms);
        }
        Arc::new(table)
    }

    #[test]
    fn test_exact_beats_fuzzy_at_full_confidence() {
        let table = table_with(vec![(
            "engine.cpp",
            vec![symbol("engine::render", "engine.cpp", SymbolKind::Function)],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        let site = CallSite::call("main", "engine::render", 5);
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "exact");
        assert!((resolution.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_implicit_this_at_point_seventy_five() {
        let table = table_with(vec![(
            "shapes.cpp",
            vec![
                symbol("Shape", "shapes.cpp", SymbolKind::Class),
                symbol("Circle", "shapes.cpp", SymbolKind::Class),
                method("Shape::draw", "shapes.cpp", "Shape"),
                method("Circle::draw", "shapes.cpp", "Circle"),
                method("Circle::render", "shapes.cpp", "Circle"),
            ],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        // Bare `draw()` inside Circle::render resolves to Circle's own draw.
        let site = CallSite::call("Circle::render", "draw", 12);
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "implicit-this");
        assert!((resolution.confidence - 0.75).abs() < f32::EPSILON);
        let resolved = table.get(&resolution.symbol_id).unwrap();
        assert_eq!(resolved.qualified_name, "Circle::draw");
    }

    #[test]
    fn test_self_reference_always_declined() {
        let table = table_with(vec![(
            "shapes.cpp",
            vec![
                symbol("Circle", "shapes.cpp", SymbolKind::Class),
                method("Circle::draw", "shapes.cpp", "Circle"),
            ],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        let site = CallSite::call("Circle::draw", "draw", 8);
        assert!(pipeline.resolve(&site, &table).is_none());
    }

    #[test]
    fn test_explicit_class_qualified_target() {
        let table = table_with(vec![(
            "engine.cpp",
            vec![method("engine::Engine::stop", "engine.cpp", "Engine")],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        let site = CallSite::call("engine::Engine::start", "Engine::stop", 20);
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "same-class");
        assert!((resolution.confidence - 0.90).abs() < f32::EPSILON);
    }

    #[test]
    fn test_constructor_pattern() {
        let table = table_with(vec![(
            "planet.cpp",
            vec![
                symbol("Planet", "planet.cpp", SymbolKind::Class),
                method("Planet::Planet", "planet.cpp", "Planet"),
            ],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        let site = CallSite::call("main", "Planet", 4);
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "constructor");
        assert!((resolution.confidence - 0.85).abs() < f32::EPSILON);
        let resolved = table.get(&resolution.symbol_id).unwrap();
        assert_eq!(resolved.qualified_name, "Planet::Planet");
    }

    #[test]
    fn test_same_namespace_function() {
        let mut init = symbol("engine::init", "engine.cpp", SymbolKind::Function);
        init.namespace = Some("engine".to_string());
        let mut run = symbol("engine::run", "engine.cpp", SymbolKind::Function);
        run.namespace = Some("engine".to_string());

        let table = table_with(vec![("engine.cpp", vec![init, run])]);
        let pipeline = ResolutionPipeline::with_builtins();

        let site = CallSite::call("engine::run", "init", 7);
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "same-namespace");
        assert!((resolution.confidence - 0.80).abs() < f32::EPSILON);
    }

    #[test]
    fn test_stdlib_pattern() {
        let table = Arc::new(SymbolTable::new());
        let pipeline = ResolutionPipeline::with_builtins();

        let site = CallSite::call("main", "printf", 2);
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "stdlib");
        assert_eq!(resolution.symbol_id, "stdlib::printf");
        assert!((resolution.confidence - 0.70).abs() < f32::EPSILON);
    }

    #[test]
    fn test_global_fuzzy_capped() {
        let table = table_with(vec![(
            "utils.py",
            vec![symbol("utils.compute_totals", "utils.py", SymbolKind::Function)],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        let site = CallSite::call("main", "compute_totals", 9);
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "global-fuzzy");
        assert!(resolution.confidence <= 0.60);
    }

    #[test]
    fn test_cross_language_servicer_variant() {
        let table = table_with(vec![(
            "user_service.py",
            vec![symbol("UserServiceServicer", "user_service.py", SymbolKind::Class)],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        let mut site = CallSite::call("client::Session::login", "UserServiceStub", 31);
        site.cross_language = true;
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "cross-language");
        assert!((resolution.confidence - 0.90).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cross_language_metadata_service_hint() {
        let table = table_with(vec![(
            "user_service.py",
            vec![symbol("UserServiceServicer", "user_service.py", SymbolKind::Class)],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        // The call target carries no service naming of its own; the
        // extraction layer recorded which service the channel was built
        // for, and that hint wins.
        let mut site = CallSite::call("client::Session::login", "fetch_profile", 40);
        site.cross_language = true;
        site.metadata
            .insert("service".to_string(), "UserService".to_string());
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "cross-language");
        assert!((resolution.confidence - 0.90).abs() < f32::EPSILON);
        let resolved = table.get(&resolution.symbol_id).unwrap();
        assert_eq!(resolved.qualified_name, "UserServiceServicer");
    }

    #[test]
    fn test_namespace_qualifier_not_bound_as_class() {
        let table = table_with(vec![(
            "engine.cpp",
            vec![method("engine::Engine::start", "engine.cpp", "Engine")],
        )]);
        let pipeline = ResolutionPipeline::with_builtins();

        // `engine` is a namespace, not a class: the 0.90 class binding
        // must not fire, leaving only the capped project-wide match.
        let site = CallSite::call("main", "engine::start", 15);
        let resolution = pipeline.resolve(&site, &table).unwrap();
        assert_eq!(resolution.strategy, "global-fuzzy");
        assert!(resolution.confidence <= 0.60);
    }

    #[test]
    fn test_unresolved_returns_none() {
        let table = Arc::new(SymbolTable::new());
        let pipeline = ResolutionPipeline::with_builtins();

        let site = CallSite::call("main", "no_such_symbol_anywhere", 1);
        assert!(pipeline.resolve(&site, &table).is_none());
    }
}
