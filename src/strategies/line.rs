// Line-based fallback parser
//
// The degenerate tier: pure regex over lines, never fails on UTF-8 input,
// no size limit. Shallow on purpose; it exists so that every file yields
// at least a usable draft even when the real parsers cannot run.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    Language, ParseResult, ParseStrategy, StrategyCapabilities, StrategyError, StrategyTier,
    SUPPORTED_EXTENSIONS,
};
use crate::graph::{CallSite, PatternHit, Symbol, SymbolKind};

static RE_NAMESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*namespace\s+([A-Za-z_]\w*)").unwrap());
static RE_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:pub\s+)?(?:template\s*<[^>]*>\s*)?(class|struct|interface|trait)\s+([A-Za-z_]\w*)").unwrap()
});
static RE_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    // def/fn/func keyword forms across the supported languages.
    Regex::new(r"^\s*(?:pub\s+)?(?:async\s+)?(?:def|fn|func)\s+(?:\([^)]*\)\s+)?([A-Za-z_]\w*)\s*\(").unwrap()
});
static RE_CPP_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    // `ReturnType Scope::name(args)` or `ReturnType name(args) {`
    Regex::new(r"^\s*(?:[\w:<>&*~\s]+?\s+)?([A-Za-z_~][\w]*(?:::[A-Za-z_~]\w*)*)\s*\([^;]*\)\s*(?:const\s*)?\{").unwrap()
});
static RE_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:#include\s*[<"]([^>"]+)[>"]|import\s+([\w.]+)|use\s+([\w:]+)|from\s+([\w.]+)\s+import)"#)
        .unwrap()
});
static RE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*(?:(?:::|\.)[A-Za-z_]\w*)*)\s*\(").unwrap());
static RE_TEMPLATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*template\s*<").unwrap());

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "return", "sizeof", "catch", "assert", "match", "new",
    "defer", "super", "print", "static_cast", "dynamic_cast", "reinterpret_cast",
];

/// Line-based parse strategy. Tracks a coarse scope (namespace, class,
/// enclosing function) while walking lines so call sites get a caller name.
pub struct LineStrategy;

impl LineStrategy {
    pub fn new() -> Self {
        Self
    }

    fn is_cross_language_call(target: &str, line_text: &str) -> bool {
        target.ends_with("Stub") || target.ends_with("Client") || target.contains("Service")
            || line_text.contains("grpc") || line_text.contains("rpc.")
    }
}

impl ParseStrategy for LineStrategy {
    fn capabilities(&self) -> StrategyCapabilities {
        StrategyCapabilities {
            name: "line",
            tier: StrategyTier::Line,
            extensions: SUPPORTED_EXTENSIONS,
            features: &["symbols", "call-sites", "patterns", "unbounded-size"],
        }
    }

    fn initialize(&self, _project_root: &Path) -> Result<(), StrategyError> {
        Ok(())
    }

    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, StrategyError> {
        let start = Instant::now();
        let language = Language::from_path(path);
        let separator = language.map(|l| l.separator()).unwrap_or("::");

        let mut symbols = Vec::new();
        let mut call_sites = Vec::new();
        let mut patterns = Vec::new();
        let mut special_form_count = 0usize;

        let mut namespace_stack: Vec<String> = Vec::new();
        let mut current_class: Option<String> = None;
        let mut current_function: Option<String> = None;
        let mut pending_template = false;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = (idx + 1) as u32;
            let line = raw_line.trim_end();
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") || trimmed.starts_with('#') && !trimmed.starts_with("#include") {
                continue;
            }

            if RE_TEMPLATE.is_match(line) {
                pending_template = true;
            }

            if let Some(caps) = RE_NAMESPACE.captures(line) {
                let name = caps[1].to_string();
                let qualified = if namespace_stack.is_empty() {
                    name.clone()
                } else {
                    format!("{}{}{}", namespace_stack.join(separator), separator, name)
                };
                symbols.push(make_symbol(
                    &name,
                    &qualified,
                    SymbolKind::Namespace,
                    path,
                    line_no,
                    None,
                    None,
                    false,
                ));
                namespace_stack.push(name);
                continue;
            }

            if let Some(caps) = RE_CLASS.captures(line) {
                let keyword = &caps[1];
                let name = caps[2].to_string();
                let kind = match keyword {
                    "struct" => SymbolKind::Struct,
                    "interface" | "trait" => SymbolKind::Interface,
                    _ => SymbolKind::Class,
                };
                let qualified = qualify(&namespace_stack, separator, &name);
                let mut sym = make_symbol(
                    &name,
                    &qualified,
                    kind,
                    path,
                    line_no,
                    namespace_stack.last().cloned(),
                    None,
                    pending_template,
                );
                sym.is_exported = !name.starts_with('_');
                patterns.extend(super::detect_name_patterns(&name, path, line_no, 0.6));
                symbols.push(sym);
                current_class = Some(name);
                pending_template = false;
                continue;
            }

            let mut declared_fn: Option<String> = None;
            if let Some(caps) = RE_FUNCTION.captures(line) {
                declared_fn = Some(caps[1].to_string());
            } else if language == Some(Language::Cpp) {
                if let Some(caps) = RE_CPP_FUNCTION.captures(line) {
                    let candidate = caps[1].to_string();
                    if !CALL_KEYWORDS.contains(&candidate.as_str()) {
                        declared_fn = Some(candidate);
                    }
                }
            }

            if let Some(full_name) = declared_fn {
                // `Scope::name` declarations carry their own qualifier.
                let (scope_prefix, name) = match full_name.rfind("::") {
                    Some(pos) => (Some(full_name[..pos].to_string()), full_name[pos + 2..].to_string()),
                    None => (None, full_name.clone()),
                };

                let owner_class = scope_prefix.clone().or_else(|| current_class.clone());
                let is_ctor = owner_class.as_deref() == Some(name.as_str());
                let is_special =
                    is_ctor || name.starts_with('~') || name.starts_with("operator");
                if is_special {
                    special_form_count += 1;
                }

                let kind = if owner_class.is_some() {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                let mut qualified = qualify(&namespace_stack, separator, &name);
                if let Some(class) = &owner_class {
                    qualified = qualify(
                        &namespace_stack,
                        separator,
                        &format!("{}{}{}", class, separator, name),
                    );
                }
                let mut sym = make_symbol(
                    &name,
                    &qualified,
                    kind,
                    path,
                    line_no,
                    namespace_stack.last().cloned(),
                    owner_class.clone(),
                    pending_template,
                );
                sym.is_exported = !name.starts_with('_');
                patterns.extend(super::detect_name_patterns(&name, path, line_no, 0.6));
                symbols.push(sym);
                current_function = Some(qualified);
                pending_template = false;
                continue;
            }

            if let Some(caps) = RE_IMPORT.captures(line) {
                let module = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .next()
                    .map(|m| m.as_str().to_string());
                if let Some(module) = module {
                    let name = module
                        .rsplit(['/', '.'])
                        .next()
                        .unwrap_or(&module)
                        .to_string();
                    symbols.push(make_symbol(
                        &name,
                        &module,
                        SymbolKind::Module,
                        path,
                        line_no,
                        None,
                        None,
                        false,
                    ));
                }
                continue;
            }

            // Call sites, attributed to the innermost declared function.
            if let Some(caller) = &current_function {
                for caps in RE_CALL.captures_iter(line) {
                    let target = caps[1].to_string();
                    let bare = target
                        .rsplit(&['.', ':'][..])
                        .next()
                        .unwrap_or(&target)
                        .to_string();
                    if CALL_KEYWORDS.contains(&bare.as_str()) || target == *caller {
                        continue;
                    }
                    let mut site = CallSite::call(caller, &target, line_no);
                    if Self::is_cross_language_call(&target, line) {
                        site.cross_language = true;
                        // Record the service name for the resolution pass.
                        if let Some(base) = bare
                            .strip_suffix("Stub")
                            .or_else(|| bare.strip_suffix("Client"))
                        {
                            site.metadata
                                .insert("service".to_string(), base.to_string());
                        }
                        patterns.push(PatternHit::new("rpc-call", &target, path, line_no, 0.5));
                    }
                    call_sites.push(site);
                }
            }
        }

        Ok(ParseResult {
            file_path: path.to_string(),
            strategy: "line".to_string(),
            symbols,
            call_sites,
            patterns,
            special_form_count,
            parse_duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn qualify(namespace_stack: &[String], separator: &str, name: &str) -> String {
    if namespace_stack.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", namespace_stack.join(separator), separator, name)
    }
}

#[allow(clippy::too_many_arguments)]
fn make_symbol(
    name: &str,
    qualified_name: &str,
    kind: SymbolKind,
    file_path: &str,
    line: u32,
    namespace: Option<String>,
    parent_class: Option<String>,
    is_template: bool,
) -> Symbol {
    Symbol {
        id: Symbol::derive_id(qualified_name, file_path, kind),
        name: name.to_string(),
        qualified_name: qualified_name.to_string(),
        kind,
        file_path: file_path.to_string(),
        line,
        end_line: line,
        namespace,
        parent_class,
        return_type: None,
        is_exported: true,
        is_template,
        confidence: 0.6,
        semantic_tags: BTreeSet::new(),
    }
}
