// Syntax-tree strategy backed by tree-sitter
//
// One walker driven by a per-language grammar table. Moderate accuracy and
// cost; refuses files above its size cap so the orchestrator can fall back
// to the line tier.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use tree_sitter::{Node, Parser as TreeParser, Tree, TreeCursor};

use super::{
    detect_name_patterns, Language, ParseResult, ParseStrategy, StrategyCapabilities,
    StrategyError, StrategyTier, SUPPORTED_EXTENSIONS,
};
use crate::graph::{CallSite, RelationKind, Symbol, SymbolKind};

/// Default size cap. Files beyond this are a line-tier problem.
pub const DEFAULT_MAX_BYTES: usize = 2 * 1024 * 1024;

/// Grammar-level node kinds for one language, consumed by the shared walker.
struct GrammarTable {
    language: Language,
    function_kinds: &'static [&'static str],
    class_kinds: &'static [(&'static str, SymbolKind)],
    namespace_kinds: &'static [&'static str],
    call_kinds: &'static [&'static str],
}

fn grammar_table(language: Language) -> GrammarTable {
    match language {
        Language::Python => GrammarTable {
            language,
            function_kinds: &["function_definition"],
            class_kinds: &[("class_definition", SymbolKind::Class)],
            namespace_kinds: &[],
            call_kinds: &["call"],
        },
        Language::Rust => GrammarTable {
            language,
            function_kinds: &["function_item"],
            class_kinds: &[
                ("struct_item", SymbolKind::Struct),
                ("enum_item", SymbolKind::Struct),
                ("trait_item", SymbolKind::Interface),
            ],
            namespace_kinds: &["mod_item"],
            call_kinds: &["call_expression"],
        },
        Language::Go => GrammarTable {
            language,
            function_kinds: &["function_declaration", "method_declaration"],
            class_kinds: &[],
            namespace_kinds: &[],
            call_kinds: &["call_expression"],
        },
        Language::Java => GrammarTable {
            language,
            function_kinds: &["method_declaration", "constructor_declaration"],
            class_kinds: &[
                ("class_declaration", SymbolKind::Class),
                ("interface_declaration", SymbolKind::Interface),
            ],
            namespace_kinds: &[],
            call_kinds: &["method_invocation", "object_creation_expression"],
        },
        Language::Cpp => GrammarTable {
            language,
            function_kinds: &["function_definition"],
            class_kinds: &[
                ("class_specifier", SymbolKind::Class),
                ("struct_specifier", SymbolKind::Struct),
            ],
            namespace_kinds: &["namespace_definition"],
            call_kinds: &["call_expression"],
        },
    }
}

fn ts_language(language: Language) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScopeKind {
    Namespace,
    Class,
    Function,
}

/// Tree-sitter parse strategy.
pub struct TreeStrategy {
    max_bytes: usize,
}

impl TreeStrategy {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    fn parse_tree(&self, language: Language, content: &str) -> Result<Tree, StrategyError> {
        let mut parser = TreeParser::new();
        parser
            .set_language(&ts_language(language))
            .map_err(|e| StrategyError::Syntax {
                path: String::new(),
                message: format!("grammar load failed: {}", e),
            })?;
        parser.parse(content, None).ok_or(StrategyError::Syntax {
            path: String::new(),
            message: "tree-sitter produced no tree".to_string(),
        })
    }
}

impl ParseStrategy for TreeStrategy {
    fn capabilities(&self) -> StrategyCapabilities {
        StrategyCapabilities {
            name: "tree",
            tier: StrategyTier::Tree,
            extensions: SUPPORTED_EXTENSIONS,
            features: &["symbols", "call-sites", "patterns", "inheritance"],
        }
    }

    fn initialize(&self, _project_root: &Path) -> Result<(), StrategyError> {
        Ok(())
    }

    fn parse_file(&self, path: &str, content: &str) -> Result<ParseResult, StrategyError> {
        let start = Instant::now();

        if content.len() > self.max_bytes {
            return Err(StrategyError::TooLarge {
                path: path.to_string(),
                bytes: content.len(),
            });
        }
        let language = Language::from_path(path).ok_or_else(|| StrategyError::Syntax {
            path: path.to_string(),
            message: "unsupported file extension".to_string(),
        })?;

        let tree = self.parse_tree(language, content).map_err(|e| match e {
            StrategyError::Syntax { message, .. } => StrategyError::Syntax {
                path: path.to_string(),
                message,
            },
            other => other,
        })?;

        let table = grammar_table(language);
        let mut extractor = Extractor {
            table,
            path,
            content,
            result: ParseResult {
                file_path: path.to_string(),
                strategy: "tree".to_string(),
                ..Default::default()
            },
        };

        let mut cursor = tree.root_node().walk();
        extractor.walk(&mut cursor, Vec::new());

        let mut result = extractor.result;
        result.parse_duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}

struct Extractor<'a> {
    table: GrammarTable,
    path: &'a str,
    content: &'a str,
    result: ParseResult,
}

impl<'a> Extractor<'a> {
    fn walk(&mut self, cursor: &mut TreeCursor, scope: Vec<(String, ScopeKind)>) {
        let node = cursor.node();
        let kind = node.kind();

        let mut child_scope = scope.clone();

        if self.table.namespace_kinds.contains(&kind) {
            if let Some(name) = self.node_name(node) {
                self.push_symbol(node, &name, SymbolKind::Namespace, &scope, false);
                child_scope.push((name, ScopeKind::Namespace));
            }
        } else if let Some((_, sym_kind)) = self
            .table
            .class_kinds
            .iter()
            .find(|(k, _)| *k == kind)
            .copied()
        {
            if let Some(name) = self.node_name(node) {
                self.push_symbol(node, &name, sym_kind, &scope, false);
                self.extract_heritage(node, &name, &scope);
                child_scope.push((name, ScopeKind::Class));
            }
        } else if self.table.function_kinds.contains(&kind) {
            if let Some(name) = self.function_name(node) {
                let in_class = scope.iter().rev().any(|(_, k)| *k == ScopeKind::Class);
                let sym_kind = if in_class || kind == "method_declaration" {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                self.push_symbol(node, &name, sym_kind, &scope, true);
                child_scope.push((name, ScopeKind::Function));
            }
        } else if self.table.call_kinds.contains(&kind) {
            self.extract_call(node, &scope);
        }

        if cursor.goto_first_child() {
            self.walk(cursor, child_scope.clone());
            while cursor.goto_next_sibling() {
                self.walk(cursor, child_scope.clone());
            }
            cursor.goto_parent();
        }
    }

    fn separator(&self) -> &'static str {
        self.table.language.separator()
    }

    fn qualify(&self, scope: &[(String, ScopeKind)], name: &str) -> String {
        if scope.is_empty() {
            name.to_string()
        } else {
            let prefix: Vec<&str> = scope.iter().map(|(n, _)| n.as_str()).collect();
            format!("{}{}{}", prefix.join(self.separator()), self.separator(), name)
        }
    }

    fn node_text(&self, node: Node) -> String {
        self.content[node.byte_range()].to_string()
    }

    fn node_name(&self, node: Node) -> Option<String> {
        node.child_by_field_name("name").map(|n| self.node_text(n))
    }

    /// Function names need per-language digging: C++ buries them in a
    /// declarator chain, Go methods carry a receiver, the rest use `name`.
    fn function_name(&self, node: Node) -> Option<String> {
        match self.table.language {
            Language::Cpp => {
                let mut declarator = node.child_by_field_name("declarator")?;
                loop {
                    if declarator.kind() == "function_declarator" {
                        let inner = declarator.child_by_field_name("declarator")?;
                        return Some(self.node_text(inner));
                    }
                    match declarator.child_by_field_name("declarator") {
                        Some(next) => declarator = next,
                        None => return None,
                    }
                }
            }
            _ => self.node_name(node),
        }
    }

    fn return_type(&self, node: Node) -> Option<String> {
        let field = match self.table.language {
            Language::Python | Language::Rust => "return_type",
            Language::Go => "result",
            Language::Java | Language::Cpp => "type",
        };
        node.child_by_field_name(field).map(|n| self.node_text(n))
    }

    fn is_exported(&self, node: Node, name: &str) -> bool {
        match self.table.language {
            Language::Python => !name.starts_with('_'),
            Language::Go => name.chars().next().is_some_and(|c| c.is_uppercase()),
            Language::Rust => {
                let mut cursor = node.walk();
                let has_visibility = node
                    .children(&mut cursor)
                    .any(|c| c.kind() == "visibility_modifier");
                has_visibility
            }
            Language::Java | Language::Cpp => true,
        }
    }

    fn is_template(&self, node: Node) -> bool {
        node.parent()
            .map(|p| p.kind() == "template_declaration")
            .unwrap_or(false)
            || node.child_by_field_name("type_parameters").is_some()
    }

    fn push_symbol(
        &mut self,
        node: Node,
        raw_name: &str,
        kind: SymbolKind,
        scope: &[(String, ScopeKind)],
        callable: bool,
    ) {
        // `Scope::name` definitions outside the class body qualify themselves.
        let (explicit_class, name) = match raw_name.rfind("::") {
            Some(pos) => (
                Some(raw_name[..pos].to_string()),
                raw_name[pos + 2..].to_string(),
            ),
            None => (None, raw_name.to_string()),
        };

        let enclosing_class = explicit_class.clone().or_else(|| {
            scope
                .iter()
                .rev()
                .find(|(_, k)| *k == ScopeKind::Class)
                .map(|(n, _)| n.clone())
        });
        let namespace = scope
            .iter()
            .rev()
            .find(|(_, k)| *k == ScopeKind::Namespace)
            .map(|(n, _)| n.clone());

        let kind = if callable && explicit_class.is_some() {
            SymbolKind::Method
        } else {
            kind
        };

        let qualified_name = if let Some(class) = &explicit_class {
            // Re-anchor at namespace scope only; the class brings its own path.
            let ns_scope: Vec<(String, ScopeKind)> = scope
                .iter()
                .filter(|(_, k)| *k == ScopeKind::Namespace)
                .cloned()
                .collect();
            self.qualify(&ns_scope, &format!("{}::{}", class, name))
        } else {
            self.qualify(scope, &name)
        };

        let is_ctor = (callable && enclosing_class.as_deref() == Some(name.as_str()))
            || name == "__init__";
        if is_ctor || name.starts_with('~') || name.starts_with("operator") {
            self.result.special_form_count += 1;
        }

        self.result.patterns.extend(detect_name_patterns(
            &name,
            self.path,
            node.start_position().row as u32 + 1,
            0.8,
        ));

        let line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;
        self.result.symbols.push(Symbol {
            id: Symbol::derive_id(&qualified_name, self.path, kind),
            name: name.clone(),
            qualified_name,
            kind,
            file_path: self.path.to_string(),
            line,
            end_line,
            namespace,
            parent_class: if callable { enclosing_class } else { None },
            return_type: if callable { self.return_type(node) } else { None },
            is_exported: self.is_exported(node, &name),
            is_template: self.is_template(node),
            confidence: 0.8,
            semantic_tags: BTreeSet::new(),
        });
    }

    fn extract_heritage(&mut self, node: Node, class_name: &str, scope: &[(String, ScopeKind)]) {
        let bases: Vec<String> = match self.table.language {
            Language::Python => node
                .child_by_field_name("superclasses")
                .map(|args| {
                    let mut cursor = args.walk();
                    args.children(&mut cursor)
                        .filter(|c| c.kind() == "identifier" || c.kind() == "attribute")
                        .map(|c| self.node_text(c))
                        .collect()
                })
                .unwrap_or_default(),
            Language::Cpp => {
                let mut cursor = node.walk();
                node.children(&mut cursor)
                    .filter(|c| c.kind() == "base_class_clause")
                    .flat_map(|clause| {
                        let mut inner = clause.walk();
                        clause
                            .children(&mut inner)
                            .filter(|c| {
                                c.kind() == "type_identifier" || c.kind() == "qualified_identifier"
                            })
                            .map(|c| self.node_text(c))
                            .collect::<Vec<_>>()
                    })
                    .collect()
            }
            Language::Java => node
                .child_by_field_name("superclass")
                .into_iter()
                .chain(node.child_by_field_name("interfaces"))
                .map(|c| {
                    self.node_text(c)
                        .trim_start_matches("extends")
                        .trim_start_matches("implements")
                        .trim()
                        .to_string()
                })
                .collect(),
            _ => Vec::new(),
        };

        let from = self.qualify(scope, class_name);
        for base in bases {
            let mut site = CallSite::call(&from, &base, node.start_position().row as u32 + 1);
            site.kind = RelationKind::Inherits;
            self.result.call_sites.push(site);
        }
    }

    fn extract_call(&mut self, node: Node, scope: &[(String, ScopeKind)]) {
        let caller = match scope.iter().rev().find(|(_, k)| *k == ScopeKind::Function) {
            Some(_) => {
                let names: Vec<&str> = scope.iter().map(|(n, _)| n.as_str()).collect();
                names.join(self.separator())
            }
            // Top-level calls have no caller symbol to hang an edge on.
            None => return,
        };

        let callee = match self.table.language {
            Language::Java => {
                if node.kind() == "object_creation_expression" {
                    node.child_by_field_name("type").map(|n| self.node_text(n))
                } else {
                    node.child_by_field_name("name").map(|n| self.node_text(n))
                }
            }
            Language::Python => node.child_by_field_name("function").map(|f| {
                if f.kind() == "attribute" {
                    f.child_by_field_name("attribute")
                        .map(|a| self.node_text(a))
                        .unwrap_or_else(|| self.node_text(f))
                } else {
                    self.node_text(f)
                }
            }),
            _ => node.child_by_field_name("function").map(|n| self.node_text(n)),
        };

        let Some(mut target) = callee else { return };
        target = target.trim().to_string();
        if target.is_empty() {
            return;
        }

        let line = node.start_position().row as u32 + 1;
        let mut site = CallSite::call(&caller, &target, line);
        if node.kind() == "object_creation_expression" {
            site.kind = RelationKind::Instantiates;
        }
        if target.ends_with("Stub") || target.ends_with("Client") || target.contains("Service") {
            site.cross_language = true;
            let bare = target.rsplit(&['.', ':'][..]).next().unwrap_or(&target);
            if let Some(base) = bare
                .strip_suffix("Stub")
                .or_else(|| bare.strip_suffix("Client"))
            {
                site.metadata
                    .insert("service".to_string(), base.to_string());
            }
        }
        self.result.call_sites.push(site);
    }
}
