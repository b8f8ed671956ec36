use crate::error::IndexError;
use crate::extractor::StructureExtractor;
use crate::models::{StructuralUnit, UnitKind};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Language, Node, Parser, Tree};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
}

impl Grammar {
    const ALL: [Grammar; 6] = [
        Grammar::Rust,
        Grammar::Python,
        Grammar::JavaScript,
        Grammar::TypeScript,
        Grammar::Tsx,
        Grammar::Go,
    ];

    pub fn for_path(path: &str) -> Option<Self> {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())?;

        match extension.as_str() {
            "rs" => Some(Self::Rust),
            "py" | "pyi" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    fn language(self) -> Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }
}

#[derive(Clone)]
pub struct SyntaxTreeExtractor {
    languages: HashMap<Grammar, Language>,
}

impl SyntaxTreeExtractor {
    pub fn new() -> Result<Self, IndexError> {
        let mut languages = HashMap::new();
        for grammar in Grammar::ALL {
            let language = grammar.language();
            Parser::new()
                .set_language(&language)
                .map_err(|err| IndexError::Grammar(format!("{grammar:?}: {err}")))?;
            languages.insert(grammar, language);
        }
        Ok(Self { languages })
    }

    fn parse(&self, text: &str, grammar: Grammar) -> Option<Tree> {
        let language = self.languages.get(&grammar)?;
        let mut parser = Parser::new();
        parser.set_language(language).ok()?;
        parser.parse(text, None)
    }
}

impl StructureExtractor for SyntaxTreeExtractor {
    fn extract(&self, text: &str, path: &str) -> Vec<StructuralUnit> {
        let Some(grammar) = Grammar::for_path(path) else {
            return Vec::new();
        };
        let Some(tree) = self.parse(text, grammar) else {
            warn!(path, "parser returned no tree");
            return Vec::new();
        };
        top_level_units(tree.root_node(), text.as_bytes(), grammar)
    }

    fn supports(&self, path: &str) -> bool {
        Grammar::for_path(path).is_some()
    }
}

fn top_level_units(root: Node, source: &[u8], grammar: Grammar) -> Vec<StructuralUnit> {
    let mut units = Vec::new();
    let mut imports: Option<(usize, usize)> = None;
    // Attributes and comments directly above the next item.
    let mut preamble: Option<(usize, usize)> = None;

    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        let (start, end) = line_span(node);

        if is_preamble(node, grammar) {
            preamble = match preamble {
                Some((first, last)) if start <= last + 1 => Some((first, end)),
                _ => Some((start, end)),
            };
            continue;
        }

        let attached = preamble
            .take()
            .filter(|(_, last)| start <= last + 1)
            .map(|(first, _)| first)
            .unwrap_or(start);

        if is_import(node, grammar) {
            imports = Some(match imports {
                Some((first, _)) => (first, end),
                None => (attached, end),
            });
            continue;
        }

        if let Some((kind, name)) = classify(node, source, grammar) {
            units.push(StructuralUnit::new(kind, name, attached, end));
        }
    }

    if let Some((start, end)) = imports {
        units.push(StructuralUnit::new(UnitKind::ImportBlock, "imports", start, end));
    }
    units.sort_by_key(|unit| unit.start_line);
    units
}

// 1-based inclusive lines. A node ending at column 0 ends on the line before.
fn line_span(node: Node) -> (usize, usize) {
    let start = node.start_position().row + 1;
    let end = node.end_position();
    let last = if end.column == 0 && end.row >= start {
        end.row
    } else {
        end.row + 1
    };
    (start, last.max(start))
}

fn is_preamble(node: Node, grammar: Grammar) -> bool {
    match grammar {
        Grammar::Rust => matches!(node.kind(), "attribute_item" | "line_comment" | "block_comment"),
        _ => node.kind() == "comment",
    }
}

fn is_import(node: Node, grammar: Grammar) -> bool {
    let kind = node.kind();
    match grammar {
        Grammar::Rust => matches!(kind, "use_declaration" | "extern_crate_declaration"),
        Grammar::Python => matches!(
            kind,
            "import_statement" | "import_from_statement" | "future_import_statement"
        ),
        Grammar::JavaScript | Grammar::TypeScript | Grammar::Tsx => kind == "import_statement",
        Grammar::Go => kind == "import_declaration",
    }
}

fn classify(node: Node, source: &[u8], grammar: Grammar) -> Option<(UnitKind, String)> {
    if node.is_error() {
        return None;
    }
    match grammar {
        Grammar::Rust => classify_rust(node, source),
        Grammar::Python => classify_python(node, source),
        Grammar::JavaScript | Grammar::TypeScript | Grammar::Tsx => classify_script(node, source),
        Grammar::Go => classify_go(node, source),
    }
}

fn classify_rust(node: Node, source: &[u8]) -> Option<(UnitKind, String)> {
    match node.kind() {
        "function_item" | "macro_definition" => Some((UnitKind::Function, field_text(node, "name", source)?)),
        "struct_item" | "enum_item" | "union_item" | "trait_item" | "mod_item" => {
            Some((UnitKind::Class, field_text(node, "name", source)?))
        }
        "impl_item" => {
            let target = field_text(node, "type", source)?;
            let name = match field_text(node, "trait", source) {
                Some(trait_name) => format!("impl {trait_name} for {target}"),
                None => format!("impl {target}"),
            };
            Some((UnitKind::Class, name))
        }
        _ => None,
    }
}

fn classify_python(node: Node, source: &[u8]) -> Option<(UnitKind, String)> {
    match node.kind() {
        "function_definition" => Some((UnitKind::Function, field_text(node, "name", source)?)),
        "class_definition" => Some((UnitKind::Class, field_text(node, "name", source)?)),
        "decorated_definition" => classify_python(node.child_by_field_name("definition")?, source),
        _ => None,
    }
}

fn classify_script(node: Node, source: &[u8]) -> Option<(UnitKind, String)> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            Some((UnitKind::Function, field_text(node, "name", source)?))
        }
        "class_declaration" | "abstract_class_declaration" | "interface_declaration"
        | "enum_declaration" => Some((UnitKind::Class, field_text(node, "name", source)?)),
        "export_statement" => match node.child_by_field_name("declaration") {
            Some(declaration) => classify_script(declaration, source),
            None => node
                .child_by_field_name("value")
                .filter(|value| is_function_value(*value))
                .map(|_| (UnitKind::Function, "default".to_string())),
        },
        "lexical_declaration" | "variable_declaration" => {
            let mut cursor = node.walk();
            let declarator = node.named_children(&mut cursor).find(|child| {
                child.kind() == "variable_declarator"
                    && child.child_by_field_name("value").is_some_and(is_function_value)
            })?;
            Some((UnitKind::Function, field_text(declarator, "name", source)?))
        }
        _ => None,
    }
}

fn is_function_value(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

fn classify_go(node: Node, source: &[u8]) -> Option<(UnitKind, String)> {
    match node.kind() {
        "function_declaration" | "method_declaration" => {
            Some((UnitKind::Function, field_text(node, "name", source)?))
        }
        "type_declaration" => {
            let mut cursor = node.walk();
            let type_spec = node
                .named_children(&mut cursor)
                .find(|child| matches!(child.kind(), "type_spec" | "type_alias"))?;
            Some((UnitKind::Class, field_text(type_spec, "name", source)?))
        }
        _ => None,
    }
}

fn field_text(node: Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)?
        .utf8_text(source)
        .ok()
        .map(str::to_string)
}
