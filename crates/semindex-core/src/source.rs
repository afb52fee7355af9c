//! Pluggable syntactic parsing boundary between the chunker and a concrete
//! AST parser. [`TreeSitterSource`] is the default implementation; other
//! implementations of [`SnippetSource`] can be swapped in without touching
//! the chunker's walk/policy logic.

use std::path::Path;

use tree_sitter::{Language, Parser};

use crate::error::ChunkError;
use crate::model::BlockType;

/// Language tag used across the data model (`"python"`, `"javascript"`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
    Go,
}

impl SourceLanguage {
    pub fn tag(&self) -> &'static str {
        match self {
            SourceLanguage::Python => "python",
            SourceLanguage::JavaScript => "javascript",
            SourceLanguage::TypeScript => "typescript",
            SourceLanguage::Tsx => "typescript",
            SourceLanguage::Rust => "rust",
            SourceLanguage::Go => "go",
        }
    }

    pub fn tree_sitter_language(&self) -> Language {
        match self {
            SourceLanguage::Python => tree_sitter_python::LANGUAGE.into(),
            SourceLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            SourceLanguage::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            SourceLanguage::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            SourceLanguage::Rust => tree_sitter_rust::LANGUAGE.into(),
            SourceLanguage::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" => Some(SourceLanguage::Python),
            "js" | "mjs" | "cjs" => Some(SourceLanguage::JavaScript),
            "ts" => Some(SourceLanguage::TypeScript),
            "tsx" => Some(SourceLanguage::Tsx),
            "rs" => Some(SourceLanguage::Rust),
            "go" => Some(SourceLanguage::Go),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// The declaration node kinds this language's grammar uses for
    /// top-level classes, functions and methods.
    fn declaration_kinds(&self) -> DeclarationKinds {
        match self {
            SourceLanguage::Python => DeclarationKinds {
                class: &["class_definition"],
                function: &["function_definition"],
                method_container: &["class_definition"],
            },
            SourceLanguage::JavaScript | SourceLanguage::TypeScript | SourceLanguage::Tsx => {
                DeclarationKinds {
                    class: &["class_declaration"],
                    function: &["function_declaration"],
                    method_container: &["class_declaration", "class_body"],
                }
            }
            SourceLanguage::Rust => DeclarationKinds {
                class: &["struct_item", "enum_item", "impl_item"],
                function: &["function_item"],
                method_container: &["impl_item"],
            },
            SourceLanguage::Go => DeclarationKinds {
                class: &["type_declaration"],
                function: &["function_declaration"],
                method_container: &[],
            },
        }
    }
}

struct DeclarationKinds {
    class: &'static [&'static str],
    function: &'static [&'static str],
    method_container: &'static [&'static str],
}

/// A typed unit of source extracted from a parse tree, before it is turned
/// into a [`crate::model::CodeBlock`].
#[derive(Debug, Clone)]
pub struct Snippet {
    pub kind: BlockType,
    pub name: Option<String>,
    pub signature: Option<String>,
    pub class_name: Option<String>,
    pub line_start: u32,
    pub line_end: u32,
    pub char_start: u32,
    pub char_end: u32,
}

/// The boundary between the chunker's walk/policy logic and a concrete
/// syntactic parser.
pub trait SnippetSource: Send + Sync {
    fn language_for(&self, path: &Path) -> Option<SourceLanguage>;
    fn snippets(
        &self,
        path: &Path,
        content: &str,
        language: SourceLanguage,
    ) -> Result<Vec<Snippet>, ChunkError>;
}

/// Default [`SnippetSource`] backed by tree-sitter grammars.
#[derive(Default)]
pub struct TreeSitterSource;

impl SnippetSource for TreeSitterSource {
    fn language_for(&self, path: &Path) -> Option<SourceLanguage> {
        SourceLanguage::from_path(path)
    }

    fn snippets(
        &self,
        path: &Path,
        content: &str,
        language: SourceLanguage,
    ) -> Result<Vec<Snippet>, ChunkError> {
        let mut parser = Parser::new();
        parser
            .set_language(&language.tree_sitter_language())
            .map_err(|err| ChunkError::parse(path, err.to_string()))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ChunkError::parse(path, "tree-sitter produced no parse tree"))?;

        let kinds = language.declaration_kinds();
        let mut snippets = Vec::new();
        let mut cursor = tree.walk();
        walk_declarations(&mut cursor, content, &kinds, None, &mut snippets);
        Ok(snippets)
    }
}

fn walk_declarations(
    cursor: &mut tree_sitter::TreeCursor,
    content: &str,
    kinds: &DeclarationKinds,
    enclosing_class: Option<&str>,
    out: &mut Vec<Snippet>,
) {
    let node = cursor.node();
    let node_kind = node.kind();

    let is_class = kinds.class.contains(&node_kind);
    let is_function = kinds.function.contains(&node_kind);
    let is_method_container = kinds.method_container.contains(&node_kind);

    let mut next_enclosing = enclosing_class.map(|s| s.to_string());

    if is_class {
        let name = declaration_name(node, content);
        out.push(Snippet {
            kind: BlockType::Class,
            name: name.clone(),
            signature: node_signature(node, content),
            class_name: None,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            char_start: node.start_byte() as u32,
            char_end: node.end_byte() as u32,
        });
        if is_method_container {
            next_enclosing = name;
        }
    } else if is_function {
        let name = declaration_name(node, content);
        let block_type = if enclosing_class.is_some() {
            BlockType::Method
        } else {
            BlockType::Function
        };
        out.push(Snippet {
            kind: block_type,
            name,
            signature: node_signature(node, content),
            class_name: enclosing_class.map(|s| s.to_string()),
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            char_start: node.start_byte() as u32,
            char_end: node.end_byte() as u32,
        });
    }

    if cursor.goto_first_child() {
        loop {
            walk_declarations(cursor, content, kinds, next_enclosing.as_deref(), out);
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        cursor.goto_parent();
    }
}

fn declaration_name(node: tree_sitter::Node, content: &str) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(content.as_bytes()).ok())
        .map(|s| s.to_string())
}

fn node_signature(node: tree_sitter::Node, content: &str) -> Option<String> {
    let start = node.start_byte();
    let body_start = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or(node.end_byte());
    content
        .get(start..body_start)
        .map(|s| s.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn detects_language_from_extension() {
        assert_eq!(SourceLanguage::from_extension("py"), Some(SourceLanguage::Python));
        assert_eq!(SourceLanguage::from_extension("RS"), Some(SourceLanguage::Rust));
        assert_eq!(SourceLanguage::from_extension("toml"), None);
    }

    #[test]
    fn extracts_rust_function_snippet() {
        let source = TreeSitterSource;
        let path = PathBuf::from("lib.rs");
        let content = "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
        let snippets = source
            .snippets(&path, content, SourceLanguage::Rust)
            .unwrap();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].kind, BlockType::Function);
        assert_eq!(snippets[0].name.as_deref(), Some("add"));
    }

    #[test]
    fn extracts_python_method_with_class_name() {
        let source = TreeSitterSource;
        let path = PathBuf::from("mod.py");
        let content = "class Greeter:\n    def hello(self):\n        return 'hi'\n";
        let snippets = source
            .snippets(&path, content, SourceLanguage::Python)
            .unwrap();
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].kind, BlockType::Class);
        assert_eq!(snippets[1].kind, BlockType::Method);
        assert_eq!(snippets[1].class_name.as_deref(), Some("Greeter"));
    }
}
