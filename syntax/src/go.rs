//! Go declarations via tree-sitter.

use std::path::Path;

use callscout_types::{
    FieldDecl, FunctionDecl, InterfaceDecl, InterfaceMethod, ParsedFile, SourcePoint, StructDecl,
};
use thiserror::Error;
use tree_sitter::{Node, Parser};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("loading Go grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("parser produced no tree")]
    NoTree,
}

#[derive(Default)]
struct Declarations {
    functions: Vec<FunctionDecl>,
    interfaces: Vec<InterfaceDecl>,
    structs: Vec<StructDecl>,
}

/// Parse one Go source file into its top-level declarations.
///
/// Syntax errors are tolerated; whatever tree-sitter recovered is indexed.
pub fn parse_go(path: &Path, source: &str) -> Result<ParsedFile, ParseError> {
    let mut parser = Parser::new();
    let language = tree_sitter_go::LANGUAGE;
    parser.set_language(&language.into())?;
    let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
    let root = tree.root_node();
    if root.has_error() {
        tracing::debug!("{} has syntax errors; indexing what parsed", path.display());
    }

    let mut decls = Declarations::default();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "function_declaration" | "method_declaration" => {
                if let Some(function) = function_decl(child, source) {
                    decls.functions.push(function);
                }
            }
            "type_declaration" => type_declaration(child, source, &mut decls),
            _ => {}
        }
    }

    Ok(ParsedFile::new(
        path,
        decls.functions,
        decls.interfaces,
        decls.structs,
    ))
}

fn function_decl(node: Node<'_>, source: &str) -> Option<FunctionDecl> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    if name.is_empty() {
        return None;
    }
    Some(FunctionDecl {
        name,
        receiver: receiver_type(node, source),
        name_at: point(name_node),
        start_line: row(node.start_position().row),
        end_line: row(node.end_position().row),
        text: node_text(node, source),
    })
}

/// `(c *Client)` and `(c Client[T])` both give `Client`.
fn receiver_type(node: Node<'_>, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for child in receiver.named_children(&mut cursor) {
        if child.kind() == "parameter_declaration"
            && let Some(type_node) = child.child_by_field_name("type")
        {
            let type_text = node_text(type_node, source);
            let type_text = type_text.trim_start_matches('*').trim();
            let base = type_text.split('[').next().unwrap_or(type_text).trim();
            if !base.is_empty() {
                return Some(base.to_string());
            }
        }
    }
    None
}

fn type_declaration(node: Node<'_>, source: &str, decls: &mut Declarations) {
    let mut cursor = node.walk();
    for spec in node.named_children(&mut cursor) {
        if spec.kind() != "type_spec" {
            continue;
        }
        let Some(name_node) = spec.child_by_field_name("name") else {
            continue;
        };
        let Some(type_node) = spec.child_by_field_name("type") else {
            continue;
        };
        let name = node_text(name_node, source);
        match type_node.kind() {
            "interface_type" => decls.interfaces.push(InterfaceDecl {
                methods: interface_methods(type_node, source),
                name,
            }),
            "struct_type" => decls.structs.push(StructDecl {
                fields: struct_fields(type_node, source),
                name,
            }),
            _ => {}
        }
    }
}

fn interface_methods(node: Node<'_>, source: &str) -> Vec<InterfaceMethod> {
    let mut methods = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        // `method_spec` in older grammars.
        if !matches!(child.kind(), "method_elem" | "method_spec") {
            continue;
        }
        if let Some(name_node) = child.child_by_field_name("name") {
            methods.push(InterfaceMethod {
                name: node_text(name_node, source),
                at: point(name_node),
            });
        }
    }
    methods
}

fn struct_fields(node: Node<'_>, source: &str) -> Vec<FieldDecl> {
    let mut cursor = node.walk();
    let Some(list) = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == "field_declaration_list")
    else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    let mut cursor = list.walk();
    for child in list.named_children(&mut cursor) {
        if child.kind() != "field_declaration" {
            continue;
        }
        let mut name_cursor = child.walk();
        let names = child
            .children_by_field_name("name", &mut name_cursor)
            .map(|n| node_text(n, source))
            .collect();
        let type_text = child
            .child_by_field_name("type")
            .map(|n| node_text(n, source))
            .unwrap_or_default();
        let tag = child.child_by_field_name("tag").map(|n| node_text(n, source));
        fields.push(FieldDecl {
            names,
            type_text,
            tag,
        });
    }
    fields
}

fn point(node: Node<'_>) -> SourcePoint {
    let start = node.start_position();
    SourcePoint::new(row(start.row), row(start.column))
}

fn row(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn node_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .trim()
        .to_string()
}
