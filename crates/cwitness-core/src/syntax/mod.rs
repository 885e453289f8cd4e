/*!
# Syntax Tree Interface

The instrumentation core only needs a small read-only view of a syntax tree:
node kinds, coordinates, ordered children and named fields. `SyntaxNode`
captures that view; tree-sitter nodes implement it directly, and tests can
supply hand-built trees.
*/

pub mod kinds;
#[cfg(test)]
pub(crate) mod testing;

use std::ops::Range;

use tracing::warn;

use crate::errors::{InstrumentError, Result};
use crate::position::Coordinate;

pub use kinds::{ExpressionKind, StatementKind};

/// Read-only view of a node in a concrete syntax tree
pub trait SyntaxNode: Copy {
    /// Grammar kind, e.g. `if_statement`
    fn kind(&self) -> &str;

    /// Whether the node is a named grammar rule rather than a literal token
    fn is_named(&self) -> bool;

    fn start(&self) -> Coordinate;

    fn end(&self) -> Coordinate;

    /// Byte range of the node in the parsed text
    fn byte_range(&self) -> Range<usize>;

    /// All children in source order, including anonymous tokens
    fn children(&self) -> Vec<Self>;

    /// Child stored under a grammar field name
    fn field(&self, name: &str) -> Option<Self>;

    fn named_children(&self) -> Vec<Self> {
        self.children().into_iter().filter(|c| c.is_named()).collect()
    }
}

/// Exact source text spanned by `node`
pub fn text_of<'s, N: SyntaxNode>(node: N, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

impl<'tree> SyntaxNode for tree_sitter::Node<'tree> {
    fn kind(&self) -> &str {
        tree_sitter::Node::kind(self)
    }

    fn is_named(&self) -> bool {
        tree_sitter::Node::is_named(self)
    }

    fn start(&self) -> Coordinate {
        self.start_position().into()
    }

    fn end(&self) -> Coordinate {
        self.end_position().into()
    }

    fn byte_range(&self) -> Range<usize> {
        tree_sitter::Node::byte_range(self)
    }

    fn children(&self) -> Vec<Self> {
        let mut cursor = self.walk();
        tree_sitter::Node::children(self, &mut cursor).collect()
    }

    fn field(&self, name: &str) -> Option<Self> {
        self.child_by_field_name(name)
    }
}

/// C parser backed by tree-sitter-c
pub struct CParser {
    parser: tree_sitter::Parser,
}

impl CParser {
    pub fn new() -> Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        let language: tree_sitter::Language = tree_sitter_c::LANGUAGE.into();
        parser
            .set_language(&language)
            .map_err(|e| InstrumentError::Language(e.to_string()))?;

        Ok(Self { parser })
    }

    /// Parse `source` into a tree. Syntax errors do not fail the parse; they
    /// show up as `ERROR` nodes that the instrumentation walks past.
    pub fn parse(&mut self, source: &str) -> Result<tree_sitter::Tree> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or(InstrumentError::ParseAborted)?;

        let root = tree.root_node();
        if root.has_error() {
            warn!(
                "C source contains syntax errors (first at {}); instrumentation may be incomplete",
                first_error(root).map_or(Coordinate::ORIGIN, |n| n.start())
            );
        }

        Ok(tree)
    }
}

fn first_error(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    SyntaxNode::children(&node).into_iter().find_map(first_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function_definition() {
        let source = "int main(void) {\n  return 0;\n}\n";
        let mut parser = CParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let root = tree.root_node();

        assert_eq!(SyntaxNode::kind(&root), "translation_unit");
        let function = SyntaxNode::named_children(&root)[0];
        assert_eq!(SyntaxNode::kind(&function), "function_definition");
        assert_eq!(function.start(), Coordinate::new(0, 0));
        assert_eq!(function.end(), Coordinate::new(2, 1));

        let body = function.field("body").unwrap();
        assert_eq!(text_of(body, source), "{\n  return 0;\n}");
    }

    #[test]
    fn test_children_include_tokens() {
        let source = "void f() { x = 1; }";
        let mut parser = CParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let function = SyntaxNode::named_children(&tree.root_node())[0];
        let body = function.field("body").unwrap();

        let kinds: Vec<&str> = SyntaxNode::children(&body).iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["{", "expression_statement", "}"]);
    }
}
