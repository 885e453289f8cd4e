//! Hand-built syntax trees for exercising the traversal without a parser.

use std::ops::Range;

use super::SyntaxNode;
use crate::position::Coordinate;

struct FakeData {
    kind: &'static str,
    start: Coordinate,
    end: Coordinate,
    bytes: Range<usize>,
    children: Vec<usize>,
    fields: Vec<(&'static str, usize)>,
}

#[derive(Default)]
pub(crate) struct FakeTree {
    nodes: Vec<FakeData>,
}

impl FakeTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its index. Children must already exist.
    pub(crate) fn add(
        &mut self,
        kind: &'static str,
        start: (usize, usize),
        end: (usize, usize),
        children: Vec<usize>,
    ) -> usize {
        self.nodes.push(FakeData {
            kind,
            start: Coordinate::new(start.0, start.1),
            end: Coordinate::new(end.0, end.1),
            bytes: 0..0,
            children,
            fields: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub(crate) fn with_field(&mut self, parent: usize, name: &'static str, child: usize) {
        self.nodes[parent].fields.push((name, child));
    }

    pub(crate) fn with_bytes(&mut self, node: usize, bytes: Range<usize>) {
        self.nodes[node].bytes = bytes;
    }

    pub(crate) fn node(&self, index: usize) -> FakeNode<'_> {
        FakeNode { tree: self, index }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct FakeNode<'t> {
    tree: &'t FakeTree,
    index: usize,
}

impl<'t> FakeNode<'t> {
    fn data(&self) -> &'t FakeData {
        &self.tree.nodes[self.index]
    }
}

impl<'t> SyntaxNode for FakeNode<'t> {
    fn kind(&self) -> &str {
        self.data().kind
    }

    fn is_named(&self) -> bool {
        self.data().kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    fn start(&self) -> Coordinate {
        self.data().start
    }

    fn end(&self) -> Coordinate {
        self.data().end
    }

    fn byte_range(&self) -> Range<usize> {
        self.data().bytes.clone()
    }

    fn children(&self) -> Vec<Self> {
        self.data()
            .children
            .iter()
            .map(|&index| FakeNode {
                tree: self.tree,
                index,
            })
            .collect()
    }

    fn field(&self, name: &str) -> Option<Self> {
        self.data()
            .fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|&(_, index)| FakeNode {
                tree: self.tree,
                index,
            })
    }
}
