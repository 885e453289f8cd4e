/*!
# Variable Access Analysis

Finds the syntactic locations an expression reads or writes: plain variables,
array elements and struct fields. The result is a conservative
over-approximation that is always safe to print back as a C lvalue, which is
what the trace needs for live-value capture. Anything reachable only through a
pointer dereference is left out, since its value cannot be re-read without
re-deriving the pointer.
*/

use indexmap::IndexSet;

use crate::errors::Result;
use crate::syntax::{text_of, ExpressionKind, SyntaxNode};
use crate::visitor::{walk_one, Flow, Visitor};

use super::Diagnostic;

/// Distinct access targets in first-seen order, plus any notes about
/// expression kinds the analysis does not know.
#[derive(Debug, Default, Clone)]
pub struct AccessSet {
    targets: IndexSet<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AccessSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: impl Into<String>) -> bool {
        self.targets.insert(target.into())
    }

    pub fn contains(&self, target: &str) -> bool {
        self.targets.contains(target)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }

    pub fn targets(&self) -> &IndexSet<String> {
        &self.targets
    }

    /// Drop every target that refers to one of `names`, including targets such
    /// as `a[i]` whose index does. Member names after `.` or `->` do not count.
    pub fn forget(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.targets
            .retain(|target| !variables_in(target).any(|word| names.iter().any(|n| n == word)));
    }

    fn note_unhandled<N: SyntaxNode>(&mut self, node: N, kind: &str) {
        self.diagnostics.push(Diagnostic::unhandled(kind, node.start()));
    }
}

/// Identifiers of `target` that name variables rather than struct members.
fn variables_in(target: &str) -> impl Iterator<Item = &str> {
    let mut words = Vec::new();
    let mut start = None;
    let mut member = false;
    for (i, c) in target.char_indices().chain(std::iter::once((target.len(), ' '))) {
        let word_char = c.is_alphanumeric() || c == '_';
        match (start, word_char) {
            (None, true) => start = Some(i),
            (Some(s), false) => {
                let word = &target[s..i];
                if !member && !word.starts_with(|c: char| c.is_ascii_digit()) {
                    words.push(word);
                }
                start = None;
            }
            _ => {}
        }
        if !word_char && !c.is_whitespace() {
            member = c == '.' || (c == '>' && target[..i].ends_with('-'));
        }
    }
    words.into_iter()
}

/// Everything `node` reads (and, for assignments, also writes).
pub fn collect_reads<N: SyntaxNode>(node: N, source: &str) -> Result<AccessSet> {
    let mut set = AccessSet::new();
    walk_one(node, &mut ReadCollector { source }, &mut set)?;
    Ok(set)
}

/// Locations written by assignments and increments anywhere under `node`.
pub fn collect_writes<N: SyntaxNode>(node: N, source: &str) -> Result<AccessSet> {
    let mut set = AccessSet::new();
    walk_one(node, &mut WriteCollector { source }, &mut set)?;
    Ok(set)
}

/// Per-kind traversal rules for reads.
struct ReadCollector<'src> {
    source: &'src str,
}

impl<'src> ReadCollector<'src> {
    fn walk_field<N: SyntaxNode>(&mut self, node: N, field: &str, set: &mut AccessSet) -> Result<()> {
        match node.field(field) {
            Some(child) => walk_one(child, self, set),
            None => Ok(()),
        }
    }
}

impl<'src, N: SyntaxNode> Visitor<N, AccessSet> for ReadCollector<'src> {
    fn enter(&mut self, node: N, set: &mut AccessSet) -> Result<Flow> {
        let Some(kind) = ExpressionKind::classify(node.kind()) else {
            return Ok(Flow::Descend);
        };

        match kind {
            ExpressionKind::Identifier | ExpressionKind::Field => {
                set.insert(text_of(node, self.source));
                Ok(Flow::Skip)
            }
            ExpressionKind::Subscript => {
                set.insert(text_of(node, self.source));
                self.walk_field(node, "index", set)?;
                Ok(Flow::Skip)
            }
            ExpressionKind::Call => {
                self.walk_field(node, "arguments", set)?;
                Ok(Flow::Skip)
            }
            ExpressionKind::Cast => {
                // The operand is the last child; the type descriptor is skipped.
                let operand = node.field("value").or_else(|| node.children().last().copied());
                if let Some(operand) = operand {
                    walk_one(operand, self, set)?;
                }
                Ok(Flow::Skip)
            }
            ExpressionKind::Sizeof => {
                self.walk_field(node, "value", set)?;
                Ok(Flow::Skip)
            }
            ExpressionKind::Pointer => Ok(Flow::Skip),
            ExpressionKind::CompoundLiteral | ExpressionKind::Literal => Ok(Flow::Skip),
            ExpressionKind::Conditional
            | ExpressionKind::Assignment
            | ExpressionKind::Binary
            | ExpressionKind::Unary
            | ExpressionKind::Update
            | ExpressionKind::Parenthesized => Ok(Flow::Descend),
            ExpressionKind::Unhandled(kind) => {
                set.note_unhandled(node, kind);
                Ok(Flow::Descend)
            }
        }
    }
}

/// Collects assignment and increment targets.
struct WriteCollector<'src> {
    source: &'src str,
}

impl<'src> WriteCollector<'src> {
    fn add_lvalue<N: SyntaxNode>(&mut self, lvalue: N, set: &mut AccessSet) -> Result<()> {
        match ExpressionKind::classify(lvalue.kind()) {
            Some(ExpressionKind::Identifier | ExpressionKind::Subscript | ExpressionKind::Field) => {
                set.insert(text_of(lvalue, self.source));
            }
            Some(ExpressionKind::Parenthesized) => {
                for inner in lvalue.named_children() {
                    self.add_lvalue(inner, set)?;
                }
            }
            Some(ExpressionKind::Pointer) => {}
            _ => {
                let mut reads = ReadCollector {
                    source: self.source,
                };
                walk_one(lvalue, &mut reads, set)?;
            }
        }
        Ok(())
    }
}

impl<'src, N: SyntaxNode> Visitor<N, AccessSet> for WriteCollector<'src> {
    fn enter(&mut self, node: N, set: &mut AccessSet) -> Result<Flow> {
        match ExpressionKind::classify(node.kind()) {
            Some(ExpressionKind::Assignment) => {
                if let Some(left) = node.field("left") {
                    self.add_lvalue(left, set)?;
                }
            }
            Some(ExpressionKind::Update) => {
                if let Some(argument) = node.field("argument") {
                    self.add_lvalue(argument, set)?;
                }
            }
            Some(ExpressionKind::Unhandled(kind)) => set.note_unhandled(node, kind),
            _ => {}
        }
        Ok(Flow::Descend)
    }
}
