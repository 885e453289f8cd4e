/*!
# Tracer - C Instrumentation Engine

Rewrites a C translation unit so that, when compiled and executed, it prints
a JSON observation to `stderr` for every executed expression statement and
every branch decision.

## Pipeline

1. `pretransform::mask` hides constructs the parser rejects
2. `CParser` builds a tree-sitter tree of the masked text
3. `LocationTracker` and `Instrumenter` walk the tree together, sharing one
   `TraceContext`, and collect insertion patches
4. `reconstruct` splices the patches into the masked text
5. `MaskedSource::restore` puts the hidden constructs back

The original text is never edited in place; every change is an insertion.

## Example Usage

```rust,no_run
use cwitness_core::{FileTracer, InstrumentConfig};

let mut tracer = FileTracer::new(InstrumentConfig::default());
tracer.transform_file("program.c", "program-instrumented.c")?;
# Ok::<(), anyhow::Error>(())
```
*/

pub mod access;
pub mod file_tracer;
pub mod instrumenter;
pub mod location;
pub mod reconstruct;
pub mod record;

use std::fmt;

use tracing::debug;

use crate::errors::Result;
use crate::position::{Coordinate, Patch};
use crate::pretransform::{self, MaskedSource};
use crate::syntax::{CParser, SyntaxNode};
use crate::visitor::{walk, Visitor};
use crate::InstrumentConfig;

// Re-export main types
pub use access::{collect_reads, collect_writes, AccessSet};
pub use file_tracer::{instrumented_path, FileTracer, InstrumentationSummary};
pub use instrumenter::Instrumenter;
pub use location::LocationTracker;
pub use reconstruct::{reconstruct, Reconstruction};
pub use record::{Control, TraceRecord};

/// A non-fatal note about a construct that was left uninstrumented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: String,
    pub at: Coordinate,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: &str, at: Coordinate, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            at,
            message: message.into(),
        }
    }

    pub fn unhandled(kind: &str, at: Coordinate) -> Self {
        Self::new(kind, at, format!("no instrumentation for {kind}"))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.at, self.kind, self.message)
    }
}

/// State shared by every analysis during one traversal
#[derive(Debug)]
pub struct TraceContext<'src> {
    pub source: &'src str,
    /// Coordinate of the most recently entered or exited node
    pub cursor: Coordinate,
    /// Names of the enclosing function definitions, outermost first
    pub scope: Vec<String>,
    pub patches: Vec<Patch>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'src> TraceContext<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            cursor: Coordinate::ORIGIN,
            scope: Vec::new(),
            patches: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn note(&mut self, diagnostic: Diagnostic) {
        debug!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    pub fn absorb(&mut self, access: &mut AccessSet) {
        for diagnostic in access.diagnostics.drain(..) {
            self.note(diagnostic);
        }
    }
}

/// Patches and notes produced by one traversal
#[derive(Debug, Clone, Default)]
pub struct TreeInstrumentation {
    pub patches: Vec<Patch>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run location tracking and instrumentation over any syntax tree.
pub fn instrument_tree<N: SyntaxNode>(
    root: N,
    source: &str,
    config: &InstrumentConfig,
) -> Result<TreeInstrumentation> {
    let mut cx = TraceContext::new(source);
    let mut location = LocationTracker;
    let mut instrumenter = Instrumenter::new(config);

    let mut visitors: [&mut dyn Visitor<N, TraceContext<'_>>; 2] = [&mut location, &mut instrumenter];
    walk(root, &mut visitors, &mut cx)?;

    Ok(TreeInstrumentation {
        patches: cx.patches,
        diagnostics: cx.diagnostics,
    })
}

/// Result of instrumenting one C source text
#[derive(Debug, Clone)]
pub struct Instrumented {
    /// Final C source, header included
    pub code: String,
    /// Insertions in emission order, in the coordinates of the masked text
    pub patches: Vec<Patch>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Instrument a complete C translation unit.
pub fn instrument_source(source: &str, config: &InstrumentConfig) -> Result<Instrumented> {
    let masked = if config.mask_extensions {
        pretransform::mask(source)?
    } else {
        MaskedSource::unmasked(source)
    };

    let mut parser = CParser::new()?;
    let tree = parser.parse(masked.text())?;
    let traced = instrument_tree(tree.root_node(), masked.text(), config)?;

    let reconstruction = reconstruct(masked.text(), traced.patches.clone())?;
    let restored = masked.restore(&reconstruction.text, config.restore_policy)?;

    Ok(Instrumented {
        code: format!("{}{}", config.header, restored),
        patches: traced.patches,
        diagnostics: traced.diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InstrumentError;
    use crate::syntax::testing::FakeTree;

    #[test]
    fn test_crafted_out_of_order_tree_aborts() {
        let mut tree = FakeTree::new();
        let second = tree.add("expression_statement", (3, 0), (3, 6), vec![]);
        let first = tree.add("expression_statement", (1, 0), (1, 6), vec![]);
        let body = tree.add("compound_statement", (0, 0), (4, 1), vec![second, first]);
        let root = tree.add("translation_unit", (0, 0), (5, 0), vec![body]);

        let err = instrument_tree(tree.node(root), "", &InstrumentConfig::default()).unwrap_err();
        assert!(matches!(err, InstrumentError::OutOfOrder { .. }));
        assert!(err.is_internal());
    }

    #[test]
    fn test_crafted_error_function_is_skipped() {
        // reach_error() { x = 1; }
        let source = "reach_error() { x = 1; }";
        let mut tree = FakeTree::new();
        let name = tree.add("identifier", (0, 0), (0, 11), vec![]);
        tree.with_bytes(name, 0..11);
        let declarator = tree.add("function_declarator", (0, 0), (0, 13), vec![name]);
        tree.with_field(declarator, "declarator", name);
        let statement = tree.add("expression_statement", (0, 16), (0, 22), vec![]);
        tree.with_bytes(statement, 16..22);
        let body = tree.add("compound_statement", (0, 14), (0, 24), vec![statement]);
        let function = tree.add("function_definition", (0, 0), (0, 24), vec![declarator, body]);
        tree.with_field(function, "declarator", declarator);
        tree.with_field(function, "body", body);
        let root = tree.add("translation_unit", (0, 0), (0, 24), vec![function]);

        let traced = instrument_tree(tree.node(root), source, &InstrumentConfig::default()).unwrap();
        assert!(traced.patches.is_empty());
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::unhandled("case_statement", Coordinate::new(2, 4));
        assert_eq!(diagnostic.to_string(), "2:4 (case_statement): no instrumentation for case_statement");
    }
}
