//! Tracks the coordinate of the most recently entered or exited node.

use crate::errors::{InstrumentError, Result};
use crate::syntax::SyntaxNode;
use crate::visitor::{Flow, Visitor};

use super::TraceContext;

/// Keeps `TraceContext::cursor` in step with the traversal.
///
/// Entering a node that starts before the cursor means the tree's ranges are
/// out of order; that aborts the file.
#[derive(Debug, Default)]
pub struct LocationTracker;

impl<'src, N: SyntaxNode> Visitor<N, TraceContext<'src>> for LocationTracker {
    fn enter(&mut self, node: N, cx: &mut TraceContext<'src>) -> Result<Flow> {
        let start = node.start();
        if start < cx.cursor {
            return Err(InstrumentError::out_of_order(node.kind(), start, cx.cursor));
        }
        cx.cursor = start;
        Ok(Flow::Descend)
    }

    fn leave(&mut self, node: N, cx: &mut TraceContext<'src>) -> Result<()> {
        cx.cursor = node.end();
        Ok(())
    }
}
