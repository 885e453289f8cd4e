/*!
# Visitor Composition

Several independent analyses walk the same tree in a single depth-first,
left-to-right pass. At every node each analysis gets its `enter` hook in
declared order; if any of them answers `Flow::Skip` the whole composition
leaves that subtree alone. `leave` hooks run for every entered node, skipped
or not, in the same declared order.

Analyses never talk to each other through return values. They share one
mutable context `C` passed to every hook, so state written by an earlier
analysis (the location cursor, say) is visible to later ones at the same node.
*/

use crate::errors::Result;
use crate::syntax::SyntaxNode;

/// Whether the traversal should descend into the children of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Descend,
    Skip,
}

/// One analysis taking part in a traversal
pub trait Visitor<N: SyntaxNode, C> {
    fn enter(&mut self, node: N, cx: &mut C) -> Result<Flow>;

    fn leave(&mut self, node: N, cx: &mut C) -> Result<()> {
        let _ = (node, cx);
        Ok(())
    }
}

enum Step<N> {
    Enter(N),
    Leave(N),
}

/// Walk `root` with every visitor in `visitors`, sharing `cx`.
///
/// The first error from any hook aborts the walk.
pub fn walk<N: SyntaxNode, C>(
    root: N,
    visitors: &mut [&mut dyn Visitor<N, C>],
    cx: &mut C,
) -> Result<()> {
    let mut stack = vec![Step::Enter(root)];

    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(node) => {
                let mut flow = Flow::Descend;
                for visitor in visitors.iter_mut() {
                    if visitor.enter(node, cx)? == Flow::Skip {
                        flow = Flow::Skip;
                    }
                }

                stack.push(Step::Leave(node));
                if flow == Flow::Descend {
                    stack.extend(node.children().into_iter().rev().map(Step::Enter));
                }
            }
            Step::Leave(node) => {
                for visitor in visitors.iter_mut() {
                    visitor.leave(node, cx)?;
                }
            }
        }
    }

    Ok(())
}

/// Walk `root` with a single visitor
pub fn walk_one<'v, N, C, V>(root: N, visitor: &'v mut V, cx: &mut C) -> Result<()>
where
    N: SyntaxNode,
    V: Visitor<N, C> + 'v,
{
    walk(root, &mut [visitor as &mut (dyn Visitor<N, C> + 'v)], cx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::testing::{FakeNode, FakeTree};

    /// Records `+kind` on entry and `-kind` on exit
    struct Recorder {
        name: &'static str,
        skip: Option<&'static str>,
    }

    impl<'t> Visitor<FakeNode<'t>, Vec<String>> for Recorder {
        fn enter(&mut self, node: FakeNode<'t>, cx: &mut Vec<String>) -> Result<Flow> {
            cx.push(format!("{}+{}", self.name, node.kind()));
            if self.skip == Some(node.kind()) {
                return Ok(Flow::Skip);
            }
            Ok(Flow::Descend)
        }

        fn leave(&mut self, node: FakeNode<'t>, cx: &mut Vec<String>) -> Result<()> {
            cx.push(format!("{}-{}", self.name, node.kind()));
            Ok(())
        }
    }

    fn sample_tree() -> (FakeTree, usize) {
        let mut tree = FakeTree::new();
        let a = tree.add("a", (0, 0), (0, 1), vec![]);
        let b = tree.add("b", (0, 2), (0, 3), vec![]);
        let inner = tree.add("inner", (0, 2), (0, 5), vec![b]);
        let root = tree.add("root", (0, 0), (0, 5), vec![a, inner]);
        (tree, root)
    }

    #[test]
    fn test_pre_and_post_order() {
        let (tree, root) = sample_tree();
        let mut log = Vec::new();
        let mut recorder = Recorder {
            name: "r",
            skip: None,
        };
        walk_one(tree.node(root), &mut recorder, &mut log).unwrap();

        assert_eq!(
            log,
            vec!["r+root", "r+a", "r-a", "r+inner", "r+b", "r-b", "r-inner", "r-root"]
        );
    }

    #[test]
    fn test_skip_applies_to_whole_composition() {
        let (tree, root) = sample_tree();
        let mut log = Vec::new();
        let mut first = Recorder {
            name: "x",
            skip: None,
        };
        let mut second = Recorder {
            name: "y",
            skip: Some("inner"),
        };
        let mut visitors: [&mut dyn Visitor<FakeNode<'_>, Vec<String>>; 2] = [&mut first, &mut second];
        walk(tree.node(root), &mut visitors, &mut log).unwrap();

        assert!(log.contains(&"x+inner".to_string()));
        assert!(log.contains(&"x-inner".to_string()));
        assert!(!log.iter().any(|entry| entry.ends_with("+b")));

        let enter_x = log.iter().position(|e| e == "x+root").unwrap();
        let enter_y = log.iter().position(|e| e == "y+root").unwrap();
        assert!(enter_x < enter_y);
    }
}
