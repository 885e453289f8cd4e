/*!
# Instrumenter

Decides, per statement kind, which observations to print and where.

- Expression statements get a post-statement observation capturing the
  locations they write. A direct call to an error function additionally gets
  an observation before the call.
- `if`, `for`, `while` and `do` bodies are wrapped in braces when they are not
  blocks already, and get a condition-true observation as their first
  statement. `else` branches get the matching condition-false observation;
  loops get theirs once, right after the loop.
- Definitions of error functions are not instrumented at all.
*/

use tracing::warn;

use crate::errors::Result;
use crate::position::{Coordinate, Patch};
use crate::syntax::{text_of, StatementKind, SyntaxNode};
use crate::visitor::{Flow, Visitor};
use crate::InstrumentConfig;

use super::access::{collect_reads, collect_writes, AccessSet};
use super::record::{render, Control, TraceRecord};
use super::{Diagnostic, TraceContext};

const OPEN_BLOCK: &str = "{\n";
const CLOSE_BLOCK: &str = "\n}";

pub struct Instrumenter<'cfg> {
    config: &'cfg InstrumentConfig,
}

impl<'cfg> Instrumenter<'cfg> {
    pub fn new(config: &'cfg InstrumentConfig) -> Self {
        Self { config }
    }

    /// Queue a print of `record` at `at`, or at the traversal cursor.
    fn emit(
        &self,
        cx: &mut TraceContext<'_>,
        at: Option<Coordinate>,
        record: TraceRecord,
        captures: &AccessSet,
    ) -> Result<()> {
        let at = at.unwrap_or(cx.cursor);
        if record.sourcecode().contains('%') {
            warn!(
                "source text at {at} contains '%'; the printed trace line will be corrupted: {}",
                record.sourcecode()
            );
        }
        let text = render(&record, captures)?;
        cx.patches.push(Patch::new(at, text));
        Ok(())
    }

    // Functions -----------------------------------------------------------

    fn enter_function<N: SyntaxNode>(&self, node: N, cx: &mut TraceContext<'_>) -> Flow {
        let name = function_name(node, cx.source);
        let flow = if self.config.is_error_function(&name) {
            Flow::Skip
        } else {
            Flow::Descend
        };
        cx.scope.push(name);
        flow
    }

    // Expression statements -----------------------------------------------

    fn enter_expression_statement<N: SyntaxNode>(
        &self,
        node: N,
        cx: &mut TraceContext<'_>,
    ) -> Result<()> {
        if !self.calls_error_function(node, cx.source) {
            return Ok(());
        }
        let record = TraceRecord::error_call(
            text_of(node, cx.source),
            node.start().display_line(),
            node.end().display_line(),
        );
        self.emit(cx, None, record, &AccessSet::new())
    }

    fn leave_expression_statement<N: SyntaxNode>(
        &self,
        node: N,
        cx: &mut TraceContext<'_>,
    ) -> Result<()> {
        let mut written = collect_writes(node, cx.source)?;
        cx.absorb(&mut written);

        let record = TraceRecord::statement(
            text_of(node, cx.source),
            node.start().display_line(),
            node.end().display_line(),
            &written,
            &cx.scope,
        );
        self.emit(cx, None, record, &written)
    }

    fn calls_error_function<N: SyntaxNode>(&self, statement: N, source: &str) -> bool {
        statement
            .children()
            .first()
            .filter(|expr| expr.kind() == "call_expression")
            .and_then(|call| call.field("function"))
            .is_some_and(|callee| self.config.is_error_function(text_of(callee, source)))
    }

    // Branches --------------------------------------------------------------

    /// Print the outcome of `condition` at `at`. Targets mentioning a name in
    /// `out_of_scope` are not captured.
    fn observe_branch<N: SyntaxNode>(
        &self,
        condition: N,
        control: Control,
        at: Coordinate,
        out_of_scope: &[String],
        cx: &mut TraceContext<'_>,
    ) -> Result<()> {
        let mut reads = collect_reads(condition, cx.source)?;
        cx.absorb(&mut reads);
        reads.forget(out_of_scope);

        let record = TraceRecord::branch(
            text_of(condition, cx.source),
            control,
            condition.start().display_line(),
            condition.end().display_line(),
            &reads,
            &cx.scope,
        );
        self.emit(cx, Some(at), record, &reads)
    }

    fn enter_if<N: SyntaxNode>(&self, node: N, cx: &mut TraceContext<'_>) -> Result<()> {
        let Some(condition) = node.field("condition") else {
            return Ok(());
        };

        if let Some(consequence) = node.field("consequence") {
            open_block(consequence, cx);
            self.observe_branch(condition, Control::ConditionTrue, entry_point(consequence), &[], cx)?;
        }
        if let Some(alternative) = alternative_branch(node) {
            open_block(alternative, cx);
            self.observe_branch(condition, Control::ConditionFalse, entry_point(alternative), &[], cx)?;
        }
        Ok(())
    }

    fn leave_if<N: SyntaxNode>(&self, node: N, cx: &mut TraceContext<'_>) {
        if let Some(consequence) = node.field("consequence") {
            close_block(consequence, cx);
        }
        if let Some(alternative) = alternative_branch(node) {
            close_block(alternative, cx);
        }
    }

    fn enter_loop<N: SyntaxNode>(&self, node: N, cx: &mut TraceContext<'_>) -> Result<()> {
        let Some(body) = loop_body(node) else {
            return Ok(());
        };
        open_block(body, cx);

        match node.field("condition") {
            Some(condition) => {
                self.observe_branch(condition, Control::ConditionTrue, entry_point(body), &[], cx)
            }
            None => {
                cx.note(Diagnostic::new(
                    node.kind(),
                    node.start(),
                    "loop without a condition; no branch observations",
                ));
                Ok(())
            }
        }
    }

    /// Close a synthetic block and record the loop exit. `exit` is where
    /// control arrives once the condition fails; variables declared in a
    /// `for` initializer are gone by then and are not captured.
    fn leave_loop<N: SyntaxNode>(&self, node: N, exit: Coordinate, cx: &mut TraceContext<'_>) -> Result<()> {
        if let Some(body) = loop_body(node) {
            close_block(body, cx);
        }
        let Some(condition) = node.field("condition") else {
            return Ok(());
        };
        let loop_locals = initializer_names(node, cx.source);
        self.observe_branch(condition, Control::ConditionFalse, exit, &loop_locals, cx)
    }
}

impl<'src, 'cfg, N: SyntaxNode> Visitor<N, TraceContext<'src>> for Instrumenter<'cfg> {
    fn enter(&mut self, node: N, cx: &mut TraceContext<'src>) -> Result<Flow> {
        let Some(kind) = StatementKind::classify(node.kind()) else {
            return Ok(Flow::Descend);
        };
        // Outside a function body only error recovery yields statements.
        if cx.scope.is_empty() && kind != StatementKind::FunctionDefinition {
            return Ok(Flow::Descend);
        }

        match kind {
            StatementKind::FunctionDefinition => return Ok(self.enter_function(node, cx)),
            StatementKind::ExpressionStatement => self.enter_expression_statement(node, cx)?,
            StatementKind::If => self.enter_if(node, cx)?,
            StatementKind::For | StatementKind::While | StatementKind::Do => {
                self.enter_loop(node, cx)?
            }
            StatementKind::Switch => cx.note(Diagnostic::new(
                node.kind(),
                node.start(),
                "switch statements are not instrumented; cases are visited as plain statements",
            )),
            StatementKind::Compound
            | StatementKind::Attributed
            | StatementKind::Labeled
            | StatementKind::Return
            | StatementKind::Goto
            | StatementKind::Continue
            | StatementKind::Break => {}
            StatementKind::Unhandled(kind) => cx.note(Diagnostic::unhandled(kind, node.start())),
        }
        Ok(Flow::Descend)
    }

    fn leave(&mut self, node: N, cx: &mut TraceContext<'src>) -> Result<()> {
        let kind = StatementKind::classify(node.kind());
        if cx.scope.is_empty() && kind != Some(StatementKind::FunctionDefinition) {
            return Ok(());
        }
        match kind {
            Some(StatementKind::FunctionDefinition) => {
                cx.scope.pop();
            }
            Some(StatementKind::ExpressionStatement) => self.leave_expression_statement(node, cx)?,
            Some(StatementKind::If) => self.leave_if(node, cx),
            Some(StatementKind::For | StatementKind::While) => {
                let exit = loop_body(node).map_or(node.end(), |body| body.end());
                self.leave_loop(node, exit, cx)?
            }
            // The body of a do-while ends before `while (...);`, so the exit
            // observation goes after the whole statement.
            Some(StatementKind::Do) => self.leave_loop(node, node.end(), cx)?,
            _ => {}
        }
        Ok(())
    }
}

fn is_block<N: SyntaxNode>(node: N) -> bool {
    node.kind() == "compound_statement"
}

fn open_block<N: SyntaxNode>(body: N, cx: &mut TraceContext<'_>) {
    if !is_block(body) {
        cx.patches.push(Patch::new(body.start(), OPEN_BLOCK));
    }
}

fn close_block<N: SyntaxNode>(body: N, cx: &mut TraceContext<'_>) {
    if !is_block(body) {
        cx.patches.push(Patch::new(body.end(), CLOSE_BLOCK));
    }
}

/// First position inside `body` where a statement can be placed.
fn entry_point<N: SyntaxNode>(body: N) -> Coordinate {
    if is_block(body) {
        body.children()
            .get(1)
            .map_or(body.end(), |first| first.start())
    } else {
        body.start()
    }
}

fn loop_body<N: SyntaxNode>(node: N) -> Option<N> {
    node.field("body").or_else(|| node.children().last().copied())
}

/// The statement of an `else` branch, unwrapping tree-sitter-c's `else_clause`.
fn alternative_branch<N: SyntaxNode>(node: N) -> Option<N> {
    let alternative = node.field("alternative")?;
    if alternative.kind() == "else_clause" {
        alternative.named_children().last().copied()
    } else {
        Some(alternative)
    }
}

/// Declared name of a function definition, looking through pointer and
/// parenthesized declarators.
fn function_name<N: SyntaxNode>(node: N, source: &str) -> String {
    node.field("declarator")
        .and_then(|declarator| declared_name(declarator, source))
        .or_else(|| node.field("declarator").map(|d| text_of(d, source).to_string()))
        .unwrap_or_default()
}

/// Identifier introduced by a declarator such as `*p`, `a[3]` or `x = 0`.
fn declared_name<N: SyntaxNode>(declarator: N, source: &str) -> Option<String> {
    let mut current = Some(declarator);
    while let Some(node) = current {
        if matches!(node.kind(), "identifier" | "field_identifier") {
            return Some(text_of(node, source).to_string());
        }
        current = node
            .field("declarator")
            .or_else(|| node.named_children().first().copied());
    }
    None
}

/// Names declared by the initializer of a `for` loop.
fn initializer_names<N: SyntaxNode>(node: N, source: &str) -> Vec<String> {
    let Some(initializer) = node.field("initializer") else {
        return Vec::new();
    };
    if initializer.kind() != "declaration" {
        return Vec::new();
    }
    initializer
        .named_children()
        .into_iter()
        .filter(|child| {
            matches!(
                child.kind(),
                "identifier"
                    | "init_declarator"
                    | "pointer_declarator"
                    | "array_declarator"
                    | "parenthesized_declarator"
                    | "attributed_declarator"
            )
        })
        .filter_map(|child| declared_name(child, source))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::CParser;
    use crate::tracer::{instrument_tree, reconstruct};
    use pretty_assertions::assert_eq;

    fn instrument(source: &str) -> (String, Vec<Diagnostic>) {
        let mut parser = CParser::new().unwrap();
        let tree = parser.parse(source).unwrap();
        let traced = instrument_tree(tree.root_node(), source, &InstrumentConfig::default()).unwrap();
        let output = reconstruct(source, traced.patches).unwrap();
        (output.text, traced.diagnostics)
    }

    fn trace_lines(output: &str) -> Vec<&str> {
        output
            .lines()
            .filter(|line| line.starts_with("fprintf(stderr"))
            .collect()
    }

    #[test]
    fn test_assignment_statement() {
        let (output, _) = instrument("int main() {\n  x = 1;\n}\n");
        assert_eq!(
            output,
            "int main() {\n  x = 1;\nfprintf(stderr, \"{\\\"sourcecode\\\":\\\"x = 1;\\\",\\\"startline\\\":2,\\\"endline\\\":2,\\\"assumption\\\":\\\"x == (%d);\\\",\\\"assumption.scope\\\":\\\"main\\\"}\\n\", x);\n\n}\n"
        );
    }

    #[test]
    fn test_if_without_else_has_single_observation() {
        let (output, _) = instrument("int main() {\n  if (x > 0) { y = 1; }\n}\n");
        let lines = trace_lines(&output);
        assert_eq!(lines.iter().filter(|l| l.contains("condition-true")).count(), 1);
        assert_eq!(lines.iter().filter(|l| l.contains("condition-false")).count(), 0);
        assert!(output.contains("if (x > 0) { \nfprintf(stderr, \"{\\\"sourcecode\\\":\\\"[(x &gt; 0)]\\\""));
    }

    #[test]
    fn test_if_else_wraps_bare_branches() {
        let (output, _) = instrument("void f() {\n  if (a) b = 1; else b = 2;\n}\n");
        assert!(output.contains("if (a) {\n\nfprintf(stderr, \"{\\\"sourcecode\\\":\\\"[(a)]\\\""));
        assert!(output.contains("else {\n\nfprintf(stderr, \"{\\\"sourcecode\\\":\\\"[!((a))]\\\""));
        assert_eq!(output.matches("\n}").count(), 3);
        let lines = trace_lines(&output);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("condition-true"));
        assert!(lines[1].contains("b = 1;"));
        assert!(lines[2].contains("condition-false"));
        assert!(lines[3].contains("b = 2;"));
    }

    #[test]
    fn test_while_loop_exit_after_body() {
        let (output, _) = instrument("void f() {\n  while (i < n) i++;\n  done();\n}\n");
        let lines = trace_lines(&output);
        assert!(lines[0].contains("condition-true"));
        assert!(lines[0].ends_with(", i, n);"));
        assert!(lines[1].contains("i++;"));
        assert!(lines[2].contains("condition-false"));
        assert!(lines[3].contains("done();"));
        assert!(output.contains("while (i < n) {\n"));
    }

    #[test]
    fn test_for_loop_without_condition() {
        let (output, diagnostics) = instrument("void f() {\n  for (;;) x++;\n}\n");
        assert!(!output.contains("condition-"));
        assert!(output.contains("for (;;) {\n"));
        assert!(diagnostics.iter().any(|d| d.kind == "for_statement"));
    }

    #[test]
    fn test_do_while_exit_after_statement() {
        let (output, _) = instrument("void f() {\n  do { x++; } while (x < 3);\n}\n");
        let exit = output.find("condition-false").unwrap();
        let loop_end = output.find("while (x < 3);").unwrap();
        assert!(loop_end < exit);
        let entry = output.find("condition-true").unwrap();
        assert!(entry < loop_end);
    }

    #[test]
    fn test_error_call_observed_before_and_after() {
        let (output, _) = instrument("int main() {\n  reach_error();\n}\n");
        let lines = trace_lines(&output);
        assert_eq!(lines.len(), 2);
        let call = output.find("\nreach_error();").unwrap();
        let first = output.find("fprintf").unwrap();
        assert!(first < call);
        assert!(!lines[0].contains("assumption"));
    }

    #[test]
    fn test_error_function_body_untouched() {
        let source = "void reach_error() { if (x) { y = 1; } }\n";
        let (output, _) = instrument(source);
        assert_eq!(output, source);
    }

    #[test]
    fn test_switch_is_reported() {
        let (_, diagnostics) = instrument("void f() {\n  switch (x) { case 1: y = 2; break; }\n}\n");
        assert!(diagnostics.iter().any(|d| d.kind == "switch_statement"));
        assert!(diagnostics.iter().any(|d| d.kind == "case_statement"));
    }

    #[test]
    fn test_pointer_declarator_name() {
        let (output, _) = instrument("int *make(void) {\n  p = 0;\n}\n");
        assert!(output.contains("\\\"assumption.scope\\\":\\\"make\\\""));
    }

    #[test]
    fn test_for_exit_drops_loop_locals() {
        let (output, _) = instrument("int f(int n) {\n  int s = 0;\n  for (int i = 0; i < n; i++) s += i;\n  return s;\n}\n");
        let lines = trace_lines(&output);
        let entry = lines.iter().find(|l| l.contains("condition-true")).unwrap();
        assert!(entry.ends_with(", i, n);"));
        let exit = lines.iter().find(|l| l.contains("condition-false")).unwrap();
        assert!(exit.ends_with("\\n\", n);"));
        assert!(!exit.contains("i == (%d)"));
        assert!(exit.contains("n == (%d)"));
    }

    #[test]
    fn test_for_exit_keeps_outer_counter() {
        let (output, _) = instrument("void f(int n) {\n  int i;\n  for (i = 0; i < n; i++) g();\n}\n");
        let exit = trace_lines(&output)
            .into_iter()
            .find(|l| l.contains("condition-false"))
            .unwrap();
        assert!(exit.ends_with(", i, n);"));
    }

    #[test]
    fn test_file_scope_statements_are_not_instrumented() {
        let source = "struct S { int a; } s;\nx;\nint main() {\n  y = 1;\n}\n";
        let (output, _) = instrument(source);
        let first = output.find("fprintf").unwrap();
        assert!(first > output.find("int main()").unwrap());
        assert_eq!(trace_lines(&output).len(), 1);
    }
}
