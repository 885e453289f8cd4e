/*!
# Trace Records

One JSON object per observation, written by the instrumented program to
`stderr`. Three record shapes exist: a call to an error function, the
completion of an expression statement, and a branch decision.

The live values are not encoded separately. The `assumption` field carries
one `%d` directive per captured variable, and the `fprintf` call that prints
the record passes the variables as its extra arguments, so the C runtime
substitutes the values into the JSON text while writing it.

A `%` in the rendered source text is not escaped. `fprintf` would read a
literal percent sign in a statement as another directive; the instrumenter
logs a warning when that happens.
*/

use serde::{Deserialize, Serialize};

use crate::errors::Result;

use super::access::AccessSet;

/// Which way a branch went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Control {
    ConditionTrue,
    ConditionFalse,
}

/// The call site of an error function was reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCallRecord {
    pub sourcecode: String,
    pub startline: usize,
    pub endline: usize,
}

/// An expression statement completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub sourcecode: String,
    pub startline: usize,
    pub endline: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumption: Option<String>,
    #[serde(
        default,
        rename = "assumption.scope",
        skip_serializing_if = "Option::is_none"
    )]
    pub assumption_scope: Option<String>,
}

/// A branch or loop condition was decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub sourcecode: String,
    pub startline: usize,
    pub endline: usize,
    pub control: Control,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumption: Option<String>,
    #[serde(
        default,
        rename = "assumption.scope",
        skip_serializing_if = "Option::is_none"
    )]
    pub assumption_scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TraceRecord {
    ErrorCall(ErrorCallRecord),
    Statement(StatementRecord),
    Branch(BranchRecord),
}

impl TraceRecord {
    pub fn error_call(source_text: &str, startline: usize, endline: usize) -> Self {
        Self::ErrorCall(ErrorCallRecord {
            sourcecode: html_escape(source_text),
            startline,
            endline,
        })
    }

    pub fn statement(
        source_text: &str,
        startline: usize,
        endline: usize,
        captures: &AccessSet,
        scope: &[String],
    ) -> Self {
        let (assumption, assumption_scope) = assumption_fields(captures, scope);
        Self::Statement(StatementRecord {
            sourcecode: html_escape(source_text),
            startline,
            endline,
            assumption,
            assumption_scope,
        })
    }

    /// `condition` is rendered as `[cond]`, or `[!(cond)]` for the false branch.
    pub fn branch(
        condition: &str,
        control: Control,
        startline: usize,
        endline: usize,
        captures: &AccessSet,
        scope: &[String],
    ) -> Self {
        let rendered = match control {
            Control::ConditionTrue => format!("[{condition}]"),
            Control::ConditionFalse => format!("[!({condition})]"),
        };
        let (assumption, assumption_scope) = assumption_fields(captures, scope);
        Self::Branch(BranchRecord {
            sourcecode: html_escape(&rendered),
            startline,
            endline,
            control,
            assumption,
            assumption_scope,
        })
    }

    pub fn sourcecode(&self) -> &str {
        match self {
            Self::ErrorCall(r) => &r.sourcecode,
            Self::Statement(r) => &r.sourcecode,
            Self::Branch(r) => &r.sourcecode,
        }
    }
}

fn assumption_fields(captures: &AccessSet, scope: &[String]) -> (Option<String>, Option<String>) {
    if captures.is_empty() {
        return (None, None);
    }
    let clauses: String = captures.iter().map(|var| format!("{var} == (%d);")).collect();
    (Some(clauses), Some(scope.join(".")))
}

/// Render `record` as a C statement that prints it, one line, to `stderr`.
pub fn render(record: &TraceRecord, captures: &AccessSet) -> Result<String> {
    let json = serde_json::to_string(record)?;
    let arguments: String = captures.iter().map(|var| format!(", {var}")).collect();
    Ok(format!(
        "\nfprintf(stderr, \"{}\\n\"{arguments});\n",
        c_string_body(&json)
    ))
}

fn c_string_body(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escape markup-sensitive characters the way the witness consumer expects.
pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}
