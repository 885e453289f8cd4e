//! Closed sets of the tree-sitter-c node kinds the instrumentation dispatches on.

/// Statement-level constructs seen by the instrumentation pass.
///
/// `classify` returns `None` for kinds outside the statement family
/// (declarations, expressions, tokens); those are walked silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind<'a> {
    FunctionDefinition,
    ExpressionStatement,
    If,
    For,
    While,
    Do,
    Switch,
    Compound,
    Attributed,
    Labeled,
    Return,
    Goto,
    Continue,
    Break,
    /// Any other `*_statement` kind
    Unhandled(&'a str),
}

impl<'a> StatementKind<'a> {
    pub fn classify(kind: &'a str) -> Option<Self> {
        let classified = match kind {
            "function_definition" => Self::FunctionDefinition,
            "expression_statement" => Self::ExpressionStatement,
            "if_statement" => Self::If,
            "for_statement" => Self::For,
            "while_statement" => Self::While,
            "do_statement" => Self::Do,
            "switch_statement" => Self::Switch,
            "compound_statement" => Self::Compound,
            "attributed_statement" => Self::Attributed,
            "labeled_statement" => Self::Labeled,
            "return_statement" => Self::Return,
            "goto_statement" => Self::Goto,
            "continue_statement" => Self::Continue,
            "break_statement" => Self::Break,
            other if other.ends_with("statement") => Self::Unhandled(other),
            _ => return None,
        };
        Some(classified)
    }
}

/// Expression-level constructs seen by the variable access analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind<'a> {
    Identifier,
    Call,
    Subscript,
    Conditional,
    Assignment,
    Binary,
    Unary,
    Update,
    Cast,
    Pointer,
    Sizeof,
    Field,
    CompoundLiteral,
    Parenthesized,
    /// Numbers, strings, chars, booleans and `NULL`
    Literal,
    /// Any other `*_expression` kind
    Unhandled(&'a str),
}

impl<'a> ExpressionKind<'a> {
    pub fn classify(kind: &'a str) -> Option<Self> {
        let classified = match kind {
            "identifier" => Self::Identifier,
            "call_expression" => Self::Call,
            "subscript_expression" => Self::Subscript,
            "conditional_expression" => Self::Conditional,
            "assignment_expression" => Self::Assignment,
            "binary_expression" => Self::Binary,
            "unary_expression" => Self::Unary,
            "update_expression" => Self::Update,
            "cast_expression" => Self::Cast,
            "pointer_expression" => Self::Pointer,
            "sizeof_expression" => Self::Sizeof,
            "field_expression" => Self::Field,
            "compound_literal_expression" => Self::CompoundLiteral,
            "parenthesized_expression" => Self::Parenthesized,
            "number_literal" | "string_literal" | "char_literal" | "concatenated_string"
            | "true" | "false" | "null" => Self::Literal,
            other if other.ends_with("expression") => Self::Unhandled(other),
            _ => return None,
        };
        Some(classified)
    }
}
