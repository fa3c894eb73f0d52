use crate::frontend::{LexerError, ParserError};

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Unrecognized character in the source text
    Lex(LexerError),
    /// Unbalanced parentheses
    Parse(ParserError),
    /// A form with the wrong shape, e.g. `(set 1 2)` or `(if c t)`
    MalformedForm {
        form: String,
        reason: String,
        hint: Option<String>,
    },
    /// Call to a name that is not in the function table
    UnknownFunction { name: String },
    /// Call with the wrong number of arguments
    ArityMismatch {
        name: String,
        expected: String,
        found: usize,
    },
    /// Second definition of an existing function
    Redefinition { name: String },
    /// A value that does not fit its target field
    OutOfRange {
        what: String,
        value: i128,
        hint: Option<String>,
    },
    /// A symbolic operand with no layout address
    UnresolvedSymbol { name: String },
    /// Internal compiler error (shouldn't happen in normal use)
    Internal(String),
}

impl CompileError {
    pub fn malformed(form: impl Into<String>, reason: impl Into<String>) -> Self {
        CompileError::MalformedForm {
            form: form.into(),
            reason: reason.into(),
            hint: None,
        }
    }

    pub fn malformed_with_hint(
        form: impl Into<String>,
        reason: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        CompileError::MalformedForm {
            form: form.into(),
            reason: reason.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn unknown_function(name: &str) -> Self {
        CompileError::UnknownFunction {
            name: name.to_string(),
        }
    }

    pub fn arity(name: &str, expected: impl Into<String>, found: usize) -> Self {
        CompileError::ArityMismatch {
            name: name.to_string(),
            expected: expected.into(),
            found,
        }
    }

    pub fn redefinition(name: &str) -> Self {
        CompileError::Redefinition {
            name: name.to_string(),
        }
    }

    pub fn out_of_range_with_hint(
        what: impl Into<String>,
        value: impl Into<i128>,
        hint: impl Into<String>,
    ) -> Self {
        CompileError::OutOfRange {
            what: what.into(),
            value: value.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn unresolved(name: &str) -> Self {
        CompileError::UnresolvedSymbol {
            name: name.to_string(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }

    /// Taxonomy bucket: lexical, syntax, semantic or internal.
    pub fn category(&self) -> &'static str {
        match self {
            CompileError::Lex(_) => "lexical",
            CompileError::Parse(_) | CompileError::MalformedForm { .. } => "syntax",
            CompileError::UnknownFunction { .. }
            | CompileError::ArityMismatch { .. }
            | CompileError::Redefinition { .. }
            | CompileError::OutOfRange { .. }
            | CompileError::UnresolvedSymbol { .. } => "semantic",
            CompileError::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compile error: ")?;
        match self {
            CompileError::Lex(e) => write!(f, "{}", e),
            CompileError::Parse(e) => write!(f, "{}", e),
            CompileError::MalformedForm { form, reason, hint } => {
                write!(f, "malformed '{}': {}", form, reason)?;
                if let Some(h) = hint {
                    write!(f, "\n  hint: {}", h)?;
                }
                Ok(())
            }
            CompileError::UnknownFunction { name } => write!(f, "unknown function '{}'", name),
            CompileError::ArityMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "'{}' expects {} argument(s), got {}",
                name, expected, found
            ),
            CompileError::Redefinition { name } => {
                write!(f, "function '{}' is already defined", name)
            }
            CompileError::OutOfRange { what, value, hint } => {
                write!(f, "{} {} is out of range", what, value)?;
                if let Some(h) = hint {
                    write!(f, "\n  hint: {}", h)?;
                }
                Ok(())
            }
            CompileError::UnresolvedSymbol { name } => write!(f, "unresolved symbol '{}'", name),
            CompileError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<LexerError> for CompileError {
    fn from(e: LexerError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParserError> for CompileError {
    fn from(e: ParserError) -> Self {
        CompileError::Parse(e)
    }
}
