/// A parenthesis-structure error.
///
/// `pos` is the character offset of the token that broke the structure, or
/// of the last unclosed `(` when the input ends early.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserError {
    pub message: String,
    pub pos: usize,
}

impl ParserError {
    pub fn new(message: impl Into<String>, pos: usize) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at {}: {}", self.pos, self.message)
    }
}

impl std::error::Error for ParserError {}
