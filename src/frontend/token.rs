/// Lexical category of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `(` or `)`
    Paren,
    /// `set`, `if`, `loop`
    Special,
    /// `=`, `>`, `>=`
    Compare,
    /// Optionally signed decimal integer
    Int,
    /// `+`, `-`, `*`, `/`, `mod`
    Math,
    /// `defun`
    Defun,
    /// Double-quoted string, quotes and escapes kept verbatim
    Str,
    /// Name of a built-in library routine
    Func,
    /// Any other word
    Ident,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Paren => "paren",
            TokenKind::Special => "special",
            TokenKind::Compare => "compare",
            TokenKind::Int => "int",
            TokenKind::Math => "math",
            TokenKind::Defun => "defun",
            TokenKind::Str => "string",
            TokenKind::Func => "builtin",
            TokenKind::Ident => "ident",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Character offset of the first character in the source.
    pub pos: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            pos,
        }
    }

    pub fn is_open(&self) -> bool {
        self.kind == TokenKind::Paren && self.text == "("
    }

    pub fn is_close(&self) -> bool {
        self.kind == TokenKind::Paren && self.text == ")"
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}' at {}", self.kind.name(), self.text, self.pos)
    }
}
