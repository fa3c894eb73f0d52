use crate::compiler::stdlib;
use crate::frontend::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct LexerError {
    pub message: String,
    /// Character offset of the offending character.
    pub pos: usize,
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for LexerError {}

/// Single-pass scanner for the S-expression surface syntax.
///
/// Whitespace and `#` comments are recognized and dropped. Any character that
/// starts no token stops the scan with an error.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn error(&self, message: String) -> LexerError {
        LexerError {
            message,
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Reads a quoted string. The token keeps both quotes and any escape
    /// sequences exactly as written.
    fn read_string(&mut self) -> Result<String, LexerError> {
        let start = LexerError {
            message: "unterminated string literal".to_string(),
            pos: self.pos,
            line: self.line,
            col: self.col,
        };

        let mut text = String::new();
        text.push('"');
        self.advance();

        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    text.push('"');
                    return Ok(text);
                }
                Some('\\') => {
                    text.push('\\');
                    self.advance();
                    match self.current() {
                        Some('\n') | None => return Err(start),
                        Some(ch) => {
                            text.push(ch);
                            self.advance();
                        }
                    }
                }
                Some('\n') | None => return Err(start),
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_number(&mut self) -> String {
        let mut digits = String::new();
        if self.current() == Some('-') {
            digits.push('-');
            self.advance();
        }
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        digits
    }

    fn read_word(&mut self) -> (TokenKind, String) {
        let mut word = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let kind = match word.as_str() {
            "set" | "if" | "loop" => TokenKind::Special,
            "mod" => TokenKind::Math,
            "defun" => TokenKind::Defun,
            name if stdlib::is_builtin(name) => TokenKind::Func,
            _ => TokenKind::Ident,
        };
        (kind, word)
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.current() {
            let pos = self.pos;

            match ch {
                ' ' | '\n' | '\t' | '\r' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                '(' | ')' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::Paren, ch, pos));
                }
                '"' => {
                    let text = self.read_string()?;
                    tokens.push(Token::new(TokenKind::Str, text, pos));
                }
                '=' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::Compare, "=", pos));
                }
                '>' => {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        tokens.push(Token::new(TokenKind::Compare, ">=", pos));
                    } else {
                        tokens.push(Token::new(TokenKind::Compare, ">", pos));
                    }
                }
                '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                    let text = self.read_number();
                    tokens.push(Token::new(TokenKind::Int, text, pos));
                }
                c if c.is_ascii_digit() => {
                    let text = self.read_number();
                    tokens.push(Token::new(TokenKind::Int, text, pos));
                }
                '+' | '-' | '*' | '/' => {
                    self.advance();
                    tokens.push(Token::new(TokenKind::Math, ch, pos));
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let (kind, text) = self.read_word();
                    tokens.push(Token::new(kind, text, pos));
                }
                _ => {
                    return Err(self.error(format!("illegal character: {:?}", ch)));
                }
            }
        }

        Ok(tokens)
    }
}
