use crate::frontend::token::{Token, TokenKind};

pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints token text verbatim
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Token]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Token]) -> String {
        tokens.iter().map(|t| self.render_one(t) + "\n").collect()
    }

    fn render_one(&self, t: &Token) -> String {
        let kind = self.kind(t.kind);
        let colr = if self.color { self.color(t.kind) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        if self.show_debug_repr {
            format!("[{:04}] {}{:<8} {:?}{}", t.pos, colr, kind, t.text, reset)
        } else {
            format!("[{:04}] {}{:<8} {}{}", t.pos, colr, kind, t.text, reset)
        }
    }

    fn kind(&self, kind: TokenKind) -> &'static str {
        match kind {
            TokenKind::Paren => "PAREN",
            TokenKind::Int => "INT",
            TokenKind::Str => "STRING",
            TokenKind::Ident => "IDENT",
            TokenKind::Math => "OP",
            TokenKind::Compare => "CMP",
            TokenKind::Func => "BUILTIN",
            // everything else = keyword
            TokenKind::Special | TokenKind::Defun => "KEYWORD",
        }
    }

    fn color(&self, kind: TokenKind) -> &'static str {
        match kind {
            TokenKind::Paren => Self::DIM,
            TokenKind::Str => Self::GRN,
            TokenKind::Int => Self::CYN,
            TokenKind::Ident => Self::YEL,
            TokenKind::Math | TokenKind::Compare => Self::MAG,
            _ => Self::RESET,
        }
    }
}
