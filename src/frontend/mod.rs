pub mod ast;
pub mod lexer;
pub mod parser_error;
pub mod token;
pub mod token_dumper;

pub use ast::{Ast, AstNode, NodeId};
pub use lexer::{Lexer, LexerError};
pub use parser_error::ParserError;
pub use token::{Token, TokenKind};
