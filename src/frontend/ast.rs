use crate::frontend::parser_error::ParserError;
use crate::frontend::token::{Token, TokenKind};

/// Index of a node in an [`Ast`] arena.
pub type NodeId = usize;

/// One node of the parenthesis tree.
///
/// A parenthesized group carries its `(` token and owns its contents as
/// children. Any other token is a leaf. `parent` is navigation only.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub token: Option<Token>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Parenthesis tree stored as an arena. Node `ROOT` is a virtual node
/// holding the top-level forms.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    nodes: Vec<AstNode>,
}

impl Ast {
    pub const ROOT: NodeId = 0;

    /// Builds the tree from a token sequence. String tokens lose their
    /// surrounding quotes on the way in.
    pub fn build(tokens: Vec<Token>) -> Result<Ast, ParserError> {
        let mut ast = Ast {
            nodes: vec![AstNode {
                token: None,
                parent: None,
                children: Vec::new(),
            }],
        };
        let mut cursor = Ast::ROOT;

        for mut token in tokens {
            if token.is_open() {
                cursor = ast.push(cursor, token);
            } else if token.is_close() {
                cursor = ast.nodes[cursor]
                    .parent
                    .ok_or_else(|| ParserError::new("unbalanced ')'", token.pos))?;
            } else {
                if token.kind == TokenKind::Str {
                    token.text = strip_quotes(&token.text).to_string();
                }
                ast.push(cursor, token);
            }
        }

        if cursor != Ast::ROOT {
            let pos = ast.nodes[cursor].token.as_ref().map_or(0, |t| t.pos);
            return Err(ParserError::new("unclosed '('", pos));
        }

        Ok(ast)
    }

    fn push(&mut self, parent: NodeId, token: Token) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(AstNode {
            token: Some(token),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn token(&self, id: NodeId) -> Option<&Token> {
        self.nodes[id].token.as_ref()
    }

    /// Top-level forms, in source order.
    pub fn forms(&self) -> &[NodeId] {
        self.children(Ast::ROOT)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Renders a subtree back to S-expression text.
    pub fn render(&self, id: NodeId) -> String {
        let node = &self.nodes[id];
        match &node.token {
            Some(token) if token.is_open() || id == Ast::ROOT => {
                let inner: Vec<_> = node.children.iter().map(|&c| self.render(c)).collect();
                format!("({})", inner.join(" "))
            }
            Some(token) if token.kind == TokenKind::Str => format!("\"{}\"", token.text),
            Some(token) => token.text.clone(),
            None => {
                let inner: Vec<_> = node.children.iter().map(|&c| self.render(c)).collect();
                inner.join(" ")
            }
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}
