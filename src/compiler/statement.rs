use crate::compiler::compile_error::CompileError;
use crate::compiler::context::ProgramContext;
use crate::frontend::{Ast, NodeId, Token, TokenKind};
use crate::isa::{Address, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl MathOp {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "+" => Some(MathOp::Add),
            "-" => Some(MathOp::Sub),
            "*" => Some(MathOp::Mul),
            "/" => Some(MathOp::Div),
            "mod" => Some(MathOp::Mod),
            _ => None,
        }
    }

    pub fn opcode(self) -> Opcode {
        match self {
            MathOp::Add => Opcode::Add,
            MathOp::Sub => Opcode::Subtract,
            MathOp::Mul => Opcode::Multiply,
            MathOp::Div => Opcode::Divide,
            MathOp::Mod => Opcode::Modulo,
        }
    }

    /// `+` and `*` fold any number of operands; the rest are binary.
    pub fn is_variadic(self) -> bool {
        matches!(self, MathOp::Add | MathOp::Mul)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Ge,
}

impl CompareOp {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "=" => Some(CompareOp::Eq),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    /// Branch taken when the comparison holds.
    pub fn jump(self) -> Opcode {
        match self {
            CompareOp::Eq => Opcode::JumpEqual,
            CompareOp::Gt => Opcode::JumpGreater,
            CompareOp::Ge => Opcode::JumpGreaterEqual,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// `args = [Reference(var), value]`
    Set,
    /// `args = [cond, then, else]`
    If,
    /// `args = [body]`
    Loop,
    /// `args = [body]`
    Defun { name: String, params: Vec<String> },
    Math(MathOp),
    Compare(CompareOp),
    /// Built-in or user function
    Func(String),
}

/// Typed intermediate form between the parenthesis tree and instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Invoke { callee: Callee, args: Vec<Statement> },
    /// Literal that fits the immediate operand field
    Value(i64),
    /// Literal placed in the integer-constant pool
    IntConst(i64),
    StrConst(String),
    /// Argument or variable read
    Reference(String),
}

impl Statement {
    fn invoke(callee: Callee, args: Vec<Statement>) -> Self {
        Statement::Invoke { callee, args }
    }
}

/// Lowers the parenthesis tree into [`Statement`]s, filling the program's
/// function table and constant pools on the way.
pub struct Analyzer<'a> {
    ast: &'a Ast,
    program: &'a mut ProgramContext,
    /// Parameters of the function whose body is being lowered
    params: Option<Vec<String>>,
}

impl<'a> Analyzer<'a> {
    pub fn new(ast: &'a Ast, program: &'a mut ProgramContext) -> Self {
        Self {
            ast,
            program,
            params: None,
        }
    }

    /// Lowers every top-level form. Only parenthesized forms may appear at
    /// the top level.
    pub fn analyze(&mut self) -> Result<Vec<Statement>, CompileError> {
        let ast: &'a Ast = self.ast;
        let mut statements = Vec::new();
        for &form in ast.forms() {
            if let Some(token) = self.leaf(form) {
                return Err(CompileError::malformed_with_hint(
                    token.text.clone(),
                    format!("bare {} at top level", token.kind.name()),
                    "only parenthesized forms may appear at the top level",
                ));
            }
            statements.push(self.form(form, true)?);
        }
        Ok(statements)
    }

    fn statement(&mut self, id: NodeId) -> Result<Statement, CompileError> {
        match self.leaf(id) {
            Some(token) => self.atom(token),
            None => self.form(id, false),
        }
    }

    /// The node's token if it is a leaf rather than a group.
    fn leaf(&self, id: NodeId) -> Option<&'a Token> {
        let ast: &'a Ast = self.ast;
        ast.token(id).filter(|t| !t.is_open())
    }

    fn atom(&mut self, token: &Token) -> Result<Statement, CompileError> {
        match token.kind {
            TokenKind::Int => self.integer(&token.text),
            TokenKind::Str => {
                let text = unescape(&token.text)?;
                self.program.require_str_const(&text);
                Ok(Statement::StrConst(text))
            }
            TokenKind::Ident => Ok(Statement::Reference(token.text.clone())),
            TokenKind::Func => Err(CompileError::malformed_with_hint(
                token.text.clone(),
                "built-in routine used as a value",
                format!("call it: ({} ...)", token.text),
            )),
            _ => Err(CompileError::malformed(
                token.text.clone(),
                "keyword used as a value",
            )),
        }
    }

    fn integer(&mut self, text: &str) -> Result<Statement, CompileError> {
        let value: i64 = text.parse().map_err(|_| {
            CompileError::out_of_range_with_hint(
                "integer literal",
                text.parse::<i128>().unwrap_or_default(),
                "literals must fit a 64-bit signed integer",
            )
        })?;

        if Address::imm(value).fits_operand() {
            Ok(Statement::Value(value))
        } else {
            self.program.require_int_const(value)?;
            Ok(Statement::IntConst(value))
        }
    }

    fn form(&mut self, id: NodeId, top_level: bool) -> Result<Statement, CompileError> {
        let ast: &'a Ast = self.ast;
        let children = ast.children(id);
        let Some((&head, rest)) = children.split_first() else {
            return Err(CompileError::malformed("()", "empty form"));
        };
        let Some(token) = self.leaf(head) else {
            return Err(CompileError::malformed(
                ast.render(head),
                "expected an operator or function name in head position",
            ));
        };
        let name = token.text.as_str();

        match token.kind {
            TokenKind::Special => match name {
                "set" => self.set(rest),
                "if" => {
                    expect_args(name, rest, 3)?;
                    Ok(Statement::invoke(Callee::If, self.args(rest)?))
                }
                _ => {
                    expect_args(name, rest, 1)?;
                    Ok(Statement::invoke(Callee::Loop, self.args(rest)?))
                }
            },
            TokenKind::Defun if top_level => self.defun(rest),
            TokenKind::Defun => Err(CompileError::malformed_with_hint(
                "defun",
                "function definitions cannot appear inside expressions",
                "definitions must be at the top level",
            )),
            TokenKind::Math => {
                let op = MathOp::parse(name)
                    .ok_or_else(|| CompileError::internal(format!("unknown operator '{}'", name)))?;
                if op.is_variadic() {
                    if rest.is_empty() {
                        return Err(CompileError::arity(name, "at least 1", 0));
                    }
                } else {
                    expect_args(name, rest, 2)?;
                }
                Ok(Statement::invoke(Callee::Math(op), self.args(rest)?))
            }
            TokenKind::Compare => {
                let op = CompareOp::parse(name)
                    .ok_or_else(|| CompileError::internal(format!("unknown comparison '{}'", name)))?;
                expect_args(name, rest, 2)?;
                Ok(Statement::invoke(Callee::Compare(op), self.args(rest)?))
            }
            TokenKind::Func | TokenKind::Ident => {
                let argc = self
                    .program
                    .func_info(name)
                    .map(|info| info.argc)
                    .ok_or_else(|| CompileError::unknown_function(name))?;
                expect_args(name, rest, argc)?;
                Ok(Statement::invoke(
                    Callee::Func(name.to_string()),
                    self.args(rest)?,
                ))
            }
            TokenKind::Int | TokenKind::Str | TokenKind::Paren => Err(CompileError::malformed(
                ast.render(id),
                "a literal cannot be called",
            )),
        }
    }

    fn args(&mut self, ids: &[NodeId]) -> Result<Vec<Statement>, CompileError> {
        ids.iter().map(|&id| self.statement(id)).collect()
    }

    fn set(&mut self, rest: &[NodeId]) -> Result<Statement, CompileError> {
        expect_args("set", rest, 2)?;
        let name = match self.leaf(rest[0]) {
            Some(token) if token.kind == TokenKind::Ident => token.text.clone(),
            _ => {
                return Err(CompileError::malformed_with_hint(
                    "set",
                    format!("expected a variable name, got {}", self.ast.render(rest[0])),
                    "(set name value)",
                ));
            }
        };

        let is_param = self
            .params
            .as_ref()
            .is_some_and(|params| params.contains(&name));
        if !is_param {
            self.program.require_variable(&name);
        }

        let value = self.statement(rest[1])?;
        Ok(Statement::invoke(
            Callee::Set,
            vec![Statement::Reference(name), value],
        ))
    }

    fn defun(&mut self, rest: &[NodeId]) -> Result<Statement, CompileError> {
        const USAGE: &str = "(defun name (arg ...) body)";

        if rest.len() != 3 {
            return Err(CompileError::malformed_with_hint(
                "defun",
                format!("expected name, argument list and body, got {} part(s)", rest.len()),
                USAGE,
            ));
        }

        let name = match self.leaf(rest[0]) {
            Some(token) if token.kind == TokenKind::Ident => token.text.clone(),
            Some(token) if token.kind == TokenKind::Func => {
                return Err(CompileError::redefinition(&token.text));
            }
            _ => {
                return Err(CompileError::malformed_with_hint(
                    "defun",
                    format!("expected a function name, got {}", self.ast.render(rest[0])),
                    USAGE,
                ));
            }
        };

        if self.leaf(rest[1]).is_some() {
            return Err(CompileError::malformed_with_hint(
                "defun",
                format!("expected an argument list for '{}'", name),
                USAGE,
            ));
        }
        let ast: &'a Ast = self.ast;
        let mut params: Vec<String> = Vec::new();
        for &id in ast.children(rest[1]) {
            match self.leaf(id) {
                Some(token) if token.kind == TokenKind::Ident => {
                    if params.contains(&token.text) {
                        return Err(CompileError::malformed(
                            "defun",
                            format!("duplicate argument '{}' in '{}'", token.text, name),
                        ));
                    }
                    params.push(token.text.clone());
                }
                _ => {
                    return Err(CompileError::malformed_with_hint(
                        "defun",
                        format!("argument '{}' is not an identifier", self.ast.render(id)),
                        USAGE,
                    ));
                }
            }
        }

        self.program.define_func(&name, params.len())?;

        self.params = Some(params.clone());
        let body = self.statement(rest[2]);
        self.params = None;

        Ok(Statement::invoke(Callee::Defun { name, params }, vec![body?]))
    }
}

fn expect_args(name: &str, args: &[NodeId], count: usize) -> Result<(), CompileError> {
    if args.len() != count {
        return Err(CompileError::arity(name, count.to_string(), args.len()));
    }
    Ok(())
}

/// Decodes backslash escapes in a string literal.
pub fn unescape(raw: &str) -> Result<String, CompileError> {
    let bad = |what: &str| CompileError::malformed(format!("\"{}\"", raw), what.to_string());

    let mut out = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err(bad("dangling backslash"));
        };
        let decoded = match esc {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                u8::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == 2)
                    .map(char::from)
                    .ok_or_else(|| bad("invalid \\x escape"))?
            }
            'u' => {
                let hex: String = if chars.clone().next() == Some('{') {
                    chars.next();
                    let inner: String = chars.by_ref().take_while(|&c| c != '}').collect();
                    inner
                } else {
                    chars.by_ref().take(4).collect()
                };
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| bad("invalid \\u escape"))?
            }
            other => return Err(bad(&format!("unknown escape '\\{}'", other))),
        };
        out.push(decoded);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::Lexer;
    use crate::isa::Arch;

    fn analyze(source: &str) -> Result<(Vec<Statement>, ProgramContext), CompileError> {
        let ast = Ast::build(Lexer::new(source).tokenize()?)?;
        let mut program = ProgramContext::new(Arch::Bits32);
        let statements = Analyzer::new(&ast, &mut program).analyze()?;
        Ok((statements, program))
    }

    fn analyze_err(source: &str) -> CompileError {
        analyze(source).unwrap_err()
    }

    #[test]
    fn test_math_and_literals() {
        let (stmts, _) = analyze("(+ 1 x \"s\")").unwrap();
        assert_eq!(
            stmts,
            vec![Statement::invoke(
                Callee::Math(MathOp::Add),
                vec![
                    Statement::Value(1),
                    Statement::Reference("x".to_string()),
                    Statement::StrConst("s".to_string()),
                ]
            )]
        );
    }

    #[test]
    fn test_large_integers_go_to_the_pool() {
        let (stmts, program) = analyze("(printi 524288) (printi -524288)").unwrap();
        let Statement::Invoke { args, .. } = &stmts[0] else {
            panic!("expected invoke");
        };
        assert_eq!(args[0], Statement::IntConst(524288));
        let Statement::Invoke { args, .. } = &stmts[1] else {
            panic!("expected invoke");
        };
        assert_eq!(args[0], Statement::Value(-524288));
        assert_eq!(program.int_consts(), [524288]);
    }

    #[test]
    fn test_integer_too_wide_for_arch() {
        let err = analyze_err("(printi 8589934592)");
        assert!(matches!(err, CompileError::OutOfRange { .. }));

        let err = analyze_err("(printi 99999999999999999999)");
        assert!(matches!(err, CompileError::OutOfRange { .. }));
    }

    #[test]
    fn test_set_registers_variable() {
        let (stmts, program) = analyze("(set x 5)").unwrap();
        assert_eq!(program.variables(), ["x"]);
        assert_eq!(
            stmts[0],
            Statement::invoke(
                Callee::Set,
                vec![Statement::Reference("x".to_string()), Statement::Value(5)]
            )
        );
    }

    #[test]
    fn test_set_on_argument_is_not_a_variable() {
        let (_, program) = analyze("(defun f (a) (set a 1))").unwrap();
        assert!(program.variables().is_empty());
    }

    #[test]
    fn test_defun_registers_before_body() {
        let (stmts, program) =
            analyze("(defun fact (n) (if (= n 0) 1 (* n (fact (- n 1)))))").unwrap();
        assert_eq!(program.func_info("fact").unwrap().argc, 1);
        let Statement::Invoke {
            callee: Callee::Defun { name, params },
            args,
        } = &stmts[0]
        else {
            panic!("expected defun");
        };
        assert_eq!(name, "fact");
        assert_eq!(params, &["n".to_string()]);
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_special_form_arity() {
        assert!(matches!(
            analyze_err("(if 1 2)"),
            CompileError::ArityMismatch { found: 2, .. }
        ));
        assert!(matches!(
            analyze_err("(loop)"),
            CompileError::ArityMismatch { found: 0, .. }
        ));
        assert!(matches!(
            analyze_err("(set x)"),
            CompileError::ArityMismatch { .. }
        ));
        assert!(matches!(
            analyze_err("(set 1 2)"),
            CompileError::MalformedForm { .. }
        ));
    }

    #[test]
    fn test_operator_arity() {
        assert!(analyze("(+ 1)").is_ok());
        assert!(analyze("(* 1 2 3 4)").is_ok());
        assert!(matches!(
            analyze_err("(+)"),
            CompileError::ArityMismatch { .. }
        ));
        assert!(matches!(
            analyze_err("(- 1 2 3)"),
            CompileError::ArityMismatch { .. }
        ));
        assert!(matches!(
            analyze_err("(mod 1)"),
            CompileError::ArityMismatch { .. }
        ));
        assert!(matches!(
            analyze_err("(>= 1)"),
            CompileError::ArityMismatch { .. }
        ));
    }

    #[test]
    fn test_calls_are_checked() {
        assert!(matches!(
            analyze_err("(foo 1)"),
            CompileError::UnknownFunction { .. }
        ));
        assert!(matches!(
            analyze_err("(printc 1 2)"),
            CompileError::ArityMismatch { found: 2, .. }
        ));
        assert!(matches!(
            analyze_err("(defun f (a b) a) (f 1)"),
            CompileError::ArityMismatch { found: 1, .. }
        ));
    }

    #[test]
    fn test_call_before_definition_is_unknown() {
        assert!(matches!(
            analyze_err("(f) (defun f () 1)"),
            CompileError::UnknownFunction { .. }
        ));
    }

    #[test]
    fn test_defun_errors() {
        assert!(matches!(
            analyze_err("(defun f (a a) a)"),
            CompileError::MalformedForm { .. }
        ));
        assert!(matches!(
            analyze_err("(defun f () 1) (defun f () 2)"),
            CompileError::Redefinition { .. }
        ));
        assert!(matches!(
            analyze_err("(defun print (s) s)"),
            CompileError::Redefinition { .. }
        ));
        assert!(matches!(
            analyze_err("(defun f a a)"),
            CompileError::MalformedForm { .. }
        ));
        assert!(matches!(
            analyze_err("(printi (defun g () 1))"),
            CompileError::MalformedForm { .. }
        ));
    }

    #[test]
    fn test_top_level_must_be_forms() {
        let err = analyze_err("(printline) 42");
        assert_eq!(err.category(), "syntax");
        assert!(err.to_string().contains("top level"));
    }

    #[test]
    fn test_bad_heads() {
        assert!(matches!(
            analyze_err("()"),
            CompileError::MalformedForm { .. }
        ));
        assert!(matches!(
            analyze_err("((f) 1)"),
            CompileError::MalformedForm { .. }
        ));
        assert!(matches!(
            analyze_err("(1 2)"),
            CompileError::MalformedForm { .. }
        ));
        assert!(matches!(
            analyze_err("(printi print)"),
            CompileError::MalformedForm { .. }
        ));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"a\nb\t\"q\"\\"#).unwrap(), "a\nb\t\"q\"\\");
        assert_eq!(unescape(r"\x41\u{263A}é").unwrap(), "A\u{263A}\u{e9}");
        assert!(unescape(r"\q").is_err());
        assert!(unescape(r"\x4").is_err());
    }
}
