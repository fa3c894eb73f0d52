use crate::compiler::compile_error::CompileError;
use crate::compiler::context::{ACC_RESIDENT, FuncContext, ProgramContext};
use crate::compiler::statement::{Callee, CompareOp, MathOp, Statement};
use crate::compiler::stdlib;
use crate::isa::{Address, Opcode};

/// An instruction operand before layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Already concrete
    Addr(Address),
    /// Entry point of a function, absolute
    Func(String),
    /// Address of a string constant, immediate
    Str(String),
    /// Cell of a pooled integer constant, absolute
    IntConst(i64),
    /// Cell of a named variable, absolute
    Var(String),
    /// Address of an anonymous buffer, immediate
    Anon(String),
}

/// An instruction whose operand may still be symbolic.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub op: Opcode,
    pub arg: Option<Operand>,
    pub desc: Option<String>,
}

impl Instr {
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            arg: None,
            desc: None,
        }
    }

    pub fn with(op: Opcode, addr: Address) -> Self {
        Self::sym(op, Operand::Addr(addr))
    }

    pub fn sym(op: Opcode, arg: Operand) -> Self {
        Self {
            op,
            arg: Some(arg),
            desc: None,
        }
    }

    pub fn describe(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }
}

/// Lowers statements to instructions.
///
/// Inside a function body the generator carries the body's [`FuncContext`]
/// and keeps its displacements in step with every push and pop it emits.
/// The accumulator-resident argument is spilled to the stack before any
/// code that would overwrite the accumulator.
pub struct CodeGen<'a> {
    program: &'a mut ProgramContext,
    frame: Option<FuncContext>,
}

impl<'a> CodeGen<'a> {
    pub fn new(program: &'a mut ProgramContext) -> Self {
        Self {
            program,
            frame: None,
        }
    }

    pub fn with_frame(mut self, frame: FuncContext) -> Self {
        self.frame = Some(frame);
        self
    }

    pub fn generate(&mut self, statements: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        let mut code = Vec::new();
        for stmt in statements {
            code.extend(self.statement(stmt)?);
        }
        Ok(code)
    }

    /// Generates a function body and its epilogue.
    fn function_body(mut self, body: &Statement) -> Result<Vec<Instr>, CompileError> {
        let mut code = self.statement(body)?;
        if self.frame.as_ref().is_some_and(FuncContext::has_slot_at_top) {
            self.pop_discard(&mut code);
        }
        code.push(Instr::new(Opcode::Return));
        Ok(code)
    }

    fn statement(&mut self, stmt: &Statement) -> Result<Vec<Instr>, CompileError> {
        match stmt {
            Statement::Value(v) => Ok(self.load(Instr::with(Opcode::Load, Address::imm(*v)))),
            Statement::IntConst(v) => Ok(self.load(Instr::sym(Opcode::Load, Operand::IntConst(*v)))),
            Statement::StrConst(s) => {
                Ok(self.load(Instr::sym(Opcode::Load, Operand::Str(s.clone()))))
            }
            Statement::Reference(name) => Ok(self.reference(name)),
            Statement::Invoke { callee, args } => self.invoke(callee, args),
        }
    }

    fn invoke(&mut self, callee: &Callee, args: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        match callee {
            Callee::Set => self.set(args),
            Callee::If => self.if_else(args),
            Callee::Loop => self.repeat(args),
            Callee::Defun { name, params } => self.defun(name, params, args),
            Callee::Math(op) => self.math(*op, args),
            Callee::Compare(op) => self.compare(*op, args),
            Callee::Func(name) => match name.as_str() {
                stdlib::PRINTI => self.call_printi(args),
                stdlib::READLINE => self.call_readline(),
                _ => self.call(name, args),
            },
        }
    }

    // =========================================================================
    // stack bookkeeping
    // =========================================================================

    fn push(&mut self, code: &mut Vec<Instr>) {
        code.push(Instr::new(Opcode::Push));
        if let Some(frame) = &mut self.frame {
            frame.on_push();
        }
    }

    fn pop(&mut self, code: &mut Vec<Instr>) {
        code.push(Instr::new(Opcode::Pop));
        if let Some(frame) = &mut self.frame {
            frame.on_pop();
        }
    }

    fn pop_discard(&mut self, code: &mut Vec<Instr>) {
        code.push(Instr::new(Opcode::PopDiscard));
        if let Some(frame) = &mut self.frame {
            frame.on_pop();
        }
    }

    /// Pushes the accumulator-resident argument, if any.
    fn spill(&mut self, code: &mut Vec<Instr>) {
        if self.frame.as_ref().and_then(FuncContext::acc_resident).is_some() {
            self.push(code);
        }
    }

    fn displacement(&self, name: &str) -> Option<i64> {
        self.frame.as_ref()?.displacement(name)
    }

    // =========================================================================
    // loads
    // =========================================================================

    fn load(&mut self, instr: Instr) -> Vec<Instr> {
        let mut code = Vec::new();
        self.spill(&mut code);
        code.push(instr);
        code
    }

    fn reference(&mut self, name: &str) -> Vec<Instr> {
        if self.displacement(name) == Some(ACC_RESIDENT) {
            return Vec::new();
        }

        let mut code = Vec::new();
        self.spill(&mut code);
        match self.displacement(name) {
            Some(disp) => code.push(
                Instr::with(Opcode::Load, Address::spr(disp)).describe(format!("'{}' argument", name)),
            ),
            None => code.push(Instr::sym(Opcode::Load, Operand::Var(name.to_string()))),
        }
        code
    }

    // =========================================================================
    // special forms
    // =========================================================================

    fn set(&mut self, args: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        let [Statement::Reference(name), value] = args else {
            return Err(CompileError::internal("set expects a name and a value"));
        };

        let mut code = self.statement(value)?;
        match self.displacement(name) {
            Some(ACC_RESIDENT) => {}
            Some(disp) => code.push(
                Instr::with(Opcode::Store, Address::spr(disp)).describe(format!("'{}' argument", name)),
            ),
            None => code.push(Instr::sym(Opcode::Store, Operand::Var(name.clone()))),
        }
        Ok(code)
    }

    fn if_else(&mut self, args: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        let [cond, then, otherwise] = args else {
            return Err(CompileError::internal("if expects three arguments"));
        };

        let mut code = Vec::new();
        self.spill(&mut code);
        code.extend(self.statement(cond)?);
        let mut then_code = self.statement(then)?;
        let else_code = self.statement(otherwise)?;

        then_code.push(Instr::with(
            Opcode::Jump,
            Address::ipr(else_code.len() as i64 + 1),
        ));
        code.push(Instr::with(Opcode::Compare, Address::imm(0)));
        code.push(Instr::with(
            Opcode::JumpEqual,
            Address::ipr(then_code.len() as i64 + 1),
        ));
        code.extend(then_code);
        code.extend(else_code);
        Ok(code)
    }

    fn repeat(&mut self, args: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        let [body] = args else {
            return Err(CompileError::internal("loop expects one argument"));
        };

        let mut code = Vec::new();
        self.spill(&mut code);
        let body_code = self.statement(body)?;
        let back = -(body_code.len() as i64);
        code.extend(body_code);
        code.push(Instr::with(Opcode::Jump, Address::ipr(back)));
        Ok(code)
    }

    fn defun(
        &mut self,
        name: &str,
        params: &[String],
        args: &[Statement],
    ) -> Result<Vec<Instr>, CompileError> {
        let [body] = args else {
            return Err(CompileError::internal("defun expects one body"));
        };

        let code = CodeGen::new(&mut *self.program)
            .with_frame(FuncContext::new(params))
            .function_body(body)?;
        self.program.implement_func(name, code)?;
        Ok(Vec::new())
    }

    // =========================================================================
    // operators
    // =========================================================================

    /// Folds operands right to left through the top-of-stack slot.
    fn math(&mut self, op: MathOp, args: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        let Some((last, rest)) = args.split_last() else {
            return Err(CompileError::internal("operator without operands"));
        };

        let mut code = Vec::new();
        self.spill(&mut code);
        code.extend(self.statement(last)?);
        self.push(&mut code);
        for arg in rest.iter().rev() {
            code.extend(self.statement(arg)?);
            code.push(Instr::with(op.opcode(), Address::spr(0)));
            code.push(Instr::with(Opcode::Store, Address::spr(0)));
        }
        self.pop(&mut code);
        Ok(code)
    }

    fn compare(&mut self, op: CompareOp, args: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        let [left, right] = args else {
            return Err(CompileError::internal("comparison expects two operands"));
        };

        let mut code = Vec::new();
        self.spill(&mut code);
        code.extend(self.statement(right)?);
        self.push(&mut code);
        code.extend(self.statement(left)?);
        code.push(Instr::with(Opcode::Compare, Address::spr(0)));
        self.pop_discard(&mut code);
        code.push(Instr::with(op.jump(), Address::ipr(3)));
        code.push(Instr::with(Opcode::Load, Address::imm(0)));
        code.push(Instr::with(Opcode::Jump, Address::ipr(2)));
        code.push(Instr::with(Opcode::Load, Address::imm(1)));
        Ok(code)
    }

    // =========================================================================
    // calls
    // =========================================================================

    /// Pushes arguments after the first right to left, loads the first into
    /// the accumulator, calls, and drops the pushed slots.
    fn call(&mut self, name: &str, args: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        self.program.require_func(name)?;

        let mut code = Vec::new();
        self.spill(&mut code);
        if let Some((first, rest)) = args.split_first() {
            for arg in rest.iter().rev() {
                code.extend(self.statement(arg)?);
                self.push(&mut code);
            }
            code.extend(self.statement(first)?);
        }
        code.push(Instr::sym(Opcode::Call, Operand::Func(name.to_string())));
        for _ in args.iter().skip(1) {
            self.pop_discard(&mut code);
        }
        Ok(code)
    }

    /// `printi` takes its scratch buffer as a hidden stack argument.
    fn call_printi(&mut self, args: &[Statement]) -> Result<Vec<Instr>, CompileError> {
        let [value] = args else {
            return Err(CompileError::arity(stdlib::PRINTI, "1", args.len()));
        };
        self.program.require_func(stdlib::PRINTI)?;
        let buffer = self.program.require_anon(stdlib::PRINTI_BUFFER);

        let mut code = Vec::new();
        self.spill(&mut code);
        code.push(Instr::sym(Opcode::Load, Operand::Anon(buffer)));
        self.push(&mut code);
        code.extend(self.statement(value)?);
        code.push(Instr::sym(
            Opcode::Call,
            Operand::Func(stdlib::PRINTI.to_string()),
        ));
        self.pop_discard(&mut code);
        Ok(code)
    }

    /// `readline` fills a fresh buffer whose address arrives in the accumulator.
    fn call_readline(&mut self) -> Result<Vec<Instr>, CompileError> {
        self.program.require_func(stdlib::READLINE)?;
        let buffer = self.program.require_anon(stdlib::READLINE_BUFFER);

        let mut code = Vec::new();
        self.spill(&mut code);
        code.push(Instr::sym(Opcode::Load, Operand::Anon(buffer)));
        code.push(Instr::sym(
            Opcode::Call,
            Operand::Func(stdlib::READLINE.to_string()),
        ));
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use expect_test::{Expect, expect};

    use super::*;
    use crate::compiler::statement::Analyzer;
    use crate::frontend::{Ast, Lexer};
    use crate::isa::Arch;

    fn generate(source: &str) -> (Vec<Instr>, ProgramContext) {
        let ast = Ast::build(Lexer::new(source).tokenize().unwrap()).unwrap();
        let mut program = ProgramContext::new(Arch::Bits32);
        let stmts = Analyzer::new(&ast, &mut program).analyze().unwrap();
        let code = CodeGen::new(&mut program).generate(&stmts).unwrap();
        (code, program)
    }

    fn render(code: &[Instr]) -> String {
        code.iter()
            .map(|instr| {
                let mut line = instr.op.to_string();
                match &instr.arg {
                    Some(Operand::Addr(a)) => line += &format!(" {}", a),
                    Some(other) => line += &format!(" {:?}", other),
                    None => {}
                }
                if let Some(desc) = &instr.desc {
                    line += &format!(" ({})", desc);
                }
                line + "\n"
            })
            .collect()
    }

    fn check(source: &str, expect: Expect) {
        expect.assert_eq(&render(&generate(source).0));
    }

    fn check_func(source: &str, name: &str, expect: Expect) {
        let (_, program) = generate(source);
        expect.assert_eq(&render(&program.func_info(name).unwrap().code));
    }

    #[test]
    fn test_math_folds_through_stack() {
        check(
            "(- 10 3)",
            expect![[r#"
                ld #0x3
                push
                ld #0xa
                sub *spr
                st *spr
                pop
            "#]],
        );
    }

    #[test]
    fn test_variadic_add() {
        check(
            "(+ 1 2 3)",
            expect![[r#"
                ld #0x3
                push
                ld #0x2
                add *spr
                st *spr
                ld #0x1
                add *spr
                st *spr
                pop
            "#]],
        );
    }

    #[test]
    fn test_compare_materializes_boolean() {
        check(
            "(> x 2)",
            expect![[r#"
                ld #0x2
                push
                ld Var("x")
                cmp *spr
                popn
                jmg *ipr+0x3
                ld #0x0
                jmp *ipr+0x2
                ld #0x1
            "#]],
        );
    }

    #[test]
    fn test_if_offsets() {
        check(
            "(if 1 (printc 65) 7)",
            expect![[r#"
                ld #0x1
                cmp #0x0
                jme *ipr+0x4
                ld #0x41
                call Func("printc")
                jmp *ipr+0x2
                ld #0x7
            "#]],
        );
    }

    #[test]
    fn test_loop_jumps_back_over_body() {
        check(
            "(loop (printc 65))",
            expect![[r#"
                ld #0x41
                call Func("printc")
                jmp *ipr-0x2
            "#]],
        );
    }

    #[test]
    fn test_set_and_constants() {
        check(
            r#"(set s "hi") (set big 1000000)"#,
            expect![[r#"
                ld Str("hi")
                st Var("s")
                ld IntConst(1000000)
                st Var("big")
            "#]],
        );
    }

    #[test]
    fn test_builtin_call_sites() {
        check(
            "(printi 5) (readline) (printline)",
            expect![[r#"
                ld Anon("anon$0")
                push
                ld #0x5
                call Func("printi")
                popn
                ld Anon("anon$1")
                call Func("readline")
                call Func("printline")
            "#]],
        );
    }

    #[test]
    fn test_defun_emits_nothing_in_place() {
        let (code, program) = generate("(defun id (x) x)");
        assert!(code.is_empty());
        assert!(program.required().is_empty());
        assert_eq!(program.func_info("id").unwrap().code.len(), 1);
    }

    #[test]
    fn test_acc_resident_argument_needs_no_load() {
        check_func("(defun id (x) x)", "id", expect![[r#"
            ret
        "#]]);
    }

    #[test]
    fn test_argument_is_spilled_before_clobbering() {
        check_func(
            "(defun inc (n) (+ n 1))",
            "inc",
            expect![[r#"
                push
                ld #0x1
                push
                ld *spr+0x1 ('n' argument)
                add *spr
                st *spr
                pop
                popn
                ret
            "#]],
        );
    }

    #[test]
    fn test_stack_arguments() {
        check_func(
            "(defun sub2 (a b) (- a b)) (printi (sub2 5 3))",
            "sub2",
            expect![[r#"
                push
                ld *spr+0x2 ('b' argument)
                push
                ld *spr+0x1 ('a' argument)
                sub *spr
                st *spr
                pop
                popn
                ret
            "#]],
        );
    }

    #[test]
    fn test_call_with_stack_arguments() {
        check(
            "(defun sub2 (a b) (- a b)) (sub2 5 3)",
            expect![[r#"
                ld #0x3
                push
                ld #0x5
                call Func("sub2")
                popn
            "#]],
        );
    }

    #[test]
    fn test_set_argument_in_place() {
        check_func(
            "(defun f (a b) (set b a))",
            "f",
            expect![[r#"
                st *spr+0x1 ('b' argument)
                ret
            "#]],
        );
    }

    #[test]
    fn test_recursive_function() {
        check_func(
            "(defun fact (n) (if (= n 0) 1 (* n (fact (- n 1)))))",
            "fact",
            expect![[r#"
                push
                ld #0x0
                push
                ld *spr+0x1 ('n' argument)
                cmp *spr
                popn
                jme *ipr+0x3
                ld #0x0
                jmp *ipr+0x2
                ld #0x1
                cmp #0x0
                jme *ipr+0x3
                ld #0x1
                jmp *ipr+0xd
                ld #0x1
                push
                ld *spr+0x1 ('n' argument)
                sub *spr
                st *spr
                pop
                call Func("fact")
                push
                ld *spr+0x1 ('n' argument)
                mul *spr
                st *spr
                pop
                popn
                ret
            "#]],
        );
    }
}
