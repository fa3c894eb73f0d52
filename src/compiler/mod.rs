pub mod codegen;
pub mod compile_error;
pub mod context;
pub mod layout;
pub mod statement;
pub mod stdlib;

use tracing::debug;

pub use codegen::{CodeGen, Instr, Operand};
pub use compile_error::CompileError;
pub use context::{FuncContext, FuncInfo, ProgramContext};
pub use statement::{Analyzer, Callee, CompareOp, MathOp, Statement};

use crate::frontend::{Ast, Lexer};
use crate::isa::{Arch, Code, Opcode};

/// Result of translating one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub code: Code,
    pub source_lines: usize,
}

/// Compiles source text into a laid-out, fully resolved program.
pub fn translate(source: &str, arch: Arch) -> Result<Translation, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    debug!("lexed {} tokens", tokens.len());
    let ast = Ast::build(tokens)?;

    let mut program = ProgramContext::new(arch);
    let statements = Analyzer::new(&ast, &mut program).analyze()?;
    debug!("analyzed {} top-level forms", statements.len());

    let mut start = CodeGen::new(&mut program).generate(&statements)?;
    start.push(Instr::new(Opcode::Halt));

    let code = layout::link(&program, start)?;
    debug!(
        "linked {} instructions, {} data words, functions: {:?}",
        code.len(),
        code.data_len(),
        program.required()
    );

    Ok(Translation {
        code,
        source_lines: source.lines().count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_counts_lines() {
        let t = translate("(printline)\n\n(printc 65)\n", Arch::Bits32).unwrap();
        assert_eq!(t.source_lines, 3);
        assert_eq!(t.code.text.last().unwrap().terms.len(), 4);
    }

    #[test]
    fn test_translate_empty_program_halts() {
        let t = translate("# nothing\n", Arch::Bits32).unwrap();
        assert_eq!(t.code.len(), 2);
        assert_eq!(t.code.text[1].terms[0].op, Opcode::Halt);
    }

    #[test]
    fn test_errors_keep_their_phase() {
        let err = translate("(printc @)", Arch::Bits32).unwrap_err();
        assert!(matches!(err, CompileError::Lex(_)));

        let err = translate("(printc 1", Arch::Bits32).unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));

        let err = translate("(nope)", Arch::Bits32).unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction { .. }));
    }
}
