use std::collections::HashMap;

use crate::compiler::codegen::{Instr, Operand};
use crate::compiler::compile_error::CompileError;
use crate::compiler::context::ProgramContext;
use crate::isa::{Address, Code, DataBlock, INPUT_PORT, OUTPUT_PORT, Opcode, Term, TextBlock};

pub const ENTRY_LABEL: &str = "#";
pub const START_LABEL: &str = "start";

/// Addresses assigned to every symbol of a program.
#[derive(Debug, Default)]
struct Symbols {
    functions: HashMap<String, usize>,
    strings: HashMap<String, usize>,
    ints: HashMap<i64, usize>,
    variables: HashMap<String, usize>,
    anon: HashMap<String, usize>,
}

/// Lays out instruction and data memory and resolves every symbolic operand.
///
/// Text: entry jump, referenced functions in reference order, `start`.
/// Data, right after the text: strings (zero-terminated), integer
/// constants, variables, then anonymous buffers.
pub fn link(program: &ProgramContext, start: Vec<Instr>) -> Result<Code, CompileError> {
    let mut symbols = Symbols::default();

    let mut address = 1;
    let mut bodies: Vec<(&str, &[Instr])> = Vec::new();
    for name in program.required() {
        let info = program
            .func_info(name)
            .ok_or_else(|| CompileError::unknown_function(name))?;
        symbols.functions.insert(name.clone(), address);
        bodies.push((name.as_str(), info.code.as_slice()));
        address += info.code.len();
    }
    let start_address = address;
    address += start.len();

    let mut data = Vec::new();
    for text in program.str_consts() {
        let mut words: Vec<u64> = text.chars().map(|c| c as u64).collect();
        words.push(0);
        symbols.strings.insert(text.clone(), address);
        data.push(DataBlock {
            address,
            label: format!("'{}'", text.escape_default()),
            words,
        });
        address += data.last().map_or(0, DataBlock::len);
    }
    for &value in program.int_consts() {
        symbols.ints.insert(value, address);
        data.push(DataBlock {
            address,
            label: format!("{}", value),
            words: vec![program.arch().encode(value)],
        });
        address += 1;
    }
    for name in program.variables() {
        symbols.variables.insert(name.clone(), address);
        address += 1;
    }
    for buffer in program.anon_buffers() {
        symbols
            .anon
            .insert(buffer.name.clone(), address + buffer.offset);
    }
    let data_end = address + program.anon_buffers().iter().map(|b| b.size).sum::<usize>();
    let port = INPUT_PORT.min(OUTPUT_PORT);
    if data_end as i64 > port {
        return Err(CompileError::out_of_range_with_hint(
            "program and data size",
            data_end as i64,
            format!("memory from {:#x} is reserved for the I/O ports", port),
        ));
    }

    let entry = Instr::with(Opcode::Jump, Address::abs(start_address as i64))
        .describe(format!("'{}' function", START_LABEL));
    let mut text = vec![TextBlock {
        address: 0,
        label: ENTRY_LABEL.to_string(),
        terms: vec![symbols.resolve(&entry)?],
    }];
    let mut block_address = 1;
    for (name, body) in bodies {
        text.push(TextBlock {
            address: block_address,
            label: name.to_string(),
            terms: symbols.resolve_all(body)?,
        });
        block_address += body.len();
    }
    text.push(TextBlock {
        address: start_address,
        label: START_LABEL.to_string(),
        terms: symbols.resolve_all(&start)?,
    });

    Ok(Code { text, data })
}

impl Symbols {
    fn resolve_all(&self, code: &[Instr]) -> Result<Vec<Term>, CompileError> {
        code.iter().map(|instr| self.resolve(instr)).collect()
    }

    fn resolve(&self, instr: &Instr) -> Result<Term, CompileError> {
        let Some(arg) = &instr.arg else {
            return Ok(Term {
                op: instr.op,
                arg: None,
                desc: instr.desc.clone(),
            });
        };

        let (addr, desc) = match arg {
            Operand::Addr(addr) => (*addr, None),
            Operand::Func(name) => {
                let at = lookup(&self.functions, name)?;
                (Address::abs(at), Some(format!("'{}' function", name)))
            }
            Operand::Str(text) => {
                let at = lookup(&self.strings, text)?;
                (
                    Address::imm(at),
                    Some(format!("'{}' const", text.escape_default())),
                )
            }
            Operand::Anon(name) => {
                let at = lookup(&self.anon, name)?;
                (Address::imm(at), Some(format!("'{}' const", name)))
            }
            Operand::Var(name) => {
                let at = lookup(&self.variables, name)?;
                (Address::abs(at), Some(format!("'{}' variable", name)))
            }
            Operand::IntConst(value) => {
                let at = self
                    .ints
                    .get(value)
                    .copied()
                    .ok_or_else(|| CompileError::unresolved(&value.to_string()))?;
                (Address::abs(at as i64), Some(format!("{} const", value)))
            }
        };

        if !addr.fits_operand() {
            return Err(CompileError::out_of_range_with_hint(
                format!("operand of '{}'", instr.op),
                addr.value,
                "operands are 20-bit signed",
            ));
        }

        Ok(Term {
            op: instr.op,
            arg: Some(addr),
            desc: instr.desc.clone().or(desc),
        })
    }
}

fn lookup(table: &HashMap<String, usize>, name: &str) -> Result<i64, CompileError> {
    table
        .get(name)
        .map(|&at| at as i64)
        .ok_or_else(|| CompileError::unresolved(name))
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::compiler::codegen::CodeGen;
    use crate::compiler::statement::Analyzer;
    use crate::frontend::{Ast, Lexer};
    use crate::isa::Arch;
    use crate::isa::disasm::listing;

    fn link_source(source: &str) -> Result<Code, CompileError> {
        let ast = Ast::build(Lexer::new(source).tokenize()?)?;
        let mut program = ProgramContext::new(Arch::Bits32);
        let stmts = Analyzer::new(&ast, &mut program).analyze()?;
        let mut start = CodeGen::new(&mut program).generate(&stmts)?;
        start.push(Instr::new(Opcode::Halt));
        link(&program, start)
    }

    #[test]
    fn test_hello_layout() {
        let code = link_source(r#"(set x 1000000) (print "hi") (printc x)"#).unwrap();
        expect![[r#"
            ════════════════════════════════════════
             # @ 0x0000
             1 instructions
            ════════════════════════════════════════
            0000   jmp *0x14 ('start' function)

            ════════════════════════════════════════
             print @ 0x0001
             16 instructions
            ════════════════════════════════════════
            0001   push
            0002   ld #0x0
            0003   push
                 ┌──────────────────────────────────
            0004 ► ld **spr+0x1
            0005   cmp #0x0
            0006   jme *ipr+0x8
            0007   st *0x15b4 (output port)
            0008   inc *spr+0x1
            0009   inc *spr
            000a   ld *spr
            000b   cmp #0x80
            000c   jme *ipr+0x2
            000d   jmp *ipr-0x9
                 ┌──────────────────────────────────
            000e ► pop
            000f   popn
            0010   ret

            ════════════════════════════════════════
             printc @ 0x0011
             3 instructions
            ════════════════════════════════════════
            0011   st *0x15b4 (output port)
            0012   ld #0x1
            0013   ret

            ════════════════════════════════════════
             start @ 0x0014
             7 instructions
            ════════════════════════════════════════
            0014   ld *0x1e (1000000 const)
            0015   st *0x1f ('x' variable)
            0016   ld #0x1b ('hi' const)
            0017   call *0x1 ('print' function)
            0018   ld *0x1f ('x' variable)
            0019   call *0x11 ('printc' function)
            001a   halt

            ════════════════════════════════════════
             data, 4 words
            ════════════════════════════════════════
            ; 'hi'
            001b   0x68 'h'
            001c   0x69 'i'
            001d   0x0
            ; 1000000
            001e   0xf4240
        "#]]
        .assert_eq(&listing(&code));
    }

    #[test]
    fn test_anon_buffers_follow_variables() {
        let code = link_source("(set a 1) (set b 2) (printi a) (readline)").unwrap();
        let start = code.text.last().unwrap();
        let vars_end = code.len() + 2;

        let loads: Vec<_> = start
            .terms
            .iter()
            .filter(|t| t.desc.as_deref().is_some_and(|d| d.starts_with("'anon$")))
            .map(|t| t.arg.unwrap().value)
            .collect();
        assert_eq!(loads, vec![vars_end as i64, vars_end as i64 + 21]);
    }

    #[test]
    fn test_data_must_stay_below_ports() {
        let fits = "(readline) ".repeat(40);
        assert!(link_source(&fits).is_ok());

        let overflows = "(readline) ".repeat(44);
        let err = link_source(&overflows).unwrap_err();
        assert!(matches!(err, CompileError::OutOfRange { .. }));
        assert!(err.to_string().contains("I/O ports"));
    }

    #[test]
    fn test_only_referenced_functions_are_emitted() {
        let code = link_source("(defun unused () 1) (printline)").unwrap();
        let labels: Vec<_> = code.text.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["#", "printline", "start"]);
    }

    #[test]
    fn test_printi_pulls_in_print() {
        let code = link_source("(printi 7)").unwrap();
        let labels: Vec<_> = code.text.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["#", "printi", "print", "start"]);
    }

    #[test]
    fn test_unresolved_variable() {
        let err = link_source("(printc y)").unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedSymbol { ref name } if name == "y"));
    }

    #[test]
    fn test_no_symbolic_operand_survives() {
        let code = link_source(
            r#"(defun f (a b) (+ a b)) (set v (f 1 2)) (print "x") (printi v) (readline)"#,
        )
        .unwrap();
        for term in code.text.iter().flat_map(|b| &b.terms) {
            assert_eq!(term.arg.is_some(), term.op.takes_operand(), "{}", term);
        }
        assert_eq!(code.text[0].terms[0].arg, Some(Address::abs(code.text.last().unwrap().address as i64)));
    }
}
