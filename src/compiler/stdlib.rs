//! Built-in library routines.
//!
//! Every routine follows the user calling convention: the first argument
//! arrives in the accumulator, the rest on the stack above the return
//! address, and the result is left in the accumulator.

use crate::compiler::codegen::{Instr, Operand};
use crate::isa::{Address, INPUT_PORT, OUTPUT_PORT, Opcode};

pub const PRINT: &str = "print";
pub const PRINTI: &str = "printi";
pub const PRINTC: &str = "printc";
pub const PRINTLINE: &str = "printline";
pub const READLINE: &str = "readline";
pub const READCHAR: &str = "readchar";

/// Longest string `print` writes before giving up on a terminator.
pub const PRINT_LIMIT: i64 = 128;

/// Longest line `readline` stores, excluding the terminator.
pub const READ_LIMIT: i64 = 128;

/// Scratch buffer handed to `printi`: sign, up to 19 digits, terminator.
pub const PRINTI_BUFFER: usize = 21;

/// Buffer handed to `readline`.
pub const READLINE_BUFFER: usize = READ_LIMIT as usize + 1;

/// Name and arity of every built-in routine.
pub const BUILTINS: [(&str, usize); 6] = [
    (PRINT, 1),
    (PRINTI, 1),
    (PRINTC, 1),
    (PRINTLINE, 0),
    (READLINE, 0),
    (READCHAR, 0),
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|(n, _)| *n == name)
}

/// Instruction body of a built-in routine.
pub fn body(name: &str) -> Option<Vec<Instr>> {
    let code = match name {
        PRINT => print(),
        PRINTI => printi(),
        PRINTC => vec![out(), at(Opcode::Load, Address::imm(1)), op(Opcode::Return)],
        PRINTLINE => vec![
            at(Opcode::Load, Address::imm('\n' as i64)),
            out(),
            at(Opcode::Load, Address::imm(1)),
            op(Opcode::Return),
        ],
        READLINE => readline(),
        READCHAR => vec![input(), op(Opcode::Return)],
        _ => return None,
    };
    Some(code)
}

fn op(op: Opcode) -> Instr {
    Instr::new(op)
}

fn at(op: Opcode, addr: Address) -> Instr {
    Instr::with(op, addr)
}

fn out() -> Instr {
    at(Opcode::Store, Address::abs(OUTPUT_PORT)).describe("output port")
}

fn input() -> Instr {
    at(Opcode::Load, Address::abs(INPUT_PORT)).describe("input port")
}

/// Writes the zero-terminated buffer whose address is in the accumulator.
/// Returns the number of characters written.
fn print() -> Vec<Instr> {
    vec![
        op(Opcode::Push),
        at(Opcode::Load, Address::imm(0)),
        op(Opcode::Push),
        // spr+0: count, spr+1: cursor
        at(Opcode::Load, Address::spr_ind(1)),
        at(Opcode::Compare, Address::imm(0)),
        at(Opcode::JumpEqual, Address::ipr(8)),
        out(),
        at(Opcode::Increment, Address::spr(1)),
        at(Opcode::Increment, Address::spr(0)),
        at(Opcode::Load, Address::spr(0)),
        at(Opcode::Compare, Address::imm(PRINT_LIMIT)),
        at(Opcode::JumpEqual, Address::ipr(2)),
        at(Opcode::Jump, Address::ipr(-9)),
        op(Opcode::Pop),
        op(Opcode::PopDiscard),
        op(Opcode::Return),
    ]
}

/// Renders the accumulator in decimal into the caller's scratch buffer,
/// back to front, then hands the first digit to `print`.
fn printi() -> Vec<Instr> {
    vec![
        op(Opcode::Push),
        // spr+0: value, spr+1: return address, spr+2: buffer
        at(Opcode::Load, Address::spr(2)),
        at(Opcode::Add, Address::imm(PRINTI_BUFFER as i64 - 1)),
        at(Opcode::Store, Address::spr(2)),
        at(Opcode::Load, Address::imm(0)),
        at(Opcode::Store, Address::spr_ind(2)),
        at(Opcode::Load, Address::spr(0)),
        at(Opcode::Compare, Address::imm(0)),
        at(Opcode::JumpGreaterEqual, Address::ipr(5)),
        at(Opcode::Load, Address::imm('-' as i64)),
        out(),
        at(Opcode::Load, Address::spr(0)),
        op(Opcode::Inverse),
        op(Opcode::Push),
        // digit loop, spr+0 holds the remaining magnitude
        at(Opcode::Modulo, Address::imm(10)),
        at(Opcode::Add, Address::imm('0' as i64)),
        at(Opcode::Decrement, Address::spr(3)),
        at(Opcode::Store, Address::spr_ind(3)),
        at(Opcode::Load, Address::spr(0)),
        at(Opcode::Divide, Address::imm(10)),
        at(Opcode::Compare, Address::imm(0)),
        at(Opcode::JumpEqual, Address::ipr(3)),
        at(Opcode::Store, Address::spr(0)),
        at(Opcode::Jump, Address::ipr(-9)),
        op(Opcode::Pop),
        at(Opcode::Load, Address::spr(2)),
        Instr::sym(Opcode::Call, Operand::Func(PRINT.to_string())),
        op(Opcode::Push),
        // count the sign written before the digits
        at(Opcode::Load, Address::spr(1)),
        at(Opcode::Compare, Address::imm(0)),
        at(Opcode::JumpGreaterEqual, Address::ipr(2)),
        at(Opcode::Increment, Address::spr(0)),
        op(Opcode::Pop),
        op(Opcode::PopDiscard),
        op(Opcode::Return),
    ]
}

/// Reads input into the buffer whose address is in the accumulator until a
/// newline or `READ_LIMIT` characters. Returns the buffer address.
fn readline() -> Vec<Instr> {
    vec![
        op(Opcode::Push),
        op(Opcode::Push),
        at(Opcode::Load, Address::imm(0)),
        op(Opcode::Push),
        // spr+0: count, spr+1: cursor, spr+2: buffer
        input(),
        at(Opcode::Compare, Address::imm('\n' as i64)),
        at(Opcode::JumpEqual, Address::ipr(8)),
        at(Opcode::Store, Address::spr_ind(1)),
        at(Opcode::Increment, Address::spr(1)),
        at(Opcode::Increment, Address::spr(0)),
        at(Opcode::Load, Address::spr(0)),
        at(Opcode::Compare, Address::imm(READ_LIMIT)),
        at(Opcode::JumpEqual, Address::ipr(2)),
        at(Opcode::Jump, Address::ipr(-9)),
        at(Opcode::Load, Address::imm(0)),
        at(Opcode::Store, Address::spr_ind(1)),
        op(Opcode::Pop),
        op(Opcode::Pop),
        op(Opcode::Pop),
        op(Opcode::Return),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_lengths() {
        let lens: Vec<_> = BUILTINS
            .iter()
            .map(|(name, _)| body(name).unwrap().len())
            .collect();
        assert_eq!(lens, vec![16, 35, 3, 4, 20, 2]);
    }

    #[test]
    fn test_every_body_returns() {
        for (name, _) in BUILTINS {
            let code = body(name).unwrap();
            assert_eq!(code.last().unwrap().op, Opcode::Return, "{}", name);
        }
    }

    #[test]
    fn test_printi_calls_print() {
        let code = body(PRINTI).unwrap();
        let calls: Vec<_> = code
            .iter()
            .filter_map(|i| match &i.arg {
                Some(Operand::Func(name)) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![PRINT]);
    }

    #[test]
    fn test_lookup() {
        assert!(is_builtin("readline"));
        assert!(!is_builtin("read"));
        assert!(body("fact").is_none());
    }
}
