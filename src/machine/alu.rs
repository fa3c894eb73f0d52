use bitflags::bitflags;

use crate::isa::{Arch, OPERAND_BITS};
use crate::machine::runtime_error::{Trap, fault};

bitflags! {
    /// Per-operation modifiers applied to the ALU inputs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AluOpts: u8 {
        /// Sign-extend the left input from the 20-bit operand field
        const EXTEND_20 = 0x01;
        /// Carry into the adder
        const PLUS_1 = 0x02;
        const SET_FLAGS = 0x04;
        const INV_LEFT = 0x08;
        const INV_RIGHT = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        const N = 0x8;
        const Z = 0x4;
        const V = 0x2;
        const C = 0x1;
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (flag, name) in [(Flags::N, 'N'), (Flags::Z, 'Z'), (Flags::V, 'V'), (Flags::C, 'C')] {
            let c = if self.contains(flag) { name } else { '-' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Sum,
    Mul,
    Mod,
    Div,
}

/// Sign-extends the low `bits` bits of `value`.
pub fn extend_bits(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Ripple-carry addition over `width` bits with exact flags.
pub fn sum(left: u64, right: u64, carry_in: bool, width: u32) -> (u64, Flags) {
    let mut carry = carry_in as u64;
    let mut carry_into_sign = 0;
    let mut result = 0u64;

    for i in 0..width {
        let a = (left >> i) & 1;
        let b = (right >> i) & 1;
        if i == width - 1 {
            carry_into_sign = carry;
        }
        result |= (a ^ b ^ carry) << i;
        carry = (a & b) | (carry & (a ^ b));
    }

    let mut flags = sign_and_zero(result, width);
    flags.set(Flags::V, carry_into_sign != carry);
    flags.set(Flags::C, carry == 1);
    (result, flags)
}

fn sign_and_zero(result: u64, width: u32) -> Flags {
    let mut flags = Flags::empty();
    flags.set(Flags::N, (result >> (width - 1)) & 1 == 1);
    flags.set(Flags::Z, result == 0);
    flags
}

/// Combinational ALU for one architecture width.
#[derive(Debug, Clone, Copy)]
pub struct Alu {
    arch: Arch,
}

impl Alu {
    pub fn new(arch: Arch) -> Self {
        Self { arch }
    }

    /// Computes `left op right` and the flags it would latch.
    pub fn compute(
        &self,
        op: AluOp,
        left: u64,
        right: u64,
        opts: AluOpts,
    ) -> Result<(u64, Flags), Trap> {
        let width = self.arch.width();
        let mask = self.arch.mask();

        let mut l = extend_bits(left, width);
        let mut r = extend_bits(right, width);
        if opts.contains(AluOpts::INV_LEFT) {
            l = !l;
        }
        if opts.contains(AluOpts::INV_RIGHT) {
            r = !r;
        }
        if opts.contains(AluOpts::EXTEND_20) {
            l = extend_bits(l as u64, OPERAND_BITS);
        }

        let result = match op {
            AluOp::Sum => {
                return Ok(sum(
                    l as u64 & mask,
                    r as u64 & mask,
                    opts.contains(AluOpts::PLUS_1),
                    width,
                ));
            }
            AluOp::Mul => l.wrapping_mul(r),
            AluOp::Mod | AluOp::Div => {
                if l < 0 || r <= 0 {
                    return Err(fault(format!(
                        "{} needs a non-negative dividend and a positive divisor, got {} and {}",
                        if op == AluOp::Mod { "mod" } else { "div" },
                        l,
                        r
                    )));
                }
                if op == AluOp::Mod { l % r } else { l / r }
            }
        };

        let result = result as u64 & mask;
        Ok((result, sign_and_zero(result, width)))
    }
}
