use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - Instruction set of the accumulator machine
// =============================================================================

/// Memory-mapped input port. Reading it pops one character of input.
pub const INPUT_PORT: i64 = 5555;

/// Memory-mapped output port. Writing it appends one character of output.
pub const OUTPUT_PORT: i64 = 5556;

/// Width of the signed operand field of an instruction word.
pub const OPERAND_BITS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    #[serde(rename = "noop")]
    Noop,
    #[serde(rename = "halt")]
    Halt,

    // memory
    #[serde(rename = "ld")]
    Load,
    #[serde(rename = "st")]
    Store,

    // subroutines
    #[serde(rename = "call")]
    Call,
    #[serde(rename = "ret")]
    Return,

    // stack
    #[serde(rename = "push")]
    Push,
    #[serde(rename = "pop")]
    Pop,
    #[serde(rename = "popn")]
    PopDiscard,

    // ==========================================================================
    // Branching: conditional jumps read the flags latched by `cmp`
    // ==========================================================================
    #[serde(rename = "cmp")]
    Compare,
    #[serde(rename = "jme")]
    JumpEqual,
    #[serde(rename = "jmg")]
    JumpGreater,
    #[serde(rename = "jmge")]
    JumpGreaterEqual,
    #[serde(rename = "jmp")]
    Jump,

    // in-place memory arithmetic
    #[serde(rename = "inc")]
    Increment,
    #[serde(rename = "dec")]
    Decrement,

    // accumulator arithmetic
    #[serde(rename = "mod")]
    Modulo,
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "sub")]
    Subtract,
    #[serde(rename = "mul")]
    Multiply,
    #[serde(rename = "div")]
    Divide,
    #[serde(rename = "inv")]
    Inverse,
}

/// How the control unit sequences an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// Handled directly by the control unit (halt, call, ret, branches).
    Control,
    /// Needs an effective address but no operand value (st, inc, dec).
    Address,
    /// Needs an effective address and the value stored there.
    Value,
    /// No decode step at all.
    Plain,
}

impl Opcode {
    pub const ALL: [Opcode; 22] = [
        Opcode::Noop,
        Opcode::Halt,
        Opcode::Load,
        Opcode::Store,
        Opcode::Call,
        Opcode::Return,
        Opcode::Push,
        Opcode::Pop,
        Opcode::PopDiscard,
        Opcode::Compare,
        Opcode::JumpEqual,
        Opcode::JumpGreater,
        Opcode::JumpGreaterEqual,
        Opcode::Jump,
        Opcode::Increment,
        Opcode::Decrement,
        Opcode::Modulo,
        Opcode::Add,
        Opcode::Subtract,
        Opcode::Multiply,
        Opcode::Divide,
        Opcode::Inverse,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Noop => "noop",
            Opcode::Halt => "halt",
            Opcode::Load => "ld",
            Opcode::Store => "st",
            Opcode::Call => "call",
            Opcode::Return => "ret",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::PopDiscard => "popn",
            Opcode::Compare => "cmp",
            Opcode::JumpEqual => "jme",
            Opcode::JumpGreater => "jmg",
            Opcode::JumpGreaterEqual => "jmge",
            Opcode::Jump => "jmp",
            Opcode::Increment => "inc",
            Opcode::Decrement => "dec",
            Opcode::Modulo => "mod",
            Opcode::Add => "add",
            Opcode::Subtract => "sub",
            Opcode::Multiply => "mul",
            Opcode::Divide => "div",
            Opcode::Inverse => "inv",
        }
    }

    /// Returns false for the six opcodes encoded without an operand.
    pub fn takes_operand(self) -> bool {
        !matches!(
            self,
            Opcode::Halt
                | Opcode::Return
                | Opcode::Push
                | Opcode::Pop
                | Opcode::PopDiscard
                | Opcode::Inverse
        )
    }

    pub fn class(self) -> OpClass {
        match self {
            Opcode::Halt
            | Opcode::Call
            | Opcode::Return
            | Opcode::JumpEqual
            | Opcode::JumpGreater
            | Opcode::JumpGreaterEqual
            | Opcode::Jump => OpClass::Control,
            Opcode::Store | Opcode::Increment | Opcode::Decrement => OpClass::Address,
            Opcode::Load
            | Opcode::Compare
            | Opcode::Modulo
            | Opcode::Add
            | Opcode::Subtract
            | Opcode::Multiply
            | Opcode::Divide => OpClass::Value,
            Opcode::Noop | Opcode::Push | Opcode::Pop | Opcode::PopDiscard | Opcode::Inverse => {
                OpClass::Plain
            }
        }
    }

    /// Relative branches whose target is computed from the instruction pointer.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::JumpEqual | Opcode::JumpGreater | Opcode::JumpGreaterEqual | Opcode::Jump
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressMode {
    #[serde(rename = "#")]
    Immediate,
    #[serde(rename = "*")]
    Absolute,
    #[serde(rename = "*ipr")]
    IpRelative,
    #[serde(rename = "*spr")]
    SpRelative,
    #[serde(rename = "**spr")]
    SpRelativeIndirect,
}

impl AddressMode {
    pub fn tag(self) -> &'static str {
        match self {
            AddressMode::Immediate => "#",
            AddressMode::Absolute => "*",
            AddressMode::IpRelative => "*ipr",
            AddressMode::SpRelative => "*spr",
            AddressMode::SpRelativeIndirect => "**spr",
        }
    }

    /// Offset modes render their value as a signed displacement.
    pub fn is_offset(self) -> bool {
        matches!(
            self,
            AddressMode::IpRelative | AddressMode::SpRelative | AddressMode::SpRelativeIndirect
        )
    }
}

/// An addressing-mode tag plus the value or displacement it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "tag")]
    pub mode: AddressMode,
    #[serde(rename = "val")]
    pub value: i64,
}

impl Address {
    pub fn new(mode: AddressMode, value: i64) -> Self {
        Self { mode, value }
    }

    pub fn imm(value: i64) -> Self {
        Self::new(AddressMode::Immediate, value)
    }

    pub fn abs(value: i64) -> Self {
        Self::new(AddressMode::Absolute, value)
    }

    pub fn ipr(value: i64) -> Self {
        Self::new(AddressMode::IpRelative, value)
    }

    pub fn spr(value: i64) -> Self {
        Self::new(AddressMode::SpRelative, value)
    }

    pub fn spr_ind(value: i64) -> Self {
        Self::new(AddressMode::SpRelativeIndirect, value)
    }

    /// True when the value survives the 20-bit operand field unchanged.
    pub fn fits_operand(&self) -> bool {
        let bound = 1i64 << (OPERAND_BITS - 1);
        (-bound..bound).contains(&self.value)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mode.tag())?;
        let magnitude = self.value.unsigned_abs();
        match self.value {
            0 if self.mode.is_offset() => Ok(()),
            v if v < 0 => write!(f, "-{:#x}", magnitude),
            _ if self.mode.is_offset() => write!(f, "+{:#x}", magnitude),
            _ => write!(f, "{:#x}", magnitude),
        }
    }
}

/// One ISA instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub op: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<Address>,
    /// Diagnostic annotation; never interpreted by the machine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl Term {
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            arg: None,
            desc: None,
        }
    }

    pub fn with_arg(op: Opcode, arg: Address) -> Self {
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

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.op)?;
        if let Some(arg) = &self.arg {
            write!(f, " {}", arg)?;
        }
        if let Some(desc) = &self.desc {
            write!(f, " ({})", desc)?;
        }
        Ok(())
    }
}

/// A memory word: an instruction, or a raw data value.
///
/// Only `Binary` words are readable and writable as data at run time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag")]
pub enum Word {
    #[serde(rename = "INSTRUCTION")]
    Instruction { instr: Term },
    #[serde(rename = "BINARY")]
    Binary { val: u64 },
}

impl Word {
    pub fn instruction(instr: Term) -> Self {
        Word::Instruction { instr }
    }

    pub fn binary(val: u64) -> Self {
        Word::Binary { val }
    }
}

/// Register / ALU / data word width of the target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arch {
    #[default]
    Bits32,
    Bits64,
}

impl Arch {
    pub fn width(self) -> u32 {
        match self {
            Arch::Bits32 => 32,
            Arch::Bits64 => 64,
        }
    }

    pub fn mask(self) -> u64 {
        match self {
            Arch::Bits32 => u32::MAX as u64,
            Arch::Bits64 => u64::MAX,
        }
    }

    /// Signed range representable in one data word.
    pub fn signed_range(self) -> std::ops::RangeInclusive<i64> {
        match self {
            Arch::Bits32 => i32::MIN as i64..=i32::MAX as i64,
            Arch::Bits64 => i64::MIN..=i64::MAX,
        }
    }

    /// Two's-complement encoding of `value` in one data word.
    pub fn encode(self, value: i64) -> u64 {
        value as u64 & self.mask()
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "32" => Ok(Arch::Bits32),
            "64" => Ok(Arch::Bits64),
            other => Err(format!("unknown architecture '{}', expected 32 or 64", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_operand_set() {
        let zero: Vec<_> = Opcode::ALL
            .iter()
            .filter(|op| !op.takes_operand())
            .map(|op| op.mnemonic())
            .collect();
        assert_eq!(zero, vec!["halt", "ret", "push", "pop", "popn", "inv"]);
    }

    #[test]
    fn test_noop_is_plain_but_takes_operand() {
        assert_eq!(Opcode::Noop.class(), OpClass::Plain);
        assert!(Opcode::Noop.takes_operand());
    }

    #[test]
    fn test_address_display() {
        assert_eq!(Address::imm(10).to_string(), "#0xa");
        assert_eq!(Address::imm(-3).to_string(), "#-0x3");
        assert_eq!(Address::abs(5556).to_string(), "*0x15b4");
        assert_eq!(Address::spr(0).to_string(), "*spr");
        assert_eq!(Address::spr(2).to_string(), "*spr+0x2");
        assert_eq!(Address::ipr(-9).to_string(), "*ipr-0x9");
        assert_eq!(Address::spr_ind(1).to_string(), "**spr+0x1");
    }

    #[test]
    fn test_term_display() {
        let term = Term::with_arg(Opcode::Load, Address::abs(40)).describe("'x' variable");
        assert_eq!(term.to_string(), "ld *0x28 ('x' variable)");
        assert_eq!(Term::new(Opcode::Return).to_string(), "ret");
    }

    #[test]
    fn test_operand_field_bounds() {
        assert!(Address::imm((1 << 19) - 1).fits_operand());
        assert!(Address::imm(-(1 << 19)).fits_operand());
        assert!(!Address::imm(1 << 19).fits_operand());
    }

    #[test]
    fn test_arch_encode() {
        assert_eq!(Arch::Bits32.encode(-1), 0xFFFF_FFFF);
        assert_eq!(Arch::Bits64.encode(-1), u64::MAX);
        assert_eq!("64".parse::<Arch>(), Ok(Arch::Bits64));
        assert!("16".parse::<Arch>().is_err());
    }
}
