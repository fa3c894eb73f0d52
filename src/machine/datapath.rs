use std::collections::VecDeque;

use tracing::debug;

use crate::isa::{Arch, INPUT_PORT, OUTPUT_PORT, Term, Word};
use crate::machine::alu::{Alu, AluOp, AluOpts, Flags, extend_bits};
use crate::machine::runtime_error::{RuntimeFault, Trap, fault};

/// Sources the ALU can read on its left input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Left {
    Zero,
    Ac,
    Ip,
    /// Operand field of the instruction register
    Ir,
}

/// Sources the ALU can read on its right input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Right {
    Zero,
    Ar,
    Dr,
    Sp,
}

/// Registers the ALU output can be latched into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Ac,
    Ip,
    Ar,
    Dr,
    Sp,
}

/// One ALU micro-operation: inputs, modifiers and destination latches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AluSignal {
    pub op: AluOp,
    pub left: Left,
    pub right: Right,
    pub opts: AluOpts,
    pub latch: &'static [Reg],
}

impl AluSignal {
    pub fn new(op: AluOp) -> Self {
        Self {
            op,
            left: Left::Zero,
            right: Right::Zero,
            opts: AluOpts::empty(),
            latch: &[],
        }
    }

    pub fn sum() -> Self {
        Self::new(AluOp::Sum)
    }

    pub fn left(mut self, left: Left) -> Self {
        self.left = left;
        self
    }

    pub fn right(mut self, right: Right) -> Self {
        self.right = right;
        self
    }

    pub fn opts(mut self, opts: AluOpts) -> Self {
        self.opts = opts;
        self
    }

    pub fn latch(mut self, regs: &'static [Reg]) -> Self {
        self.latch = regs;
        self
    }
}

/// Registers, ALU and memory of the machine.
///
/// Register values are raw words masked to the architecture width.
#[derive(Debug)]
pub struct DataPath {
    arch: Arch,
    alu: Alu,
    memory: Vec<Word>,
    input: VecDeque<char>,
    output: String,

    pub ac: u64,
    pub ip: u64,
    pub ir: Option<Term>,
    pub ar: u64,
    pub dr: u64,
    pub sp: u64,
    pub flags: Flags,
}

impl DataPath {
    /// Loads `words` at address 0 and zero-fills the rest of memory.
    pub fn new(
        words: Vec<Word>,
        input: &str,
        memory_size: usize,
        arch: Arch,
    ) -> Result<Self, RuntimeFault> {
        if words.len() > memory_size {
            return Err(RuntimeFault::new(format!(
                "program of {} words does not fit {} words of memory",
                words.len(),
                memory_size
            )));
        }
        for (i, word) in words.iter().enumerate() {
            if let Word::Binary { val } = word {
                if val & !arch.mask() != 0 {
                    return Err(RuntimeFault::new(format!(
                        "binary word {} at {:#x} exceeds {}-bit width",
                        val,
                        i,
                        arch.width()
                    )));
                }
            }
        }

        let mut memory = words;
        memory.resize(memory_size, Word::binary(0));

        Ok(Self {
            arch,
            alu: Alu::new(arch),
            memory,
            input: input.chars().collect(),
            output: String::new(),
            ac: 0,
            ip: 0,
            ir: None,
            ar: 0,
            dr: 0,
            sp: memory_size as u64,
            flags: Flags::empty(),
        })
    }

    pub fn into_output(self) -> String {
        self.output
    }

    fn left(&self, source: Left) -> u64 {
        match source {
            Left::Zero => 0,
            Left::Ac => self.ac,
            Left::Ip => self.ip,
            Left::Ir => self
                .ir
                .as_ref()
                .and_then(|term| term.arg)
                .map_or(0, |arg| self.arch.encode(arg.value)),
        }
    }

    fn right(&self, source: Right) -> u64 {
        match source {
            Right::Zero => 0,
            Right::Ar => self.ar,
            Right::Dr => self.dr,
            Right::Sp => self.sp,
        }
    }

    pub fn signal_alu(&mut self, signal: AluSignal) -> Result<(), Trap> {
        let (value, flags) = self.alu.compute(
            signal.op,
            self.left(signal.left),
            self.right(signal.right),
            signal.opts,
        )?;

        if signal.opts.contains(AluOpts::SET_FLAGS) {
            self.flags = flags;
        }
        for reg in signal.latch {
            match reg {
                Reg::Ac => self.ac = value,
                Reg::Ip => self.ip = value,
                Reg::Ar => self.ar = value,
                Reg::Dr => self.dr = value,
                Reg::Sp => self.sp = value,
            }
        }
        Ok(())
    }

    /// Index of the memory cell addressed by `addr`.
    fn cell(&self, addr: u64) -> Result<usize, Trap> {
        let index = extend_bits(addr, self.arch.width());
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.memory.len())
            .ok_or_else(|| {
                fault(format!(
                    "address {} outside memory of {} words",
                    index,
                    self.memory.len()
                ))
            })
    }

    /// `DR <- mem[AR]`; the input port yields the next input character.
    pub fn signal_read(&mut self) -> Result<(), Trap> {
        if self.ar == INPUT_PORT as u64 {
            let ch = self.input.pop_front().ok_or(Trap::EndOfInput)?;
            debug!("input: {:?}", ch);
            self.dr = ch as u64;
            return Ok(());
        }

        let cell = self.cell(self.ar)?;
        match &self.memory[cell] {
            Word::Binary { val } => {
                self.dr = *val;
                Ok(())
            }
            Word::Instruction { instr } => Err(fault(format!(
                "cannot read instruction '{}' at {:#x} as data",
                instr, cell
            ))),
        }
    }

    /// `mem[AR] <- DR`; the output port appends a character to the output.
    pub fn signal_write(&mut self) -> Result<(), Trap> {
        if self.ar == OUTPUT_PORT as u64 {
            let code = u32::try_from(self.dr).ok().and_then(char::from_u32);
            let ch = code.ok_or_else(|| {
                fault(format!("cannot output {:#x}: not a character code", self.dr))
            })?;
            debug!("output: {:?} << {:?}", self.output, ch);
            self.output.push(ch);
            return Ok(());
        }

        let cell = self.cell(self.ar)?;
        if let Word::Instruction { instr } = &self.memory[cell] {
            return Err(fault(format!(
                "cannot overwrite instruction '{}' at {:#x}",
                instr, cell
            )));
        }
        self.memory[cell] = Word::binary(self.dr);
        Ok(())
    }

    /// `IR <- mem[IP]`
    pub fn fetch(&mut self) -> Result<(), Trap> {
        let cell = self.cell(self.ip)?;
        match &self.memory[cell] {
            Word::Instruction { instr } => {
                self.ir = Some(instr.clone());
                Ok(())
            }
            Word::Binary { val } => Err(fault(format!(
                "cannot execute data word {:#x} at {:#x}",
                val, cell
            ))),
        }
    }

    pub fn stack_top(&self) -> Option<u64> {
        let cell = usize::try_from(self.sp).ok()?;
        match self.memory.get(cell)? {
            Word::Binary { val } => Some(*val),
            Word::Instruction { .. } => None,
        }
    }

    /// Register snapshot for traces and fault reports.
    pub fn state(&self) -> String {
        let signed = |v: u64| extend_bits(v, self.arch.width());
        let top = self
            .stack_top()
            .map_or_else(|| "-".to_string(), |v| signed(v).to_string());
        format!(
            "ac: {} ip: {} ar: {} dr: {} sp: {} fl: {} stack_top: {}",
            signed(self.ac),
            self.ip,
            signed(self.ar),
            signed(self.dr),
            self.sp,
            self.flags,
            top
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{Address, Opcode};

    fn datapath(words: Vec<Word>, input: &str) -> DataPath {
        DataPath::new(words, input, 16, Arch::Bits32).unwrap()
    }

    #[test]
    fn test_memory_is_zero_filled() {
        let dp = datapath(vec![Word::instruction(Term::new(Opcode::Halt))], "");
        assert_eq!(dp.memory.len(), 16);
        assert_eq!(dp.memory[15], Word::binary(0));
        assert_eq!(dp.sp, 16);
    }

    #[test]
    fn test_program_too_large() {
        let words = vec![Word::binary(0); 5];
        assert!(DataPath::new(words, "", 4, Arch::Bits32).is_err());
    }

    #[test]
    fn test_wide_binary_word_rejected() {
        let words = vec![Word::binary(1 << 40)];
        assert!(DataPath::new(words.clone(), "", 4, Arch::Bits32).is_err());
        assert!(DataPath::new(words, "", 4, Arch::Bits64).is_ok());
    }

    #[test]
    fn test_alu_signal_latches_several_registers() {
        let mut dp = datapath(vec![], "");
        dp.signal_alu(
            AluSignal::sum()
                .right(Right::Sp)
                .opts(AluOpts::INV_LEFT)
                .latch(&[Reg::Ar, Reg::Sp]),
        )
        .unwrap();
        assert_eq!((dp.ar, dp.sp), (15, 15));
    }

    #[test]
    fn test_operand_from_instruction_register() {
        let mut dp = datapath(vec![], "");
        dp.ir = Some(Term::with_arg(Opcode::Load, Address::imm(-4)));
        dp.signal_alu(
            AluSignal::sum()
                .left(Left::Ir)
                .opts(AluOpts::EXTEND_20)
                .latch(&[Reg::Dr]),
        )
        .unwrap();
        assert_eq!(extend_bits(dp.dr, 32), -4);
    }

    #[test]
    fn test_read_write_memory() {
        let mut dp = datapath(vec![], "");
        dp.ar = 3;
        dp.dr = 99;
        dp.signal_write().unwrap();
        dp.dr = 0;
        dp.signal_read().unwrap();
        assert_eq!(dp.dr, 99);
    }

    #[test]
    fn test_ports() {
        let mut dp = datapath(vec![], "hi");

        dp.ar = INPUT_PORT as u64;
        dp.signal_read().unwrap();
        assert_eq!(dp.dr, 'h' as u64);

        dp.ar = OUTPUT_PORT as u64;
        dp.signal_write().unwrap();
        assert_eq!(dp.output, "h");

        dp.ar = INPUT_PORT as u64;
        dp.signal_read().unwrap();
        assert_eq!(dp.signal_read(), Err(Trap::EndOfInput));
    }

    #[test]
    fn test_invalid_output_code_point() {
        let mut dp = datapath(vec![], "");
        dp.ar = OUTPUT_PORT as u64;
        dp.dr = 0xD800;
        assert!(matches!(dp.signal_write(), Err(Trap::Fault(_))));
    }

    #[test]
    fn test_instruction_words_are_not_data() {
        let halt = Word::instruction(Term::new(Opcode::Halt));
        let mut dp = datapath(vec![halt], "");
        dp.ar = 0;
        assert!(matches!(dp.signal_read(), Err(Trap::Fault(_))));
        assert!(matches!(dp.signal_write(), Err(Trap::Fault(_))));
    }

    #[test]
    fn test_fetch_requires_instruction() {
        let mut dp = datapath(vec![Word::binary(7)], "");
        assert!(matches!(dp.fetch(), Err(Trap::Fault(_))));
    }

    #[test]
    fn test_out_of_range_address() {
        let mut dp = datapath(vec![], "");
        dp.ar = 16;
        assert!(matches!(dp.signal_read(), Err(Trap::Fault(_))));
        dp.ar = Arch::Bits32.encode(-1);
        assert!(matches!(dp.signal_read(), Err(Trap::Fault(_))));
    }

    #[test]
    fn test_state_snapshot() {
        let mut dp = datapath(vec![], "");
        dp.ac = Arch::Bits32.encode(-5);
        dp.sp = 15;
        assert_eq!(
            dp.state(),
            "ac: -5 ip: 0 ar: 0 dr: 0 sp: 15 fl: ---- stack_top: 0"
        );
    }
}
