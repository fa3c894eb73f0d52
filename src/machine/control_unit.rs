use crate::isa::{AddressMode, OpClass, Opcode, Term};
use crate::machine::alu::{AluOp, AluOpts, Flags};
use crate::machine::datapath::{AluSignal, DataPath, Left, Reg, Right};
use crate::machine::runtime_error::{Trap, fault};

/// Sequences datapath signals for each instruction and counts ticks.
///
/// Every signal sent to the datapath is one tick, except instruction fetch
/// and the final instruction pointer increment.
#[derive(Debug)]
pub struct ControlUnit {
    pub dp: DataPath,
    ticks: u64,
}

type Execute = fn(&mut ControlUnit) -> Result<(), Trap>;

const SUB: AluOpts = AluOpts::INV_RIGHT.union(AluOpts::PLUS_1);

impl ControlUnit {
    pub fn new(dp: DataPath) -> Self {
        Self { dp, ticks: 0 }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn alu(&mut self, signal: AluSignal) -> Result<(), Trap> {
        self.dp.signal_alu(signal)?;
        self.tick();
        Ok(())
    }

    fn read(&mut self) -> Result<(), Trap> {
        self.dp.signal_read()?;
        self.tick();
        Ok(())
    }

    fn write(&mut self) -> Result<(), Trap> {
        self.dp.signal_write()?;
        self.tick();
        Ok(())
    }

    /// Fetches and executes one instruction.
    pub fn step(&mut self) -> Result<(), Trap> {
        self.dp.fetch()?;
        let term = self
            .dp
            .ir
            .clone()
            .ok_or_else(|| fault("instruction register is empty"))?;
        let flags = self.dp.flags;

        match term.op {
            Opcode::Halt => Err(Trap::Halt),
            Opcode::Call => self.call(&term),
            Opcode::Return => self.pop_into(&[Reg::Ip]),
            Opcode::JumpEqual => self.branch(&term, flags.contains(Flags::Z)),
            Opcode::JumpGreater => self.branch(&term, greater(flags) && !flags.contains(Flags::Z)),
            Opcode::JumpGreaterEqual => {
                self.branch(&term, greater(flags) || flags.contains(Flags::Z))
            }
            Opcode::Jump => self.jump(&term),

            Opcode::Noop => self.ordinary(&term, |cu| {
                cu.tick();
                Ok(())
            }),
            Opcode::Load => self.ordinary(&term, |cu| {
                cu.alu(AluSignal::sum().right(Right::Dr).latch(&[Reg::Ac]))
            }),
            Opcode::Store => self.ordinary(&term, |cu| {
                cu.alu(AluSignal::sum().left(Left::Ac).latch(&[Reg::Dr]))?;
                cu.write()
            }),
            Opcode::Push => self.ordinary(&term, |cu| {
                cu.alu(
                    AluSignal::sum()
                        .right(Right::Sp)
                        .opts(AluOpts::INV_LEFT)
                        .latch(&[Reg::Ar, Reg::Sp]),
                )?;
                cu.alu(AluSignal::sum().left(Left::Ac).latch(&[Reg::Dr]))?;
                cu.write()
            }),
            Opcode::Pop => self.ordinary(&term, |cu| cu.pop_into(&[Reg::Ac])),
            Opcode::PopDiscard => self.ordinary(&term, |cu| {
                cu.alu(
                    AluSignal::sum()
                        .right(Right::Sp)
                        .opts(AluOpts::PLUS_1)
                        .latch(&[Reg::Sp]),
                )
            }),
            Opcode::Compare => self.ordinary(&term, |cu| {
                cu.alu(
                    AluSignal::sum()
                        .left(Left::Ac)
                        .right(Right::Dr)
                        .opts(SUB.union(AluOpts::SET_FLAGS)),
                )
            }),
            Opcode::Increment => self.ordinary(&term, |cu| {
                cu.read()?;
                cu.alu(
                    AluSignal::sum()
                        .right(Right::Dr)
                        .opts(AluOpts::PLUS_1)
                        .latch(&[Reg::Dr]),
                )?;
                cu.write()
            }),
            Opcode::Decrement => self.ordinary(&term, |cu| {
                cu.read()?;
                cu.alu(
                    AluSignal::sum()
                        .right(Right::Dr)
                        .opts(AluOpts::INV_LEFT)
                        .latch(&[Reg::Dr]),
                )?;
                cu.write()
            }),
            Opcode::Modulo => self.ordinary(&term, |cu| cu.accumulate(AluOp::Mod, AluOpts::empty())),
            Opcode::Add => self.ordinary(&term, |cu| cu.accumulate(AluOp::Sum, AluOpts::empty())),
            Opcode::Subtract => self.ordinary(&term, |cu| cu.accumulate(AluOp::Sum, SUB)),
            Opcode::Multiply => self.ordinary(&term, |cu| cu.accumulate(AluOp::Mul, AluOpts::empty())),
            Opcode::Divide => self.ordinary(&term, |cu| cu.accumulate(AluOp::Div, AluOpts::empty())),
            Opcode::Inverse => self.ordinary(&term, |cu| {
                cu.alu(
                    AluSignal::sum()
                        .left(Left::Ac)
                        .opts(AluOpts::INV_LEFT | AluOpts::PLUS_1)
                        .latch(&[Reg::Ac]),
                )
            }),
        }
    }

    /// `AC <- AC op DR`
    fn accumulate(&mut self, op: AluOp, opts: AluOpts) -> Result<(), Trap> {
        self.alu(
            AluSignal::new(op)
                .left(Left::Ac)
                .right(Right::Dr)
                .opts(opts)
                .latch(&[Reg::Ac]),
        )
    }

    // =========================================================================
    // control flow
    // =========================================================================

    fn call(&mut self, term: &Term) -> Result<(), Trap> {
        expect_mode(term, &[AddressMode::Absolute])?;
        self.alu(
            AluSignal::sum()
                .right(Right::Sp)
                .opts(AluOpts::INV_LEFT)
                .latch(&[Reg::Ar, Reg::Sp]),
        )?;
        self.alu(
            AluSignal::sum()
                .left(Left::Ip)
                .opts(AluOpts::PLUS_1)
                .latch(&[Reg::Dr]),
        )?;
        self.write()?;
        self.alu(
            AluSignal::sum()
                .left(Left::Ir)
                .opts(AluOpts::EXTEND_20)
                .latch(&[Reg::Ip]),
        )
    }

    /// `AR <- SP; DR <- mem[AR]; regs <- DR; SP <- SP + 1`
    fn pop_into(&mut self, regs: &'static [Reg]) -> Result<(), Trap> {
        self.alu(AluSignal::sum().right(Right::Sp).latch(&[Reg::Ar]))?;
        self.read()?;
        self.alu(AluSignal::sum().right(Right::Dr).latch(regs))?;
        self.alu(
            AluSignal::sum()
                .right(Right::Sp)
                .opts(AluOpts::PLUS_1)
                .latch(&[Reg::Sp]),
        )
    }

    fn branch(&mut self, term: &Term, taken: bool) -> Result<(), Trap> {
        expect_mode(term, &[AddressMode::IpRelative])?;
        if taken {
            self.relative_jump()
        } else {
            self.alu(
                AluSignal::sum()
                    .left(Left::Ip)
                    .opts(AluOpts::PLUS_1)
                    .latch(&[Reg::Ip]),
            )
        }
    }

    fn jump(&mut self, term: &Term) -> Result<(), Trap> {
        match expect_mode(term, &[AddressMode::Absolute, AddressMode::IpRelative])? {
            AddressMode::Absolute => self.alu(
                AluSignal::sum()
                    .left(Left::Ir)
                    .opts(AluOpts::EXTEND_20)
                    .latch(&[Reg::Ip]),
            ),
            _ => self.relative_jump(),
        }
    }

    /// `AR <- IP; IP <- IR + AR`
    fn relative_jump(&mut self) -> Result<(), Trap> {
        self.alu(AluSignal::sum().left(Left::Ip).latch(&[Reg::Ar]))?;
        self.alu(
            AluSignal::sum()
                .left(Left::Ir)
                .right(Right::Ar)
                .opts(AluOpts::EXTEND_20)
                .latch(&[Reg::Ip]),
        )
    }

    // =========================================================================
    // ordinary instructions
    // =========================================================================

    /// Address decode, operand fetch, execute, then `IP <- IP + 1`.
    fn ordinary(&mut self, term: &Term, execute: Execute) -> Result<(), Trap> {
        match term.op.class() {
            OpClass::Address => {
                let mode = self.decode_address(term)?;
                if mode == AddressMode::Immediate {
                    return Err(fault(format!("'{}' needs a memory operand", term)));
                }
            }
            OpClass::Value => {
                if self.decode_address(term)? == AddressMode::Immediate {
                    self.alu(
                        AluSignal::sum()
                            .left(Left::Ir)
                            .opts(AluOpts::EXTEND_20)
                            .latch(&[Reg::Dr]),
                    )?;
                } else {
                    self.read()?;
                }
            }
            OpClass::Plain | OpClass::Control => {}
        }

        execute(self)?;

        self.dp.signal_alu(
            AluSignal::sum()
                .left(Left::Ip)
                .opts(AluOpts::PLUS_1)
                .latch(&[Reg::Ip]),
        )
    }

    /// Leaves the effective address in AR.
    fn decode_address(&mut self, term: &Term) -> Result<AddressMode, Trap> {
        let mode = expect_mode(
            term,
            &[
                AddressMode::Immediate,
                AddressMode::Absolute,
                AddressMode::SpRelative,
                AddressMode::SpRelativeIndirect,
            ],
        )?;

        match mode {
            AddressMode::Immediate | AddressMode::IpRelative => {}
            AddressMode::Absolute => self.alu(
                AluSignal::sum()
                    .left(Left::Ir)
                    .opts(AluOpts::EXTEND_20)
                    .latch(&[Reg::Ar]),
            )?,
            AddressMode::SpRelative => self.sp_offset()?,
            AddressMode::SpRelativeIndirect => {
                self.sp_offset()?;
                self.read()?;
                self.alu(AluSignal::sum().right(Right::Dr).latch(&[Reg::Ar]))?;
            }
        }
        Ok(mode)
    }

    /// `AR <- IR + SP`
    fn sp_offset(&mut self) -> Result<(), Trap> {
        self.alu(
            AluSignal::sum()
                .left(Left::Ir)
                .right(Right::Sp)
                .opts(AluOpts::EXTEND_20)
                .latch(&[Reg::Ar]),
        )
    }
}

impl std::fmt::Display for ControlUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tick: {} {}", self.ticks, self.dp.state())?;
        if let Some(term) = &self.dp.ir {
            write!(f, " | {}", term)?;
        }
        Ok(())
    }
}

/// Signed greater: negative equals overflow.
fn greater(flags: Flags) -> bool {
    flags.contains(Flags::N) == flags.contains(Flags::V)
}

fn expect_mode(term: &Term, allowed: &[AddressMode]) -> Result<AddressMode, Trap> {
    match term.arg {
        Some(arg) if allowed.contains(&arg.mode) => Ok(arg.mode),
        Some(arg) => Err(fault(format!(
            "'{}' does not accept {} addressing",
            term.op,
            arg.mode.tag()
        ))),
        None => Err(fault(format!("'{}' is missing its operand", term.op))),
    }
}
