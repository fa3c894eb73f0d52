pub mod alu;
pub mod control_unit;
pub mod datapath;
pub mod runtime_error;

use tracing::{debug, info, warn};

pub use control_unit::ControlUnit;
pub use datapath::DataPath;
pub use runtime_error::RuntimeFault;

use crate::isa::{Arch, Word};
use runtime_error::Trap;

/// Simulator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Total memory in words, program included
    pub memory_size: usize,
    /// Maximum number of retired instructions
    pub limit: u64,
    pub arch: Arch,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: 0x1FFF,
            limit: 5000,
            arch: Arch::Bits32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Halted,
    InputExhausted,
    LimitExceeded,
}

/// Outcome of a run that did not fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub output: String,
    pub instructions: u64,
    pub ticks: u64,
    pub stop: StopReason,
}

/// Runs `words` until halt, input exhaustion or the instruction limit.
pub fn simulate(
    words: Vec<Word>,
    input: &str,
    config: &MachineConfig,
) -> Result<Report, RuntimeFault> {
    let dp = DataPath::new(words, input, config.memory_size, config.arch)?;
    let mut cu = ControlUnit::new(dp);
    let mut instructions = 0u64;
    let mut stop = StopReason::LimitExceeded;

    while instructions < config.limit {
        match cu.step() {
            Ok(()) => {
                instructions += 1;
                debug!("{}", cu);
            }
            Err(Trap::Halt) => {
                stop = StopReason::Halted;
                break;
            }
            Err(Trap::EndOfInput) => {
                warn!("Input buffer is empty");
                stop = StopReason::InputExhausted;
                break;
            }
            Err(Trap::Fault(fault)) => return Err(fault.with_state(cu.dp.state())),
        }
    }

    if stop == StopReason::LimitExceeded {
        warn!("Limit {} exceeded", config.limit);
    }

    let ticks = cu.ticks();
    info!("instr: {} ticks: {}", instructions, ticks);

    Ok(Report {
        output: cu.dp.into_output(),
        instructions,
        ticks,
        stop,
    })
}
