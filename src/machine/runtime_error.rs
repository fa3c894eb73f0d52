/// A fatal condition that aborts a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeFault {
    pub message: String,
    /// Register snapshot at the time of the fault
    pub state: Option<String>,
}

impl std::fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime fault: {}", self.message)?;
        if let Some(state) = &self.state {
            write!(f, "\n  state: {}", state)?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeFault {}

impl RuntimeFault {
    pub fn new(msg: impl Into<String>) -> Self {
        RuntimeFault {
            message: msg.into(),
            state: None,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}

/// Why the control unit stopped executing an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Trap {
    Halt,
    EndOfInput,
    Fault(RuntimeFault),
}

impl From<RuntimeFault> for Trap {
    fn from(fault: RuntimeFault) -> Self {
        Trap::Fault(fault)
    }
}

pub fn fault(msg: impl Into<String>) -> Trap {
    Trap::Fault(RuntimeFault::new(msg))
}
