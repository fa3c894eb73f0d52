pub mod compiler;
pub mod frontend;
pub mod isa;
pub mod machine;

pub use compiler::{CompileError, Translation, translate};
pub use isa::{Arch, Code, EncodingError, Word};
pub use machine::{MachineConfig, Report, RuntimeFault, StopReason, simulate};
