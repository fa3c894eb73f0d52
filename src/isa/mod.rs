pub mod code;
pub mod codec;
pub mod disasm;
pub mod op;

pub use code::{Code, DataBlock, TextBlock};
pub use codec::EncodingError;
pub use op::{
    Address, AddressMode, Arch, INPUT_PORT, OPERAND_BITS, OUTPUT_PORT, OpClass, Opcode, Term, Word,
};
