//! Program artifact encoding.
//!
//! The wire format is a JSON array of tagged words (see [`Word`]). A compact
//! postcard image of the same words is available for tools that do not need
//! a human-readable artifact. Both decoders validate every word against the
//! target architecture before handing it to the machine.

use serde::{Deserialize, Serialize};

use crate::isa::{Address, Arch, Opcode, Term, Word};

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingError {
    /// Index of the offending word, when the failure is tied to one.
    pub index: Option<usize>,
    pub message: String,
}

impl EncodingError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            index: None,
            message: message.into(),
        }
    }

    fn at(index: usize, message: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(i) => write!(f, "malformed program: word {}: {}", i, self.message),
            None => write!(f, "malformed program: {}", self.message),
        }
    }
}

impl std::error::Error for EncodingError {}

/// Shape accepted on decode. Binary words may be a bare character for
/// artifacts produced by older tools.
#[derive(Deserialize)]
#[serde(tag = "tag")]
enum RawWord {
    #[serde(rename = "INSTRUCTION")]
    Instruction { instr: Term },
    #[serde(rename = "BINARY")]
    Binary { val: RawBinary },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBinary {
    Int(u64),
    Char(String),
}

/// Compact image word; postcard needs every field present.
#[derive(Serialize, Deserialize)]
enum PackedWord {
    Instruction {
        op: Opcode,
        arg: Option<Address>,
        desc: Option<String>,
    },
    Binary(u64),
}

/// Serializes words into the JSON wire format.
pub fn encode(words: &[Word]) -> Result<String, EncodingError> {
    serde_json::to_string_pretty(words).map_err(|e| EncodingError::new(e.to_string()))
}

/// Parses the JSON wire format, validating each word for `arch`.
pub fn decode(text: &str, arch: Arch) -> Result<Vec<Word>, EncodingError> {
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(text).map_err(|e| EncodingError::new(e.to_string()))?;

    raw.into_iter()
        .enumerate()
        .map(|(i, value)| {
            let word: RawWord =
                serde_json::from_value(value).map_err(|e| EncodingError::at(i, e.to_string()))?;
            match word {
                RawWord::Instruction { instr } => {
                    check_operand(i, &instr)?;
                    Ok(Word::instruction(instr))
                }
                RawWord::Binary { val } => {
                    let val = match val {
                        RawBinary::Int(v) => v,
                        RawBinary::Char(s) => single_char(i, &s)? as u64,
                    };
                    check_binary(i, val, arch)?;
                    Ok(Word::binary(val))
                }
            }
        })
        .collect()
}

/// Serializes words into a compact postcard image.
pub fn encode_image(words: &[Word]) -> Result<Vec<u8>, EncodingError> {
    let packed: Vec<PackedWord> = words
        .iter()
        .map(|word| match word {
            Word::Instruction { instr } => PackedWord::Instruction {
                op: instr.op,
                arg: instr.arg,
                desc: instr.desc.clone(),
            },
            Word::Binary { val } => PackedWord::Binary(*val),
        })
        .collect();
    postcard::to_allocvec(&packed).map_err(|e| EncodingError::new(e.to_string()))
}

/// Parses a postcard image, validating each word for `arch`.
pub fn decode_image(bytes: &[u8], arch: Arch) -> Result<Vec<Word>, EncodingError> {
    let packed: Vec<PackedWord> =
        postcard::from_bytes(bytes).map_err(|e| EncodingError::new(e.to_string()))?;

    packed
        .into_iter()
        .enumerate()
        .map(|(i, word)| match word {
            PackedWord::Instruction { op, arg, desc } => {
                let instr = Term { op, arg, desc };
                check_operand(i, &instr)?;
                Ok(Word::instruction(instr))
            }
            PackedWord::Binary(val) => {
                check_binary(i, val, arch)?;
                Ok(Word::binary(val))
            }
        })
        .collect()
}

fn check_operand(index: usize, instr: &Term) -> Result<(), EncodingError> {
    match (instr.op.takes_operand(), &instr.arg) {
        (true, None) => Err(EncodingError::at(
            index,
            format!("opcode '{}' requires an operand", instr.op),
        )),
        (false, Some(arg)) => Err(EncodingError::at(
            index,
            format!("opcode '{}' takes no operand, got {}", instr.op, arg),
        )),
        _ => Ok(()),
    }
}

fn check_binary(index: usize, val: u64, arch: Arch) -> Result<(), EncodingError> {
    if val & !arch.mask() != 0 {
        return Err(EncodingError::at(
            index,
            format!("binary word {} exceeds {}-bit width", val, arch.width()),
        ));
    }
    Ok(())
}

fn single_char(index: usize, s: &str) -> Result<char, EncodingError> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(EncodingError::at(
            index,
            format!("unknown binary word format, got {:?}", s),
        )),
    }
}
