use crate::isa::{Term, Word};

/// A labeled run of instructions starting at `address`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub address: usize,
    pub label: String,
    pub terms: Vec<Term>,
}

impl TextBlock {
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// A labeled run of initialized data words starting at `address`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub address: usize,
    pub label: String,
    pub words: Vec<u64>,
}

impl DataBlock {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// A fully resolved program: instruction memory followed by data memory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Code {
    pub text: Vec<TextBlock>,
    pub data: Vec<DataBlock>,
}

impl Code {
    /// Number of instruction words.
    pub fn len(&self) -> usize {
        self.text.last().map(|b| b.address + b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of initialized data words.
    pub fn data_len(&self) -> usize {
        self.data.iter().map(DataBlock::len).sum()
    }

    /// Flattens the blocks into the tagged word sequence loaded by the machine.
    pub fn to_words(&self) -> Vec<Word> {
        let text = self
            .text
            .iter()
            .flat_map(|block| block.terms.iter().cloned().map(Word::instruction));
        let data = self
            .data
            .iter()
            .flat_map(|block| block.words.iter().copied().map(Word::binary));
        text.chain(data).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{Address, Opcode};

    fn sample() -> Code {
        Code {
            text: vec![
                TextBlock {
                    address: 0,
                    label: "#".to_string(),
                    terms: vec![Term::with_arg(Opcode::Jump, Address::abs(1))],
                },
                TextBlock {
                    address: 1,
                    label: "start".to_string(),
                    terms: vec![
                        Term::with_arg(Opcode::Load, Address::imm(3)),
                        Term::new(Opcode::Halt),
                    ],
                },
            ],
            data: vec![DataBlock {
                address: 3,
                label: "'a'".to_string(),
                words: vec![97, 0],
            }],
        }
    }

    #[test]
    fn test_lengths() {
        let code = sample();
        assert_eq!(code.len(), 3);
        assert_eq!(code.data_len(), 2);
        assert!(Code::default().is_empty());
    }

    #[test]
    fn test_words_keep_block_order() {
        let words = sample().to_words();
        assert_eq!(words.len(), 5);
        assert!(matches!(&words[0], Word::Instruction { instr } if instr.op == Opcode::Jump));
        assert!(matches!(&words[2], Word::Instruction { instr } if instr.op == Opcode::Halt));
        assert_eq!(words[3], Word::binary(97));
        assert_eq!(words[4], Word::binary(0));
    }
}
