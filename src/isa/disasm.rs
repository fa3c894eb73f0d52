use std::fmt::Write;

use crate::isa::{AddressMode, Code, Term, TextBlock, Word};

const RULE: &str = "════════════════════════════════════════";

/// Print the listing of a resolved program
pub fn print_code(code: &Code) {
    print!("{}", listing(code));
}

/// Render every text and data block of a program
pub fn listing(code: &Code) -> String {
    let mut out = String::new();

    for block in &code.text {
        write_text_block(&mut out, block);
    }

    if !code.data.is_empty() {
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, " data, {} words", code.data_len());
        let _ = writeln!(out, "{}", RULE);
        for block in &code.data {
            let _ = writeln!(out, "; {}", block.label);
            for (i, word) in block.words.iter().enumerate() {
                let _ = writeln!(out, "{:04x}   {}", block.address + i, format_binary(*word));
            }
        }
    }

    out
}

/// Render a flat word sequence, as loaded by the machine
pub fn disassemble_words(words: &[Word]) -> String {
    let mut out = String::new();
    for (addr, word) in words.iter().enumerate() {
        let _ = match word {
            Word::Instruction { instr } => writeln!(out, "{:04x}   {}", addr, instr),
            Word::Binary { val } => writeln!(out, "{:04x}   {}", addr, format_binary(*val)),
        };
    }
    out
}

fn write_text_block(out: &mut String, block: &TextBlock) {
    let targets = collect_jump_targets(block);

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, " {} @ {:#06x}", block.label, block.address);
    let _ = writeln!(out, " {} instructions", block.len());
    let _ = writeln!(out, "{}", RULE);

    for (i, term) in block.terms.iter().enumerate() {
        let addr = block.address + i;
        if targets.contains(&addr) {
            let _ = writeln!(out, "     ┌──────────────────────────────────");
            let _ = writeln!(out, "{:04x} ► {}", addr, term);
        } else {
            let _ = writeln!(out, "{:04x}   {}", addr, term);
        }
    }
    let _ = writeln!(out);
}

fn collect_jump_targets(block: &TextBlock) -> Vec<usize> {
    let mut targets = Vec::new();

    for (i, term) in block.terms.iter().enumerate() {
        if let Some(target) = relative_target(block.address + i, term) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    targets
}

fn relative_target(addr: usize, term: &Term) -> Option<usize> {
    let arg = term.arg.filter(|a| a.mode == AddressMode::IpRelative)?;
    if !term.op.is_branch() {
        return None;
    }
    usize::try_from(addr as i64 + arg.value).ok()
}

fn format_binary(val: u64) -> String {
    match char::from_u32(val as u32) {
        Some(c) if val <= 0x7e && !c.is_control() => format!("{:#x} {:?}", val, c),
        _ => format!("{:#x}", val),
    }
}
