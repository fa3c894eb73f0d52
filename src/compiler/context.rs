use std::collections::HashMap;

use crate::compiler::codegen::{Instr, Operand};
use crate::compiler::compile_error::CompileError;
use crate::compiler::stdlib;
use crate::isa::Arch;

/// A function known to the compiler, built-in or user-defined.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncInfo {
    pub name: String,
    pub argc: usize,
    pub code: Vec<Instr>,
}

/// An anonymous scratch buffer, addressed relative to the end of the
/// variable region.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonBuffer {
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

/// Compile-time state for one translation.
#[derive(Debug)]
pub struct ProgramContext {
    arch: Arch,
    functions: HashMap<String, FuncInfo>,
    /// Functions referenced by emitted code, in first-reference order
    required: Vec<String>,
    int_consts: Vec<i64>,
    str_consts: Vec<String>,
    variables: Vec<String>,
    anon: Vec<AnonBuffer>,
}

impl ProgramContext {
    pub fn new(arch: Arch) -> Self {
        let functions = stdlib::BUILTINS
            .iter()
            .map(|&(name, argc)| {
                let info = FuncInfo {
                    name: name.to_string(),
                    argc,
                    code: stdlib::body(name).unwrap_or_default(),
                };
                (name.to_string(), info)
            })
            .collect();

        Self {
            arch,
            functions,
            required: Vec::new(),
            int_consts: Vec::new(),
            str_consts: Vec::new(),
            variables: Vec::new(),
            anon: Vec::new(),
        }
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn func_info(&self, name: &str) -> Option<&FuncInfo> {
        self.functions.get(name)
    }

    /// Registers a user function ahead of its body so the body may recurse.
    pub fn define_func(&mut self, name: &str, argc: usize) -> Result<(), CompileError> {
        if self.functions.contains_key(name) {
            return Err(CompileError::redefinition(name));
        }
        self.functions.insert(
            name.to_string(),
            FuncInfo {
                name: name.to_string(),
                argc,
                code: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn implement_func(&mut self, name: &str, code: Vec<Instr>) -> Result<(), CompileError> {
        let info = self
            .functions
            .get_mut(name)
            .ok_or_else(|| CompileError::internal(format!("'{}' implemented before definition", name)))?;
        info.code = code;
        Ok(())
    }

    /// Marks a function as emitted, along with every function its body calls.
    pub fn require_func(&mut self, name: &str) -> Result<(), CompileError> {
        if self.required.iter().any(|n| n == name) {
            return Ok(());
        }
        let info = self
            .functions
            .get(name)
            .ok_or_else(|| CompileError::unknown_function(name))?;
        let callees: Vec<String> = info
            .code
            .iter()
            .filter_map(|instr| match &instr.arg {
                Some(Operand::Func(callee)) => Some(callee.clone()),
                _ => None,
            })
            .collect();

        self.required.push(name.to_string());
        for callee in callees {
            self.require_func(&callee)?;
        }
        Ok(())
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Adds an integer to the constant pool; it must fit one data word.
    pub fn require_int_const(&mut self, value: i64) -> Result<(), CompileError> {
        if !self.arch.signed_range().contains(&value) {
            return Err(CompileError::out_of_range_with_hint(
                "integer constant",
                value,
                format!("a {}-bit word holds {:?}", self.arch.width(), self.arch.signed_range()),
            ));
        }
        if !self.int_consts.contains(&value) {
            self.int_consts.push(value);
        }
        Ok(())
    }

    pub fn require_str_const(&mut self, text: &str) {
        if !self.str_consts.iter().any(|s| s == text) {
            self.str_consts.push(text.to_string());
        }
    }

    pub fn require_variable(&mut self, name: &str) {
        if !self.is_variable(name) {
            self.variables.push(name.to_string());
        }
    }

    pub fn is_variable(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }

    /// Allocates a fresh anonymous buffer of `size` words and returns its name.
    pub fn require_anon(&mut self, size: usize) -> String {
        let offset = self.anon.last().map_or(0, |b| b.offset + b.size);
        let name = format!("anon${}", self.anon.len());
        self.anon.push(AnonBuffer {
            name: name.clone(),
            offset,
            size,
        });
        name
    }

    pub fn int_consts(&self) -> &[i64] {
        &self.int_consts
    }

    pub fn str_consts(&self) -> &[String] {
        &self.str_consts
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn anon_buffers(&self) -> &[AnonBuffer] {
        &self.anon
    }
}

/// Marks an argument whose value is still in the accumulator.
pub const ACC_RESIDENT: i64 = -1;

/// Argument bookkeeping for one function body.
///
/// Maps each parameter to its displacement from the stack pointer. Every
/// push or pop emitted while generating the body shifts all displacements
/// by one, so a spilled accumulator-resident argument lands on slot 0.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FuncContext {
    slots: Vec<(String, i64)>,
}

impl FuncContext {
    /// The first parameter starts in the accumulator; the others sit above
    /// the return address in declaration order.
    pub fn new(params: &[String]) -> Self {
        let slots = params
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let disp = if i == 0 { ACC_RESIDENT } else { i as i64 };
                (name.clone(), disp)
            })
            .collect();
        Self { slots }
    }

    pub fn displacement(&self, name: &str) -> Option<i64> {
        self.slots
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, disp)| *disp)
    }

    pub fn acc_resident(&self) -> Option<&str> {
        self.slots
            .iter()
            .find(|(_, disp)| *disp == ACC_RESIDENT)
            .map(|(name, _)| name.as_str())
    }

    pub fn on_push(&mut self) {
        for (_, disp) in &mut self.slots {
            *disp += 1;
        }
    }

    pub fn on_pop(&mut self) {
        for (_, disp) in &mut self.slots {
            *disp -= 1;
        }
    }

    /// True when an argument occupies the top of the stack, i.e. the
    /// spilled first argument still needs discarding before `ret`.
    pub fn has_slot_at_top(&self) -> bool {
        self.slots.iter().any(|(_, disp)| *disp == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtins_are_seeded() {
        let ctx = ProgramContext::new(Arch::Bits32);
        assert_eq!(ctx.func_info("printi").unwrap().argc, 1);
        assert_eq!(ctx.func_info("readline").unwrap().argc, 0);
        assert!(ctx.required().is_empty());
    }

    #[test]
    fn test_redefinition() {
        let mut ctx = ProgramContext::new(Arch::Bits32);
        ctx.define_func("f", 2).unwrap();
        assert!(matches!(
            ctx.define_func("f", 1),
            Err(CompileError::Redefinition { .. })
        ));
        assert!(matches!(
            ctx.define_func("print", 1),
            Err(CompileError::Redefinition { .. })
        ));
    }

    #[test]
    fn test_require_pulls_in_callees() {
        let mut ctx = ProgramContext::new(Arch::Bits32);
        ctx.require_func("printi").unwrap();
        ctx.require_func("print").unwrap();
        assert_eq!(ctx.required(), ["printi", "print"]);
    }

    #[test]
    fn test_require_unknown() {
        let mut ctx = ProgramContext::new(Arch::Bits32);
        assert!(matches!(
            ctx.require_func("nope"),
            Err(CompileError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_pools_deduplicate() {
        let mut ctx = ProgramContext::new(Arch::Bits32);
        ctx.require_int_const(1 << 20).unwrap();
        ctx.require_int_const(1 << 20).unwrap();
        ctx.require_str_const("hi");
        ctx.require_str_const("hi");
        ctx.require_variable("x");
        ctx.require_variable("x");
        assert_eq!(ctx.int_consts(), [1 << 20]);
        assert_eq!(ctx.str_consts().len(), 1);
        assert_eq!(ctx.variables().len(), 1);
    }

    #[test]
    fn test_int_const_range_follows_arch() {
        let mut ctx = ProgramContext::new(Arch::Bits32);
        assert!(ctx.require_int_const(1 << 40).is_err());

        let mut ctx = ProgramContext::new(Arch::Bits64);
        assert!(ctx.require_int_const(1 << 40).is_ok());
    }

    #[test]
    fn test_anon_buffers_are_contiguous() {
        let mut ctx = ProgramContext::new(Arch::Bits32);
        assert_eq!(ctx.require_anon(21), "anon$0");
        assert_eq!(ctx.require_anon(129), "anon$1");
        let offsets: Vec<_> = ctx.anon_buffers().iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 21]);
    }

    #[test]
    fn test_frame_layout() {
        let frame = FuncContext::new(&params(&["a", "b", "c"]));
        assert_eq!(frame.displacement("a"), Some(ACC_RESIDENT));
        assert_eq!(frame.displacement("b"), Some(1));
        assert_eq!(frame.displacement("c"), Some(2));
        assert_eq!(frame.acc_resident(), Some("a"));
        assert!(!frame.has_slot_at_top());
    }

    #[test]
    fn test_spill_moves_acc_argument_to_top() {
        let mut frame = FuncContext::new(&params(&["n", "m"]));
        frame.on_push();
        assert_eq!(frame.acc_resident(), None);
        assert_eq!(frame.displacement("n"), Some(0));
        assert_eq!(frame.displacement("m"), Some(2));
        assert!(frame.has_slot_at_top());

        frame.on_push();
        frame.on_pop();
        assert_eq!(frame.displacement("n"), Some(0));
    }
}
