//! Bytecode instructions and compiled functions

use crate::value::Value;

/// A single VM instruction
///
/// Operands index into the owning [`Function`]'s constant or name pools.
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Push `constants[idx]`
    Const(usize),
    /// Push the global named `names[idx]` (null when unset)
    LoadGlobal(usize),
    /// Pop into the global named `names[idx]`
    StoreGlobal(usize),
    /// Push frame-local slot
    LoadLocal(usize),
    /// Pop into frame-local slot
    StoreLocal(usize),
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Logical not
    Not,
    /// Numeric negation
    Neg,
    /// Unconditional jump to absolute instruction index
    Jump(usize),
    /// Pop; jump when falsy
    JumpIfFalse(usize),
    /// Resolve `names[idx]` and push a call setup
    LoadFunc(usize),
    /// Complete the innermost call setup with `argc` pushed arguments
    Call(usize),
    /// Discard top of stack
    Pop,
    /// Return top of stack to the caller
    Return,
}

/// A compiled function (or top-level unit)
#[derive(Debug, Clone, Default)]
pub struct Function {
    /// Lower-cased function name (`<main>` for top-level units)
    pub name: String,
    /// Number of declared parameters; they occupy the first local slots
    pub param_count: usize,
    /// Instructions; always terminated by `Return`
    pub code: Vec<Opcode>,
    /// Constant pool
    pub constants: Vec<Value>,
    /// Identifier pool (globals and callees), lower-cased
    pub names: Vec<String>,
}

impl Function {
    /// Create an empty function
    pub fn new(name: impl Into<String>, param_count: usize) -> Self {
        Self {
            name: name.into(),
            param_count,
            ..Default::default()
        }
    }

    /// Intern a constant and return its index
    pub fn add_constant(&mut self, value: Value) -> usize {
        if let Some(idx) = self.constants.iter().position(|c| c == &value) {
            return idx;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Intern an identifier and return its index
    pub fn add_name(&mut self, name: &str) -> usize {
        if let Some(idx) = self.names.iter().position(|n| n == name) {
            return idx;
        }
        self.names.push(name.to_string());
        self.names.len() - 1
    }

    /// Append an instruction and return its index
    pub fn emit(&mut self, op: Opcode) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }
}

/// Output of compiling a source unit
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// Top-level statements
    pub main: Function,
    /// Functions declared with `func`, in source order
    pub functions: Vec<Function>,
}
