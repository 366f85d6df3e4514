//! Hostview script VM
//!
//! This crate provides the interpreter that hostview embeds:
//! - Lexer and single-pass compiler for the hostview script language
//! - Operand stack, call-setup stack and call frames
//! - Step-at-a-time bytecode interpreter
//! - A mutex-guarded handle for use from foreign threads

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bytecode;
pub mod compiler;
pub mod lexer;
pub mod stack;
pub mod value;
pub mod vm;

pub use bytecode::{Function, Opcode};
pub use stack::{CallFrame, CallSetup, CallState, Stack};
pub use value::Value;
pub use vm::{Callable, NativeFn, Vm, VmGuard, VmHandle, VmOptions, WeakVm};

/// VM execution errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    /// Source failed to compile
    #[error("Compile error at line {line}: {message}")]
    CompileError {
        /// 1-based source line
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// Operand stack exhausted
    #[error("Stack overflow")]
    StackOverflow,

    /// Operand stack popped past its bottom
    #[error("Stack underflow")]
    StackUnderflow,

    /// Too many nested calls
    #[error("Call depth exceeded (max {0})")]
    CallDepthExceeded(usize),

    /// Call to a function name the VM does not know
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Operand types do not fit the operation
    #[error("Type error: {0}")]
    TypeError(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;

/// Normalize a script identifier for lookup.
///
/// Function and global names are case-insensitive; tables are keyed by the
/// lower-cased form.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}
