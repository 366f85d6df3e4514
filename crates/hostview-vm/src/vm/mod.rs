//! Virtual machine execution and thread-safe handle

mod handle;
mod interpreter;
mod options;

pub use handle::{VmGuard, VmHandle, WeakVm};
pub use interpreter::Vm;
pub use options::VmOptions;

use crate::bytecode::Function;
use crate::value::Value;
use crate::VmResult;
use std::sync::Arc;

/// Host function callable from script.
///
/// Native functions run while the VM mutex is held by whoever is driving the
/// VM, so they must never lock the same VM again.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> VmResult<Value> + Send + Sync>;

/// An entry of the function table
#[derive(Clone)]
pub enum Callable {
    /// Compiled script function
    Script(Arc<Function>),
    /// Host function
    Native(NativeFn),
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Script(function) => write!(f, "Script({})", function.name),
            Callable::Native(_) => write!(f, "Native"),
        }
    }
}
