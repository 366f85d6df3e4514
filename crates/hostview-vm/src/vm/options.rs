use serde::Deserialize;

/// Configuration options for a VM
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Maximum operand stack size (in slots)
    pub max_stack_size: usize,

    /// Maximum number of nested script calls
    pub max_call_depth: usize,

    /// Maximum nesting of blocks and expressions accepted by the compiler
    pub max_nesting_depth: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_stack_size: 1024 * 64,
            max_call_depth: 1024,
            max_nesting_depth: crate::compiler::MAX_NESTING_DEPTH,
        }
    }
}
