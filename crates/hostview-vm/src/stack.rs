//! Stack and call frame management
//!
//! The VM keeps three stacks:
//!
//! - the **operand stack** holding arguments, locals and temporaries (`sp`);
//! - the **call-setup stack** holding callees resolved by `LoadFunc` whose
//!   arguments are still being pushed (`func_sp`);
//! - the **frame stack** holding active script calls (pending calls).
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Operand Stack (top)                 │  ← sp
//! │   arg₁                              │
//! │   arg₀                              │  ← CallSetup.base
//! ├─────────────────────────────────────┤
//! │ Call Frame N (current)              │
//! │   temporaries                       │
//! │   param₁                            │
//! │   param₀                            │  ← CallFrame.base_pointer
//! ├─────────────────────────────────────┤
//! │ Call Frame N-1                      │
//! │   ...                               │
//! └─────────────────────────────────────┘
//! ```
//!
//! A [`CallState`] captures the height of all three so an embedder can put
//! the VM back exactly where it found it.

use crate::bytecode::Function;
use crate::vm::Callable;
use crate::{value::Value, VmError, VmResult};
use std::sync::Arc;

/// Default maximum stack size (in slots)
const DEFAULT_MAX_STACK_SIZE: usize = 1024 * 64;

/// Activation record of a running script function
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Function being executed
    pub function: Arc<Function>,

    /// Next instruction index
    pub ip: usize,

    /// Base pointer (first parameter slot)
    pub base_pointer: usize,
}

impl CallFrame {
    /// Create a new call frame
    pub fn new(function: Arc<Function>, base_pointer: usize) -> Self {
        Self {
            function,
            ip: 0,
            base_pointer,
        }
    }
}

/// A callee resolved by `LoadFunc`, waiting for its arguments
#[derive(Clone)]
pub struct CallSetup {
    /// Lower-cased name the callee was resolved under
    pub name: String,

    /// The resolved callee
    pub callee: Callable,

    /// Operand stack height when the setup was created; arguments start here
    pub base: usize,
}

impl std::fmt::Debug for CallSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSetup")
            .field("name", &self.name)
            .field("base", &self.base)
            .finish()
    }
}

/// Saved heights of the three VM stacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallState {
    /// Operand stack pointer
    pub sp: usize,
    /// Call-setup stack pointer
    pub func_sp: usize,
    /// Number of active frames
    pub pending_calls: usize,
}

/// Operand, call-setup and frame stacks for the VM
pub struct Stack {
    /// Operand slots
    slots: Vec<Value>,

    /// Resolved callees awaiting `Call`
    setups: Vec<CallSetup>,

    /// Active frames
    frames: Vec<CallFrame>,

    /// Maximum operand stack size (in slots)
    max_size: usize,
}

impl Stack {
    /// Create a new stack with default size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_STACK_SIZE)
    }

    /// Create a stack with specific capacity
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            slots: Vec::with_capacity(1024.min(max_size)),
            setups: Vec::with_capacity(64),
            frames: Vec::with_capacity(256),
            max_size,
        }
    }

    // ========================================================================
    // Operand Stack Operations
    // ========================================================================

    /// Push a value onto the stack
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackOverflow` if the stack is full.
    #[inline]
    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.slots.len() >= self.max_size {
            return Err(VmError::StackOverflow);
        }
        self.slots.push(value);
        Ok(())
    }

    /// Pop a value from the stack
    ///
    /// # Errors
    ///
    /// Returns `VmError::StackUnderflow` if the stack is empty.
    #[inline]
    pub fn pop(&mut self) -> VmResult<Value> {
        self.slots.pop().ok_or(VmError::StackUnderflow)
    }

    /// Peek at the top value without popping
    #[inline]
    pub fn peek(&self) -> VmResult<&Value> {
        self.slots.last().ok_or(VmError::StackUnderflow)
    }

    /// Remove and return every value from `base` upward
    pub fn split_off(&mut self, base: usize) -> Vec<Value> {
        if base >= self.slots.len() {
            return Vec::new();
        }
        self.slots.split_off(base)
    }

    /// Get current stack depth (the stack pointer)
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    // ========================================================================
    // Call Setups
    // ========================================================================

    /// Record a resolved callee; its arguments are pushed next
    pub fn push_setup(&mut self, name: String, callee: Callable) {
        let base = self.slots.len();
        self.setups.push(CallSetup { name, callee, base });
    }

    /// Take the innermost call setup
    pub fn pop_setup(&mut self) -> VmResult<CallSetup> {
        self.setups
            .pop()
            .ok_or_else(|| VmError::RuntimeError("Call without a loaded function".to_string()))
    }

    /// Number of pending call setups (the function-call stack pointer)
    #[inline]
    pub fn setup_count(&self) -> usize {
        self.setups.len()
    }

    // ========================================================================
    // Call Frame Management
    // ========================================================================

    /// Push a new call frame whose parameters start at `base_pointer`
    pub fn push_frame(&mut self, function: Arc<Function>, base_pointer: usize) {
        self.frames.push(CallFrame::new(function, base_pointer));
    }

    /// Pop the current call frame, discarding its slots
    ///
    /// # Errors
    ///
    /// Returns `VmError::RuntimeError` if no frames to pop.
    pub fn pop_frame(&mut self) -> VmResult<CallFrame> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::RuntimeError("No call frame to pop".to_string()))?;
        self.slots.truncate(frame.base_pointer);
        Ok(frame)
    }

    /// Get the current call frame
    #[inline]
    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Get mutable reference to current call frame
    #[inline]
    pub fn current_frame_mut(&mut self) -> Option<&mut CallFrame> {
        self.frames.last_mut()
    }

    /// Get the number of active frames
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    // ========================================================================
    // Local Variable Access
    // ========================================================================

    /// Load a local variable by index
    pub fn load_local(&self, index: usize) -> VmResult<Value> {
        let slot = self.local_slot(index)?;
        Ok(self.slots[slot].clone())
    }

    /// Store a value to a local variable
    pub fn store_local(&mut self, index: usize, value: Value) -> VmResult<()> {
        let slot = self.local_slot(index)?;
        self.slots[slot] = value;
        Ok(())
    }

    fn local_slot(&self, index: usize) -> VmResult<usize> {
        let frame = self
            .current_frame()
            .ok_or_else(|| VmError::RuntimeError("No active call frame".to_string()))?;

        if index >= frame.function.param_count {
            return Err(VmError::RuntimeError(format!(
                "Local index {} out of bounds (max {})",
                index, frame.function.param_count
            )));
        }

        let slot = frame.base_pointer + index;
        if slot >= self.slots.len() {
            return Err(VmError::StackUnderflow);
        }
        Ok(slot)
    }

    // ========================================================================
    // Snapshot / Restore
    // ========================================================================

    /// Capture the heights of all three stacks
    pub fn snapshot(&self) -> CallState {
        CallState {
            sp: self.slots.len(),
            func_sp: self.setups.len(),
            pending_calls: self.frames.len(),
        }
    }

    /// Cut every stack back to a previous snapshot.
    ///
    /// Stacks that are already at or below the snapshot are left as they are.
    pub fn restore(&mut self, state: CallState) {
        self.frames.truncate(state.pending_calls);
        self.setups.truncate(state.func_sp);
        self.slots.truncate(state.sp);
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();
        stack.push(Value::Number(1.0)).unwrap();
        stack.push(Value::from("two")).unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop().unwrap(), Value::from("two"));
        assert_eq!(stack.pop().unwrap(), Value::Number(1.0));
        assert!(matches!(stack.pop(), Err(VmError::StackUnderflow)));
    }

    #[test]
    fn test_stack_overflow() {
        let mut stack = Stack::with_capacity(2);
        stack.push(Value::Null).unwrap();
        stack.push(Value::Null).unwrap();
        assert!(matches!(stack.push(Value::Null), Err(VmError::StackOverflow)));
    }

    #[test]
    fn test_frame_locals() {
        let mut stack = Stack::new();
        let function = Arc::new(Function::new("f", 2));
        stack.push(Value::from("a")).unwrap();
        stack.push(Value::from("b")).unwrap();
        stack.push_frame(function, 0);

        assert_eq!(stack.load_local(1).unwrap(), Value::from("b"));
        stack.store_local(0, Value::Number(5.0)).unwrap();
        assert_eq!(stack.load_local(0).unwrap(), Value::Number(5.0));
        assert!(stack.load_local(2).is_err());

        stack.pop_frame().unwrap();
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.frame_count(), 0);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut stack = Stack::new();
        stack.push(Value::Number(1.0)).unwrap();
        let state = stack.snapshot();

        stack.push(Value::Number(2.0)).unwrap();
        stack.push_frame(Arc::new(Function::new("f", 0)), 2);
        stack.push(Value::Number(3.0)).unwrap();

        stack.restore(state);
        assert_eq!(stack.snapshot(), state);
        assert_eq!(stack.peek().unwrap(), &Value::Number(1.0));
    }
}
